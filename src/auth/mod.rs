//! Authentication cookie management.
//!
//! This module loads the persisted session cookie file and normalizes its
//! records into the attribute set accepted by a browser session.

mod cookies;

pub use cookies::{
    CookieError, CookieRecord, CookieSet, RawCookie, SameSite, load_cookie_file,
    normalize_cookies, parse_raw_cookies,
};
