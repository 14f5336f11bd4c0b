//! Session cookie file loading and normalization.
//!
//! The cookie file is a JSON array of objects as exported by browser
//! extensions or automation tools. Each object is reshaped into a
//! [`CookieRecord`] carrying only the attributes a page session accepts.

use std::collections::HashSet;
use std::fmt;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument};

/// Cookie set shared read-only by every task of a run.
pub type CookieSet = Arc<[CookieRecord]>;

/// Errors that can occur while loading a cookie file.
#[derive(Debug, thiserror::Error)]
pub enum CookieError {
    /// The file contents are not a JSON array of cookie objects.
    #[error("malformed cookie file: {0}")]
    Parse(#[from] serde_json::Error),

    /// I/O error reading the cookie file.
    #[error("failed to read cookie file {path}: {source}")]
    Io {
        /// Path of the cookie file.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// `SameSite` attribute values a session accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SameSite {
    /// `Strict`
    Strict,
    /// `Lax`
    Lax,
    /// `None`
    None,
}

impl SameSite {
    /// Parses the exact attribute spelling; anything else yields `None`.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Strict" => Some(Self::Strict),
            "Lax" => Some(Self::Lax),
            "None" => Some(Self::None),
            _ => None,
        }
    }

    /// Returns the attribute spelling.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Strict => "Strict",
            Self::Lax => "Lax",
            Self::None => "None",
        }
    }
}

/// A cookie as persisted on disk, before normalization.
///
/// Optional attributes stay loosely typed so that an unexpected type
/// (for example a string `"true"` for `secure`) drops the attribute rather
/// than the whole file.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCookie {
    /// Cookie name.
    pub name: String,
    /// Cookie value (sensitive).
    pub value: String,
    /// URL the cookie is scoped to.
    #[serde(default)]
    pub url: Option<String>,
    /// Domain attribute.
    #[serde(default)]
    pub domain: Option<String>,
    /// Path attribute.
    #[serde(default)]
    pub path: Option<String>,
    /// Expiry as seconds since the Unix epoch.
    #[serde(default)]
    pub expires: Option<Value>,
    /// `HttpOnly` flag.
    #[serde(default)]
    pub http_only: Option<Value>,
    /// `Secure` flag.
    #[serde(default)]
    pub secure: Option<Value>,
    /// `SameSite` attribute.
    #[serde(default)]
    pub same_site: Option<Value>,
}

impl fmt::Debug for RawCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawCookie")
            .field("name", &self.name)
            .field("value", &"[REDACTED]")
            .field("domain", &self.domain)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// A normalized cookie ready for session injection.
///
/// Absent attributes are `None` and are skipped when serialized, so an
/// injection call never sees null or empty placeholders. The value is
/// redacted in `Debug` output.
#[derive(Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CookieRecord {
    /// Cookie name.
    pub name: String,
    value: String,
    /// URL the cookie is scoped to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Domain attribute.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// Path attribute.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Expiry as seconds since the Unix epoch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires: Option<f64>,
    /// `HttpOnly` flag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_only: Option<bool>,
    /// `Secure` flag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secure: Option<bool>,
    /// `SameSite` attribute.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub same_site: Option<SameSite>,
}

impl CookieRecord {
    /// Creates a cookie with only a name and value.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            url: None,
            domain: None,
            path: None,
            expires: None,
            http_only: None,
            secure: None,
            same_site: None,
        }
    }

    /// Returns the cookie value.
    ///
    /// Cookie values are sensitive; do not log the return value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Debug for CookieRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CookieRecord")
            .field("name", &self.name)
            .field("value", &"[REDACTED]")
            .field("url", &self.url)
            .field("domain", &self.domain)
            .field("path", &self.path)
            .field("expires", &self.expires)
            .field("http_only", &self.http_only)
            .field("secure", &self.secure)
            .field("same_site", &self.same_site)
            .finish()
    }
}

/// Parses a JSON array of raw cookie objects.
///
/// # Errors
///
/// Returns [`CookieError::Parse`] when the input is not a JSON array of
/// objects with string `name` and `value` fields.
pub fn parse_raw_cookies(reader: impl Read) -> Result<Vec<RawCookie>, CookieError> {
    Ok(serde_json::from_reader(reader)?)
}

/// Normalizes raw cookies for session injection.
///
/// Pure transformation: string attributes are kept only when non-empty,
/// `expires` only when numeric and non-zero, boolean flags only when they
/// are real booleans, and `sameSite` only when it is `Strict`, `Lax` or
/// `None`. An unusable attribute is dropped; the cookie itself is kept.
#[must_use]
pub fn normalize_cookies(raw: &[RawCookie]) -> Vec<CookieRecord> {
    raw.iter().map(normalize_cookie).collect()
}

fn normalize_cookie(raw: &RawCookie) -> CookieRecord {
    let mut cookie = CookieRecord::new(raw.name.clone(), raw.value.clone());
    cookie.url = non_empty(raw.url.as_deref());
    cookie.domain = non_empty(raw.domain.as_deref());
    cookie.path = non_empty(raw.path.as_deref());
    cookie.expires = raw
        .expires
        .as_ref()
        .and_then(Value::as_f64)
        .filter(|expires| *expires != 0.0);
    cookie.http_only = raw.http_only.as_ref().and_then(Value::as_bool);
    cookie.secure = raw.secure.as_ref().and_then(Value::as_bool);
    cookie.same_site = raw
        .same_site
        .as_ref()
        .and_then(Value::as_str)
        .and_then(SameSite::parse);

    if raw.same_site.is_some() && cookie.same_site.is_none() {
        debug!(name = %raw.name, "dropping unsupported sameSite attribute");
    }
    cookie
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(ToString::to_string)
}

/// Loads and normalizes the cookie file once for the whole run.
///
/// # Errors
///
/// Returns [`CookieError::Io`] when the file cannot be read and
/// [`CookieError::Parse`] when its structure is malformed.
#[instrument(level = "debug", fields(path = %path.display()))]
pub fn load_cookie_file(path: &Path) -> Result<CookieSet, CookieError> {
    let file = std::fs::File::open(path).map_err(|source| CookieError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let raw = parse_raw_cookies(std::io::BufReader::new(file))?;
    let cookies = normalize_cookies(&raw);

    let domains: HashSet<&str> = cookies
        .iter()
        .filter_map(|cookie| cookie.domain.as_deref())
        .collect();
    info!(
        count = cookies.len(),
        domains = domains.len(),
        "Loaded cookies"
    );

    Ok(cookies.into())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn normalize_one(json: &str) -> CookieRecord {
        let raw = parse_raw_cookies(Cursor::new(json.as_bytes())).unwrap();
        assert_eq!(raw.len(), 1);
        normalize_cookies(&raw).remove(0)
    }

    #[test]
    fn test_normalize_copies_present_attributes() {
        let cookie = normalize_one(
            r#"[{"name":"session","value":"abc","domain":".example.com","path":"/",
                 "expires":1700000000,"httpOnly":true,"secure":false,"sameSite":"Lax"}]"#,
        );
        assert_eq!(cookie.name, "session");
        assert_eq!(cookie.value(), "abc");
        assert_eq!(cookie.domain.as_deref(), Some(".example.com"));
        assert_eq!(cookie.path.as_deref(), Some("/"));
        assert_eq!(cookie.expires, Some(1_700_000_000.0));
        assert_eq!(cookie.http_only, Some(true));
        assert_eq!(cookie.secure, Some(false));
        assert_eq!(cookie.same_site, Some(SameSite::Lax));
    }

    #[test]
    fn test_normalize_drops_unknown_same_site() {
        let cookie = normalize_one(r#"[{"name":"a","value":"b","sameSite":"Foo"}]"#);
        assert_eq!(cookie.same_site, None);
        let json = serde_json::to_value(&cookie).unwrap();
        assert!(json.get("sameSite").is_none());
    }

    #[test]
    fn test_normalize_same_site_is_case_sensitive() {
        let cookie = normalize_one(r#"[{"name":"a","value":"b","sameSite":"lax"}]"#);
        assert_eq!(cookie.same_site, None);
    }

    #[test]
    fn test_normalize_keeps_all_three_same_site_values() {
        for (raw, expected) in [
            ("Strict", SameSite::Strict),
            ("Lax", SameSite::Lax),
            ("None", SameSite::None),
        ] {
            let cookie = normalize_one(&format!(
                r#"[{{"name":"a","value":"b","sameSite":"{raw}"}}]"#
            ));
            assert_eq!(cookie.same_site, Some(expected));
        }
    }

    #[test]
    fn test_normalize_omits_absent_attributes_when_serialized() {
        let cookie = normalize_one(r#"[{"name":"a","value":"b"}]"#);
        let json = serde_json::to_value(&cookie).unwrap();
        let object = json.as_object().unwrap();
        let mut keys: Vec<&str> = object.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(keys, ["name", "value"]);
    }

    #[test]
    fn test_normalize_drops_non_boolean_flags() {
        let cookie =
            normalize_one(r#"[{"name":"a","value":"b","httpOnly":"true","secure":1}]"#);
        assert_eq!(cookie.http_only, None);
        assert_eq!(cookie.secure, None);
    }

    #[test]
    fn test_normalize_drops_empty_strings_and_zero_expiry() {
        let cookie = normalize_one(
            r#"[{"name":"a","value":"b","url":"","domain":"","path":"","expires":0}]"#,
        );
        assert_eq!(cookie.url, None);
        assert_eq!(cookie.domain, None);
        assert_eq!(cookie.path, None);
        assert_eq!(cookie.expires, None);
    }

    #[test]
    fn test_normalize_keeps_session_expiry_marker() {
        let cookie = normalize_one(r#"[{"name":"a","value":"b","expires":-1}]"#);
        assert_eq!(cookie.expires, Some(-1.0));
    }

    #[test]
    fn test_normalize_null_attributes_are_absent() {
        let cookie = normalize_one(r#"[{"name":"a","value":"b","url":null,"sameSite":null}]"#);
        assert_eq!(cookie.url, None);
        assert_eq!(cookie.same_site, None);
    }

    #[test]
    fn test_parse_rejects_non_array() {
        let err = parse_raw_cookies(Cursor::new(br#"{"name":"a","value":"b"}"#)).unwrap_err();
        assert!(matches!(err, CookieError::Parse(_)));
    }

    #[test]
    fn test_parse_rejects_missing_value() {
        let err = parse_raw_cookies(Cursor::new(br#"[{"name":"a"}]"#)).unwrap_err();
        assert!(err.to_string().contains("malformed cookie file"));
    }

    #[test]
    fn test_cookie_record_debug_redacts_value() {
        let cookie = CookieRecord::new("session", "super-secret");
        let debug = format!("{cookie:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("super-secret"));
    }

    #[test]
    fn test_raw_cookie_debug_redacts_value() {
        let raw = parse_raw_cookies(Cursor::new(br#"[{"name":"a","value":"hidden"}]"#)).unwrap();
        let debug = format!("{:?}", raw[0]);
        assert!(!debug.contains("hidden"));
    }

    #[test]
    fn test_load_cookie_file_missing_is_io_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = load_cookie_file(&dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, CookieError::Io { .. }));
    }

    #[test]
    fn test_load_cookie_file_reads_and_normalizes() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("cookies.json");
        std::fs::write(
            &path,
            r#"[{"name":"a","value":"1","domain":"x.com"},{"name":"b","value":"2","sameSite":"Bogus"}]"#,
        )
        .unwrap();
        let cookies = load_cookie_file(&path).unwrap();
        assert_eq!(cookies.len(), 2);
        assert_eq!(cookies[0].domain.as_deref(), Some("x.com"));
        assert_eq!(cookies[1].same_site, None);
    }
}
