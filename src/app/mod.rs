//! Application runtime composition modules.

pub(crate) mod config_manager;
pub(crate) mod context;
pub(crate) mod progress_manager;
pub(crate) mod runtime;
pub(crate) mod terminal;
