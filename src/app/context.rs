//! Resolved run configuration, built once at startup.

use std::path::PathBuf;

use linkprint_core::{PoolConfig, RecordOptions};

/// Everything a run needs, with CLI, environment, config file and defaults
/// already merged. Components receive pieces of this value; none of them
/// reads the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RunConfig {
    pub(crate) input_csv: PathBuf,
    pub(crate) output_dir: PathBuf,
    pub(crate) cookies_file: PathBuf,
    pub(crate) ledger_path: PathBuf,
    pub(crate) browser_path: Option<PathBuf>,
    pub(crate) records: RecordOptions,
    pub(crate) pool: PoolConfig,
}
