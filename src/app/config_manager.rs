//! Configuration lifecycle: load file config, merge environment and CLI.

use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, bail};
use linkprint_core::parser::ColumnNames;
use linkprint_core::{
    DEFAULT_CONCURRENCY, DEFAULT_LEDGER_PATH, PoolConfig, QuiescencePolicy, RecordOptions,
};

use crate::app::context::RunConfig;
use crate::app_config::{FileConfig, load_file_config};
use crate::cli::Args;

/// Default session cookie file, relative to the working directory.
pub(crate) const DEFAULT_COOKIES_FILE: &str = "cookies.json";

pub(crate) const ENV_OUTPUT_DIR: &str = "LINKPRINT_OUTPUT_DIR";
pub(crate) const ENV_COOKIES: &str = "LINKPRINT_COOKIES";
pub(crate) const ENV_CHROME_PATH: &str = "CHROME_PATH";

/// Loads the config file and merges everything into a [`RunConfig`].
///
/// Precedence per setting: CLI flag > environment variable > config file >
/// built-in default.
pub(crate) fn resolve_config(
    args: &Args,
    env: impl Fn(&str) -> Option<OsString> + Copy,
) -> Result<RunConfig> {
    let file = load_file_config(args.config.as_deref(), env)?.unwrap_or_default();
    merge_config(args, &file, env)
}

fn merge_config(
    args: &Args,
    file: &FileConfig,
    env: impl Fn(&str) -> Option<OsString>,
) -> Result<RunConfig> {
    let env_path = |name: &str| env(name).filter(|v| !v.is_empty()).map(PathBuf::from);

    let Some(input_csv) = args.input_csv().cloned() else {
        bail!("No input CSV file given");
    };

    let Some(output_dir) = args
        .output_dir
        .clone()
        .or_else(|| args.positional_output_dir().cloned())
        .or_else(|| env_path(ENV_OUTPUT_DIR))
        .or_else(|| file.output_dir.clone())
    else {
        bail!(
            "No output directory given\n  Suggestion: pass it before the CSV file, use --output-dir, or set {ENV_OUTPUT_DIR}"
        );
    };

    let cookies_file = args
        .cookies
        .clone()
        .or_else(|| env_path(ENV_COOKIES))
        .or_else(|| file.cookies_file.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_COOKIES_FILE));

    let ledger_path = args
        .ledger
        .clone()
        .or_else(|| file.ledger_path.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LEDGER_PATH));

    let browser_path = args
        .browser
        .clone()
        .or_else(|| env_path(ENV_CHROME_PATH))
        .or_else(|| file.browser_path.clone());

    let defaults = ColumnNames::default();
    let records = RecordOptions {
        columns: ColumnNames {
            link: args
                .link_column
                .clone()
                .or_else(|| file.link_column.clone())
                .unwrap_or(defaults.link),
            name: args
                .name_column
                .clone()
                .or_else(|| file.name_column.clone())
                .unwrap_or(defaults.name),
            status: args
                .status_column
                .clone()
                .or_else(|| file.status_column.clone()),
        },
        sanitize_names: args.sanitize_names || file.sanitize_names.unwrap_or(false),
        print_view_links: args.print_view_links || file.print_view_links.unwrap_or(false),
    };

    let concurrency = args
        .concurrency
        .or(file.concurrency)
        .map_or(DEFAULT_CONCURRENCY, usize::from);
    let quiescence = args
        .timeout
        .or(file.navigation_timeout_secs)
        .map_or_else(QuiescencePolicy::default, |secs| {
            QuiescencePolicy::with_timeout(Duration::from_secs(secs))
        });
    let pool = PoolConfig {
        max_concurrency: concurrency,
        context_policy: args
            .context_policy
            .map(Into::into)
            .or(file.context_policy)
            .unwrap_or_default(),
        quiescence,
    };

    Ok(RunConfig {
        input_csv,
        output_dir,
        cookies_file,
        ledger_path,
        browser_path,
        records,
        pool,
    })
}
