//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use linkprint_core::ContextPolicy;

/// Render authenticated pages listed in a spreadsheet to PDF.
///
/// Reads a CSV export with a hyperlink column and a display-name column,
/// loads session cookies, and prints every listed page to
/// `<OUTPUT_DIR>/<name>.pdf` with a headless browser. Failed pages are
/// appended to a failure ledger; the run itself only fails on setup errors.
#[derive(Parser, Debug, Clone)]
#[command(name = "linkprint")]
#[command(author, version, about)]
#[command(override_usage = "linkprint [OPTIONS] [OUTPUT_DIR] <INPUT_CSV>")]
pub struct Args {
    /// Output directory (optional) followed by the input CSV file
    #[arg(value_name = "PATHS", num_args = 1..=2, required = true)]
    pub paths: Vec<PathBuf>,

    /// Output directory (overrides the positional form and LINKPRINT_OUTPUT_DIR)
    #[arg(short = 'o', long)]
    pub output_dir: Option<PathBuf>,

    /// Session cookie file (JSON array of cookie objects) [default: cookies.json]
    #[arg(long, value_name = "FILE")]
    pub cookies: Option<PathBuf>,

    /// Failure ledger file [default: data/failed_downloads.csv]
    #[arg(long, value_name = "FILE")]
    pub ledger: Option<PathBuf>,

    /// Maximum pages rendered at once (1-100) [default: 10]
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub concurrency: Option<u8>,

    /// Navigation timeout in seconds (1-600) [default: 30]
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..=600))]
    pub timeout: Option<u64>,

    /// Browser context assignment [default: fresh]
    #[arg(long, value_enum)]
    pub context_policy: Option<ContextPolicyArg>,

    /// Header of the hyperlink column [default: Hyperlink]
    #[arg(long, value_name = "HEADER")]
    pub link_column: Option<String>,

    /// Header of the display-name column [default: "PDF Name"]
    #[arg(long, value_name = "HEADER")]
    pub name_column: Option<String>,

    /// Only render rows whose cell in this column is truthy (true/yes/1/x/checked)
    #[arg(long, value_name = "HEADER")]
    pub status_column: Option<String>,

    /// Replace \ / * ? : " < > | in names with _
    #[arg(long)]
    pub sanitize_names: bool,

    /// Rewrite /edit/ to /print/ in hyperlinks to render the print view
    #[arg(long)]
    pub print_view_links: bool,

    /// Browser executable (overrides CHROME_PATH)
    #[arg(long, value_name = "PATH")]
    pub browser: Option<PathBuf>,

    /// Configuration file [default: $XDG_CONFIG_HOME/linkprint/config.toml]
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable debug logging for this crate
    #[arg(long)]
    pub debug: bool,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, conflicts_with = "quiet")]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Disable colored log output
    #[arg(long)]
    pub no_color: bool,
}

impl Args {
    /// The input CSV file (always the last positional).
    #[must_use]
    pub fn input_csv(&self) -> Option<&PathBuf> {
        self.paths.last()
    }

    /// The output directory given positionally, if two positionals were passed.
    #[must_use]
    pub fn positional_output_dir(&self) -> Option<&PathBuf> {
        if self.paths.len() == 2 {
            self.paths.first()
        } else {
            None
        }
    }
}

/// CLI spelling of [`ContextPolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ContextPolicyArg {
    /// New isolated context for every page
    Fresh,
    /// Reset and reuse contexts between pages
    Reuse,
}

impl From<ContextPolicyArg> for ContextPolicy {
    fn from(value: ContextPolicyArg) -> Self {
        match value {
            ContextPolicyArg::Fresh => Self::Fresh,
            ContextPolicyArg::Reuse => Self::Reuse,
        }
    }
}
