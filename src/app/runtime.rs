use std::io::{self, IsTerminal};
use std::sync::Arc;

use anyhow::{Context, Result};
use linkprint_core::{
    BatchPlan, BatchRunner, ChromiumBackend, LaunchOptions, RecordSource, RenderBackend,
    RunSummary, load_cookie_file,
};
use tracing::{debug, info, warn};

use crate::app::{config_manager, progress_manager, terminal};
use crate::cli::Args;

/// Runs one batch. Returns an error only for setup failures.
pub(crate) async fn run(args: Args) -> Result<()> {
    let no_color = terminal::is_no_color_requested(&args);
    terminal::init_tracing(terminal::resolve_default_log_level(&args), no_color);

    debug!(?args, "CLI arguments parsed");
    info!("linkprint starting");

    let config = config_manager::resolve_config(&args, |name| std::env::var_os(name))?;
    debug!(?config, "resolved configuration");

    let cookies = load_cookie_file(&config.cookies_file).with_context(|| {
        format!(
            "Failed to load session cookies from '{}'",
            config.cookies_file.display()
        )
    })?;
    let source = RecordSource::open(&config.input_csv, config.records.clone())?;

    let backend: Arc<dyn RenderBackend> = Arc::new(
        ChromiumBackend::launch(LaunchOptions {
            executable: config.browser_path.clone(),
        })
        .await?,
    );

    let runner = BatchRunner::new(
        BatchPlan {
            output_dir: config.output_dir.clone(),
            ledger_path: config.ledger_path.clone(),
            cookies,
            pool: config.pool,
        },
        Arc::clone(&backend),
    );

    let use_bar = terminal::should_use_progress_bar(
        io::stderr().is_terminal(),
        args.quiet,
        terminal::is_dumb_terminal(),
    );
    let (progress_handle, stop) = progress_manager::spawn_progress_ui(use_bar, runner.stats());

    let result = runner.run(&source).await;

    progress_manager::stop_progress_ui(progress_handle, &stop).await;

    let summary = match result {
        Ok(summary) => summary,
        Err(error) => {
            if let Err(shutdown_error) = backend.shutdown().await {
                warn!(error = %shutdown_error, "Browser shutdown failed");
            }
            return Err(error).context("Run aborted");
        }
    };

    if !args.quiet {
        for failure in summary.failures() {
            let reason = failure.failure_reason().unwrap_or_default();
            println!(
                "failed: {} -> {}: {reason}",
                failure.request.url(),
                failure.request.filename()
            );
        }
    }
    println!("{}", format_summary(&summary));
    Ok(())
}

fn format_summary(summary: &RunSummary) -> String {
    let mut line = format!(
        "Saved {} of {} PDFs to {}",
        summary.succeeded,
        summary.attempted(),
        summary.output_dir.display()
    );
    if !summary.skipped.is_empty() {
        line.push_str(&format!(" ({} rows skipped)", summary.skipped.len()));
    }
    if summary.failed > 0 {
        line.push_str(&format!(
            "; {} failed, see {}",
            summary.failed,
            summary.ledger_path.display()
        ));
    }
    line
}
