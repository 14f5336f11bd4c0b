//! Progress UI (bar) for render runs.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use linkprint_core::PoolStats;
use tracing::debug;

/// Spawns the progress UI when requested.
/// Returns (handle, stop) so the caller can signal stop and await the handle.
/// When `use_bar` is false, returns (None, stop) with stop already true.
pub(crate) fn spawn_progress_ui(
    use_bar: bool,
    stats: Arc<PoolStats>,
) -> (Option<tokio::task::JoinHandle<()>>, Arc<AtomicBool>) {
    if !use_bar {
        return (None, Arc::new(AtomicBool::new(true)));
    }
    let stop = Arc::new(AtomicBool::new(false));
    let handle = spawn_bar_inner(stats, Arc::clone(&stop));
    (Some(handle), stop)
}

/// Signals the progress UI to stop and waits for it to clear the bar.
///
/// A progress task that panicked or was cancelled is logged at debug.
pub(crate) async fn stop_progress_ui(
    handle: Option<tokio::task::JoinHandle<()>>,
    stop: &AtomicBool,
) {
    stop.store(true, Ordering::SeqCst);
    if let Some(handle) = handle
        && let Err(error) = handle.await
    {
        debug!(%error, "progress display task ended abnormally");
    }
}

fn spawn_bar_inner(stats: Arc<PoolStats>, stop: Arc<AtomicBool>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner} [{bar:30}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        bar.enable_steady_tick(Duration::from_millis(100));

        while !stop.load(Ordering::SeqCst) {
            bar.set_length(u64::try_from(stats.enqueued()).unwrap_or(u64::MAX));
            bar.set_position(u64::try_from(stats.finished()).unwrap_or(u64::MAX));
            bar.set_message(progress_message(&stats));
            tokio::time::sleep(Duration::from_millis(120)).await;
        }

        bar.finish_and_clear();
    })
}

fn progress_message(stats: &PoolStats) -> String {
    format!(
        "rendering {} | {} failed",
        stats.running(),
        stats.failed()
    )
}
