//! End-to-end runs through `BatchRunner` with a scripted backend.

mod support;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use linkprint_core::failure::read_entries;
use linkprint_core::parser::SkipReason;
use linkprint_core::{
    BatchError, BatchPlan, BatchRunner, ParseError, PoolConfig, RecordOptions, RecordSource,
    RunSummary,
};
use support::{FakeBackend, Script, sample_cookies, write_input_csv};
use tempfile::TempDir;

fn plan(dir: &Path, max_concurrency: usize) -> BatchPlan {
    BatchPlan {
        output_dir: dir.join("out"),
        ledger_path: dir.join("data").join("failed_downloads.csv"),
        cookies: sample_cookies(),
        pool: PoolConfig {
            max_concurrency,
            ..PoolConfig::default()
        },
    }
}

async fn run(dir: &Path, backend: &Arc<FakeBackend>, input: &Path) -> Result<RunSummary, BatchError> {
    let source = RecordSource::open(input, RecordOptions::default())?;
    BatchRunner::new(plan(dir, 2), Arc::clone(backend) as Arc<dyn linkprint_core::RenderBackend>)
        .run(&source)
        .await
}

fn pdf_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_batch_renders_every_valid_row() {
    let dir = TempDir::new().unwrap();
    let input = write_input_csv(
        dir.path(),
        &[
            ("https://example.com/a", "Alpha"),
            ("https://example.com/b", "Beta"),
            ("https://example.com/c", "Gamma"),
        ],
    );
    let backend = FakeBackend::new(Script::with_delay(Duration::from_millis(10)));

    let summary = run(dir.path(), &backend, &input).await.unwrap();

    assert_eq!(summary.total_rows, 3);
    assert_eq!(summary.succeeded, 3);
    assert_eq!(summary.failed, 0);
    assert!(summary.skipped.is_empty());
    assert_eq!(
        pdf_names(&summary.output_dir),
        vec!["Alpha.pdf", "Beta.pdf", "Gamma.pdf"]
    );
    assert!(backend.state.peak_active() <= 2);
    assert_eq!(backend.state.shutdowns(), 1);
    assert!(!summary.ledger_path.exists());
}

#[tokio::test]
async fn test_batch_skips_invalid_rows_without_ledger_entries() {
    let dir = TempDir::new().unwrap();
    let input = write_input_csv(
        dir.path(),
        &[
            ("ftp://example.com/file", "Old"),
            ("https://example.com/ok", "Kept"),
            ("https://example.com/nameless", "nan"),
            ("", "Empty"),
        ],
    );
    let backend = FakeBackend::new(Script::default());

    let summary = run(dir.path(), &backend, &input).await.unwrap();

    assert_eq!(summary.total_rows, 4);
    assert_eq!(summary.attempted(), 1);
    assert_eq!(summary.skipped.len(), 3);
    assert_eq!(summary.skipped[0].row_index, 1);
    assert!(matches!(
        summary.skipped[0].reason,
        SkipReason::InvalidHyperlink { .. }
    ));
    assert!(matches!(
        summary.skipped[1].reason,
        SkipReason::InvalidName { .. }
    ));
    assert_eq!(backend.state.navigations(), vec!["https://example.com/ok"]);
    assert!(!summary.ledger_path.exists());
}

#[tokio::test]
async fn test_batch_duplicate_names_produce_one_file() {
    let dir = TempDir::new().unwrap();
    let input = write_input_csv(
        dir.path(),
        &[
            ("https://example.com/1", "Report"),
            ("https://example.com/2", "Report"),
        ],
    );
    let backend = FakeBackend::new(Script::default());

    let summary = run(dir.path(), &backend, &input).await.unwrap();

    assert_eq!(summary.succeeded, 2);
    assert_eq!(pdf_names(&summary.output_dir), vec!["Report.pdf"]);
}

#[tokio::test]
async fn test_batch_failure_lands_in_ledger() {
    let dir = TempDir::new().unwrap();
    let input = write_input_csv(
        dir.path(),
        &[
            ("https://down.example/x", "Down"),
            ("https://example.com/up", "Up"),
        ],
    );
    let backend = FakeBackend::new(
        Script::default().fail("https://down.example/x", "net::ERR_CONNECTION_REFUSED"),
    );

    let summary = run(dir.path(), &backend, &input).await.unwrap();

    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.failures().count(), 1);
    assert_eq!(pdf_names(&summary.output_dir), vec!["Up.pdf"]);

    let entries = read_entries(&summary.ledger_path).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].url, "https://down.example/x");
    assert_eq!(entries[0].filename, "Down.pdf");
    assert!(entries[0].reason.contains("net::ERR_CONNECTION_REFUSED"));
}

#[tokio::test]
async fn test_batch_clears_stale_files_before_rendering() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("out");
    std::fs::create_dir_all(out.join("keep")).unwrap();
    std::fs::write(out.join("stale.pdf"), b"old").unwrap();
    std::fs::write(out.join("notes.txt"), b"old").unwrap();
    let input = write_input_csv(dir.path(), &[("https://example.com/new", "Fresh")]);
    let backend = FakeBackend::new(Script::default());

    let summary = run(dir.path(), &backend, &input).await.unwrap();

    assert_eq!(pdf_names(&summary.output_dir), vec!["Fresh.pdf", "keep"]);
}

#[tokio::test]
async fn test_batch_ledger_appends_across_runs() {
    let dir = TempDir::new().unwrap();
    let input = write_input_csv(dir.path(), &[("https://down.example/x", "Down")]);
    let backend = FakeBackend::new(Script::default().fail("https://down.example/x", "refused"));

    run(dir.path(), &backend, &input).await.unwrap();
    let summary = run(dir.path(), &backend, &input).await.unwrap();

    assert_eq!(read_entries(&summary.ledger_path).unwrap().len(), 2);
}

#[tokio::test]
async fn test_batch_missing_column_aborts_before_rendering() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("input.csv");
    std::fs::write(&input, "Link,Title\nhttps://example.com,Doc\n").unwrap();

    let error = RecordSource::open(&input, RecordOptions::default()).unwrap_err();
    match error {
        ParseError::MissingColumn { column, found, .. } => {
            assert_eq!(column, "Hyperlink");
            assert_eq!(found, "Link, Title");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_batch_input_replaced_after_open_fails_without_navigation() {
    let dir = TempDir::new().unwrap();
    let input = write_input_csv(dir.path(), &[("https://example.com", "Doc")]);
    let source = RecordSource::open(&input, RecordOptions::default()).unwrap();
    std::fs::write(&input, "Other\nvalue\n").unwrap();
    let backend = FakeBackend::new(Script::default());

    let result = BatchRunner::new(
        plan(dir.path(), 2),
        Arc::clone(&backend) as Arc<dyn linkprint_core::RenderBackend>,
    )
    .run(&source)
    .await;

    assert!(matches!(result, Err(BatchError::Parse(_))));
    assert!(backend.state.navigations().is_empty());
    assert!(!dir.path().join("out").exists());
}

#[tokio::test]
async fn test_batch_invalid_concurrency_is_rejected() {
    let dir = TempDir::new().unwrap();
    let input = write_input_csv(dir.path(), &[("https://example.com", "Doc")]);
    let source = RecordSource::open(&input, RecordOptions::default()).unwrap();
    let backend = FakeBackend::new(Script::default());

    let result = BatchRunner::new(
        plan(dir.path(), 0),
        Arc::clone(&backend) as Arc<dyn linkprint_core::RenderBackend>,
    )
    .run(&source)
    .await;

    assert!(matches!(result, Err(BatchError::Engine(_))));
    assert!(backend.state.navigations().is_empty());
}
