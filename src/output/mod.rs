//! Output directory management.
//!
//! The output directory is cleared of regular files at the start of a run
//! and then receives one PDF per successful task. Each PDF is written to a
//! temporary file in the same directory and renamed into place, so readers
//! never observe a partially written document and two tasks writing the same
//! name leave exactly one complete file behind.

use std::io::Write;
use std::path::{Component, Path, PathBuf};

use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

/// Errors raised while preparing or writing to the output directory.
#[derive(Debug, Error)]
pub enum OutputError {
    /// A filesystem operation failed.
    #[error("IO error at {path}: {source}")]
    Io {
        /// Path involved in the failed operation.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The output path exists but is not a directory.
    #[error("output path {path} exists and is not a directory")]
    NotADirectory {
        /// The offending path.
        path: PathBuf,
    },

    /// The filename would escape the output directory.
    #[error("unsafe output filename '{filename}'")]
    UnsafeFilename {
        /// The rejected filename.
        filename: String,
    },

    /// The blocking write task was cancelled or panicked.
    #[error("write task for {path} did not complete")]
    WriteAborted {
        /// Target path of the aborted write.
        path: PathBuf,
    },
}

impl OutputError {
    fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Makes `dir` an existing directory containing no regular files.
///
/// Missing directories are created. Regular files and symbolic links
/// directly inside `dir` are removed (a symlink is removed itself, never its
/// target). Subdirectories and their contents are left alone. Returns the
/// canonical directory path.
///
/// # Errors
///
/// Returns [`OutputError::NotADirectory`] if `dir` names a non-directory,
/// or [`OutputError::Io`] if listing, creating or removing fails.
#[instrument(fields(dir = %dir.display()))]
pub fn prepare(dir: &Path) -> Result<PathBuf, OutputError> {
    match std::fs::metadata(dir) {
        Ok(meta) if !meta.is_dir() => {
            return Err(OutputError::NotADirectory {
                path: dir.to_path_buf(),
            });
        }
        Ok(_) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            std::fs::create_dir_all(dir).map_err(|source| OutputError::io(dir, source))?;
            debug!("created output directory");
        }
        Err(source) => return Err(OutputError::io(dir, source)),
    }

    let mut removed = 0usize;
    let entries = std::fs::read_dir(dir).map_err(|source| OutputError::io(dir, source))?;
    for entry in entries {
        let entry = entry.map_err(|source| OutputError::io(dir, source))?;
        let path = entry.path();
        // file_type() does not follow symlinks.
        let file_type = entry
            .file_type()
            .map_err(|source| OutputError::io(&path, source))?;
        if file_type.is_file() || file_type.is_symlink() {
            std::fs::remove_file(&path).map_err(|source| OutputError::io(&path, source))?;
            removed += 1;
        }
    }

    let canonical = dir
        .canonicalize()
        .map_err(|source| OutputError::io(dir, source))?;
    info!(dir = %canonical.display(), removed, "Prepared output directory");
    Ok(canonical)
}

/// Joins `filename` onto `dir`, rejecting anything but a single plain component.
///
/// # Errors
///
/// Returns [`OutputError::UnsafeFilename`] for empty names, names containing
/// separators, and `.`/`..`.
pub fn resolve(dir: &Path, filename: &str) -> Result<PathBuf, OutputError> {
    let mut components = Path::new(filename).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(name)), None) if name == filename => Ok(dir.join(name)),
        _ => Err(OutputError::UnsafeFilename {
            filename: filename.to_string(),
        }),
    }
}

/// Atomically writes `bytes` as `dir/filename`, replacing any existing file.
///
/// # Errors
///
/// Returns [`OutputError::UnsafeFilename`] for names rejected by [`resolve`]
/// and [`OutputError::Io`] if the temporary file cannot be written or renamed.
#[instrument(skip(bytes), fields(len = bytes.len()))]
pub async fn write_pdf(dir: &Path, filename: &str, bytes: Vec<u8>) -> Result<PathBuf, OutputError> {
    let target = resolve(dir, filename)?;
    let dir = dir.to_path_buf();
    let join_target = target.clone();

    tokio::task::spawn_blocking(move || write_atomic(&dir, &target, &bytes))
        .await
        .map_err(|error| {
            warn!(%error, "output write task failed");
            OutputError::WriteAborted { path: join_target }
        })?
}

fn write_atomic(dir: &Path, target: &Path, bytes: &[u8]) -> Result<PathBuf, OutputError> {
    let mut temp = NamedTempFile::new_in(dir).map_err(|source| OutputError::io(dir, source))?;
    temp.write_all(bytes)
        .and_then(|()| temp.flush())
        .map_err(|source| OutputError::io(temp.path(), source))?;
    temp.persist(target)
        .map_err(|error| OutputError::io(target, error.error))?;
    debug!(path = %target.display(), bytes = bytes.len(), "wrote pdf");
    Ok(target.to_path_buf())
}
