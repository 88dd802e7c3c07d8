use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use common::ErrorRecord;
use metadata::MetadataError;
use parking_lot::Mutex;

use crate::albums::ManifestError;

pub const METADATA_LOG: &str = "metadata_errors.json";
pub const RELOCATION_LOG: &str = "relocation_errors.json";
pub const DUPLICATE_LOG: &str = "duplicate_renames.json";

/// Why processing of a single file failed. Failures never abort the batch;
/// they are recorded and the run moves on to the next file.
#[derive(Debug)]
pub enum FileError {
    MetadataRead(MetadataError),
    NoTimestamp,
    TimestampWrite(MetadataError),
    ExtensionRename(io::Error),
    Relocation(io::Error),
    ManifestMerge(ManifestError),
}

impl std::fmt::Display for FileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileError::MetadataRead(err) => write!(f, "failed to read metadata: {}", err),
            FileError::NoTimestamp => {
                write!(f, "no date found in sidecar or embedded metadata")
            }
            FileError::TimestampWrite(err) => {
                write!(f, "failed to write capture time: {}", err)
            }
            FileError::ExtensionRename(err) => {
                write!(f, "failed to correct extension: {}", err)
            }
            FileError::Relocation(err) => write!(f, "failed to move file: {}", err),
            FileError::ManifestMerge(err) => {
                write!(f, "failed to update album manifest: {}", err)
            }
        }
    }
}

impl std::error::Error for FileError {}

/// Shared collector for per-file failures and duplicate-rename notices.
/// Cheap to clone; every worker appends concurrently.
#[derive(Clone, Default)]
pub struct ErrorSink {
    inner: Arc<SinkInner>,
}

#[derive(Default)]
struct SinkInner {
    metadata: Mutex<Vec<ErrorRecord>>,
    relocation: Mutex<Vec<ErrorRecord>>,
    duplicates: Mutex<Vec<ErrorRecord>>,
}

#[derive(Clone, Debug)]
pub struct ErrorLogPaths {
    pub metadata: PathBuf,
    pub relocation: PathBuf,
    pub duplicates: PathBuf,
}

impl ErrorSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn metadata_error(&self, path: &Path, error: &FileError) {
        self.inner.metadata.lock().push(record(path, error));
    }

    pub fn relocation_error(&self, path: &Path, error: &FileError) {
        self.inner.relocation.lock().push(record(path, error));
    }

    pub fn duplicate_notice(&self, path: &Path, message: impl Into<String>) {
        self.inner.duplicates.lock().push(ErrorRecord {
            path: path.display().to_string(),
            message: message.into(),
        });
    }

    pub fn counts(&self) -> (usize, usize, usize) {
        (
            self.inner.metadata.lock().len(),
            self.inner.relocation.lock().len(),
            self.inner.duplicates.lock().len(),
        )
    }

    /// Writes all three logs, overwriting previous runs. Empty categories
    /// still produce a valid empty JSON array.
    pub async fn flush(&self, dir: &Path) -> Result<ErrorLogPaths, io::Error> {
        tokio::fs::create_dir_all(dir).await?;
        let paths = ErrorLogPaths {
            metadata: dir.join(METADATA_LOG),
            relocation: dir.join(RELOCATION_LOG),
            duplicates: dir.join(DUPLICATE_LOG),
        };
        // Guards are not held across the writes.
        let metadata = self.inner.metadata.lock().clone();
        let relocation = self.inner.relocation.lock().clone();
        let duplicates = self.inner.duplicates.lock().clone();
        write_log(&paths.metadata, &metadata).await?;
        write_log(&paths.relocation, &relocation).await?;
        write_log(&paths.duplicates, &duplicates).await?;
        Ok(paths)
    }
}

fn record(path: &Path, error: &FileError) -> ErrorRecord {
    ErrorRecord {
        path: path.display().to_string(),
        message: error.to_string(),
    }
}

async fn write_log(path: &Path, records: &[ErrorRecord]) -> Result<(), io::Error> {
    let data = serde_json::to_vec_pretty(records).map_err(io::Error::other)?;
    tokio::fs::write(path, data).await
}
