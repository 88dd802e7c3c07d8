use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use common::AlbumItem;
use metadata::ExifTool;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub mod albums;
pub mod normalize;
pub mod relocate;
pub mod report;
pub mod scan;

use albums::AlbumStore;
use relocate::AlbumUpdate;
use report::{ErrorLogPaths, ErrorSink, FileError};
use scan::MediaFile;

pub const DEFAULT_WORKERS: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    /// `pictures/` and `movies/` directly under the output root.
    Flat,
    /// `{year}/pictures|movies/`; files without a resolvable date stay put.
    Year,
}

#[derive(Clone, Debug)]
pub struct RunOptions {
    pub input_root: PathBuf,
    pub output_root: PathBuf,
    pub layout: Layout,
    pub workers: usize,
    pub logs_dir: PathBuf,
}

#[derive(Debug)]
pub struct RunSummary {
    pub discovered: usize,
    pub relocated: usize,
    pub album_items: usize,
    pub cancelled: bool,
    pub logs: ErrorLogPaths,
}

/// Drives the full run: metadata fix, relocation, manifest merges, log
/// flush. Phases are separated by hard barriers; work inside a phase runs on
/// a bounded worker pool.
pub struct Organizer {
    exiftool: ExifTool,
    options: RunOptions,
    albums: Option<AlbumStore>,
    sink: ErrorSink,
    cancel: CancellationToken,
}

impl Organizer {
    pub fn new(exiftool: ExifTool, options: RunOptions, albums: Option<AlbumStore>) -> Self {
        Self {
            exiftool,
            options,
            albums,
            sink: ErrorSink::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Token an external signal handler can trip to stop new work. Files
    /// already renamed or moved stay that way; there is no rollback.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn run(&self) -> Result<RunSummary, PipelineError> {
        // The walk is synchronous; keep it off the async workers.
        let input_root = self.options.input_root.clone();
        let files = tokio::task::spawn_blocking(move || scan::collect_media_files(&input_root))
            .await
            .map_err(|err| PipelineError::Io(io::Error::other(err)))??;
        info!(
            "Discovered {} media files under {}",
            files.len(),
            self.options.input_root.display()
        );
        let discovered = files.len();

        let files = self.metadata_phase(files).await;
        let (relocated, updates) = self.relocation_phase(files).await?;
        let album_items = self.merge_phase(updates).await;

        let logs = self
            .sink
            .flush(&self.options.logs_dir)
            .await
            .map_err(PipelineError::Io)?;
        let (metadata_errors, relocation_errors, duplicates) = self.sink.counts();
        info!(
            "Run finished: {} discovered, {} relocated, {} album items, {} metadata errors, {} relocation errors, {} duplicates renamed",
            discovered, relocated, album_items, metadata_errors, relocation_errors, duplicates
        );

        Ok(RunSummary {
            discovered,
            relocated,
            album_items,
            cancelled: self.cancel.is_cancelled(),
            logs,
        })
    }

    async fn metadata_phase(&self, files: Vec<MediaFile>) -> Vec<MediaFile> {
        info!("Fixing metadata with {} workers", self.options.workers);
        let semaphore = Arc::new(Semaphore::new(self.options.workers));
        let mut tasks = JoinSet::new();

        let mut pending = files.into_iter();
        loop {
            if self.cancel.is_cancelled() {
                let remaining = pending.len();
                if remaining > 0 {
                    warn!(
                        "Cancellation requested; {} files left untouched",
                        remaining
                    );
                }
                break;
            }
            let Some(media) = pending.next() else { break };
            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                break;
            };
            let exiftool = self.exiftool.clone();
            let sink = self.sink.clone();
            tasks.spawn(async move {
                let _permit = permit;
                normalize::normalize_file(&exiftool, &sink, media).await
            });
        }

        let mut out = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(media) => out.push(media),
                Err(err) => warn!("Metadata worker failed: {}", err),
            }
        }
        out
    }

    async fn relocation_phase(
        &self,
        files: Vec<MediaFile>,
    ) -> Result<(usize, Vec<AlbumUpdate>), PipelineError> {
        info!(
            "Relocating {} files into {}",
            files.len(),
            self.options.output_root.display()
        );
        let semaphore = Arc::new(Semaphore::new(self.options.workers));
        let known_albums = self
            .albums
            .as_ref()
            .map(|store| Arc::new(store.names().clone()));
        let mut tasks = JoinSet::new();

        let mut pending = files.into_iter();
        loop {
            if self.cancel.is_cancelled() {
                let remaining = pending.len();
                if remaining > 0 {
                    warn!("Cancellation requested; {} files not relocated", remaining);
                }
                break;
            }
            let Some(media) = pending.next() else { break };
            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                break;
            };
            let exiftool = self.exiftool.clone();
            let sink = self.sink.clone();
            let output_root = self.options.output_root.clone();
            let layout = self.options.layout;
            let known_albums = known_albums.clone();
            tasks.spawn(async move {
                let _permit = permit;
                relocate::relocate_file(
                    &exiftool,
                    &output_root,
                    layout,
                    known_albums.as_deref(),
                    &media,
                    &sink,
                )
                .await
            });
        }

        let mut relocated = 0usize;
        let mut updates = Vec::new();
        let mut fatal: Option<PipelineError> = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(outcome)) => {
                    if outcome.destination.is_some() {
                        relocated += 1;
                    }
                    if let Some(update) = outcome.update {
                        updates.push(update);
                    }
                }
                Ok(Err(err)) => {
                    // Structural: stop handing out new work, drain the rest.
                    if fatal.is_none() {
                        self.cancel.cancel();
                        fatal = Some(err);
                    }
                }
                Err(err) => warn!("Relocation worker failed: {}", err),
            }
        }
        if let Some(err) = fatal {
            return Err(err);
        }
        Ok((relocated, updates))
    }

    /// Merges album updates grouped per collection. Collections are
    /// independent and merge concurrently; a failed merge is reported and
    /// leaves the other collections alone.
    async fn merge_phase(&self, updates: Vec<AlbumUpdate>) -> usize {
        let Some(store) = &self.albums else {
            return 0;
        };
        if updates.is_empty() {
            return 0;
        }

        let mut grouped: HashMap<String, Vec<AlbumItem>> = HashMap::new();
        for update in updates {
            grouped.entry(update.collection).or_default().push(update.item);
        }
        info!("Updating {} album manifests", grouped.len());

        let mut tasks = JoinSet::new();
        for (collection, items) in grouped {
            let store = store.clone();
            let sink = self.sink.clone();
            tasks.spawn(async move {
                match store.merge_items(&collection, items).await {
                    Ok(added) => {
                        info!("Album '{}' gained {} new items", collection, added);
                        added
                    }
                    Err(err) => {
                        warn!("Manifest merge failed for '{}': {}", collection, err);
                        sink.relocation_error(
                            &store.manifest_path(&collection),
                            &FileError::ManifestMerge(err),
                        );
                        0
                    }
                }
            });
        }

        let mut total = 0usize;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(added) => total += added,
                Err(err) => warn!("Manifest merge worker failed: {}", err),
            }
        }
        total
    }
}

#[derive(Debug)]
pub enum PipelineError {
    MissingInput(PathBuf),
    CreateDir { path: PathBuf, source: io::Error },
    Io(io::Error),
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::MissingInput(path) => {
                write!(f, "input directory not found: {}", path.display())
            }
            PipelineError::CreateDir { path, source } => {
                write!(f, "failed to create {}: {}", path.display(), source)
            }
            PipelineError::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<io::Error> for PipelineError {
    fn from(err: io::Error) -> Self {
        PipelineError::Io(err)
    }
}
