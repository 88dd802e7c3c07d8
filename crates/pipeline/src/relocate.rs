use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Datelike;
use common::{relpath_from, AlbumItem};
use metadata::dates::resolve_capture_time;
use metadata::{read_sidecar, ExifTool};
use tracing::{debug, warn};

use crate::report::{ErrorSink, FileError};
use crate::scan::MediaFile;
use crate::{Layout, PipelineError};

const PICTURES_DIR: &str = "pictures";
const MOVIES_DIR: &str = "movies";

/// A file attributed to a collection during relocation, merged into the
/// manifest once the parallel phase is over.
#[derive(Clone, Debug)]
pub struct AlbumUpdate {
    pub collection: String,
    pub item: AlbumItem,
}

#[derive(Debug, Default)]
pub struct RelocateOutcome {
    pub destination: Option<PathBuf>,
    pub update: Option<AlbumUpdate>,
}

/// Moves one file into the configured layout. Per-file problems are recorded
/// in the sink; only a failure to create a destination directory is
/// structural and aborts the run.
pub async fn relocate_file(
    exiftool: &ExifTool,
    output_root: &Path,
    layout: Layout,
    known_albums: Option<&HashSet<String>>,
    media: &MediaFile,
    sink: &ErrorSink,
) -> Result<RelocateOutcome, PipelineError> {
    let type_dir = if is_movie(&media.path) {
        MOVIES_DIR
    } else {
        PICTURES_DIR
    };

    let dest_dir = match layout {
        Layout::Flat => output_root.join(type_dir),
        Layout::Year => {
            // Fresh resolution; the metadata-fix phase already wrote the
            // corrected dates into the file itself. The sidecar still sits
            // at its discovery-time path.
            let sidecar = read_sidecar(&media.sidecar_path).await;
            let fields = match exiftool.date_fields(&media.path).await {
                Ok(fields) => fields,
                Err(err) => {
                    warn!(
                        "Metadata read failed for {}: {}",
                        media.path.display(),
                        err
                    );
                    sink.relocation_error(&media.path, &FileError::MetadataRead(err));
                    return Ok(RelocateOutcome::default());
                }
            };
            let taken =
                resolve_capture_time(sidecar.as_ref().and_then(|s| s.taken_time()), &fields);
            let Some(taken) = taken else {
                sink.relocation_error(&media.path, &FileError::NoTimestamp);
                return Ok(RelocateOutcome::default());
            };
            output_root.join(taken.year().to_string()).join(type_dir)
        }
    };

    tokio::fs::create_dir_all(&dest_dir)
        .await
        .map_err(|source| PipelineError::CreateDir {
            path: dest_dir.clone(),
            source,
        })?;

    let file_name = match media.path.file_name() {
        Some(name) => name.to_string_lossy().to_string(),
        None => {
            sink.relocation_error(
                &media.path,
                &FileError::Relocation(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "source path has no file name",
                )),
            );
            return Ok(RelocateOutcome::default());
        }
    };

    let preferred = dest_dir.join(&file_name);
    let destination = unique_destination(&preferred).await;

    if let Err(err) = move_file(&media.path, &destination).await {
        warn!(
            "Move failed for {} -> {}: {}",
            media.path.display(),
            destination.display(),
            err
        );
        sink.relocation_error(&media.path, &FileError::Relocation(err));
        return Ok(RelocateOutcome::default());
    }
    if destination != preferred {
        sink.duplicate_notice(
            &media.path,
            format!(
                "destination existed; stored as {}",
                destination.display()
            ),
        );
    }
    debug!(
        "Moved {} -> {}",
        media.path.display(),
        destination.display()
    );

    let update = known_albums.and_then(|known| {
        let hint = media.album_hint.as_deref()?;
        if !known.contains(hint) {
            return None;
        }
        let dest_name = destination.file_name()?.to_string_lossy().to_string();
        Some(AlbumUpdate {
            collection: hint.to_string(),
            item: AlbumItem {
                name: dest_name,
                relative_path: relpath_from(output_root, &destination)
                    .unwrap_or_else(|| destination.display().to_string()),
                full_path: destination.display().to_string(),
            },
        })
    });

    Ok(RelocateOutcome {
        destination: Some(destination),
        update,
    })
}

fn is_movie(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case("mp4"))
        .unwrap_or(false)
}

/// First free destination path. Collisions get a counter-numbered
/// `_duplicate_` suffix; names are never reused, content never compared.
async fn unique_destination(preferred: &Path) -> PathBuf {
    if tokio::fs::metadata(preferred).await.is_err() {
        return preferred.to_path_buf();
    }
    let stem = preferred
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_default();
    let ext = preferred
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();
    let mut counter = 1u32;
    loop {
        let candidate =
            preferred.with_file_name(format!("{}_duplicate_{}{}", stem, counter, ext));
        if tokio::fs::metadata(&candidate).await.is_err() {
            return candidate;
        }
        counter += 1;
    }
}

/// Plain rename within a volume; falls back to copy and remove when the
/// destination is on a different filesystem.
async fn move_file(from: &Path, to: &Path) -> Result<(), io::Error> {
    match tokio::fs::rename(from, to).await {
        Ok(()) => Ok(()),
        Err(_) => {
            tokio::fs::copy(from, to).await?;
            tokio::fs::remove_file(from).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{relocate_file, unique_destination};
    use crate::report::ErrorSink;
    use crate::scan::MediaFile;
    use crate::Layout;
    use metadata::{sidecar_path_for, ExifTool};
    use std::collections::HashSet;
    use std::fs;
    use std::path::Path;

    fn media(path: &Path, hint: &str) -> MediaFile {
        MediaFile {
            path: path.to_path_buf(),
            sidecar_path: sidecar_path_for(path),
            album_hint: Some(hint.to_string()),
        }
    }

    // Flat layout never consults the external tool, so a dummy command works.
    fn tool() -> ExifTool {
        ExifTool::new("exiftool")
    }

    #[tokio::test]
    async fn flat_layout_splits_pictures_and_movies() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("in");
        let out = dir.path().join("out");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("a.jpg"), b"x").unwrap();
        fs::write(src.join("b.mp4"), b"x").unwrap();

        let sink = ErrorSink::new();
        for name in ["a.jpg", "b.mp4"] {
            relocate_file(
                &tool(),
                &out,
                Layout::Flat,
                None,
                &media(&src.join(name), "in"),
                &sink,
            )
            .await
            .unwrap();
        }

        assert!(out.join("pictures/a.jpg").exists());
        assert!(out.join("movies/b.mp4").exists());
        assert!(!src.join("a.jpg").exists());
        assert_eq!(sink.counts(), (0, 0, 0));
    }

    #[tokio::test]
    async fn name_collision_renames_with_duplicate_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("one");
        let second = dir.path().join("two");
        let out = dir.path().join("out");
        fs::create_dir_all(&first).unwrap();
        fs::create_dir_all(&second).unwrap();
        fs::write(first.join("a.jpg"), b"first").unwrap();
        fs::write(second.join("a.jpg"), b"second").unwrap();

        let sink = ErrorSink::new();
        for src in [first.join("a.jpg"), second.join("a.jpg")] {
            relocate_file(&tool(), &out, Layout::Flat, None, &media(&src, "x"), &sink)
                .await
                .unwrap();
        }

        assert!(out.join("pictures/a.jpg").exists());
        assert!(out.join("pictures/a_duplicate_1.jpg").exists());
        let (_, _, duplicates) = sink.counts();
        assert_eq!(duplicates, 1);
    }

    #[tokio::test]
    async fn matching_folder_name_emits_an_album_update() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("summer trip");
        let out = dir.path().join("out");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("a.jpg"), b"x").unwrap();

        let known: HashSet<String> = ["summer trip".to_string()].into_iter().collect();
        let sink = ErrorSink::new();
        let outcome = relocate_file(
            &tool(),
            &out,
            Layout::Flat,
            Some(&known),
            &media(&src.join("a.jpg"), "summer trip"),
            &sink,
        )
        .await
        .unwrap();

        let update = outcome.update.unwrap();
        assert_eq!(update.collection, "summer trip");
        assert_eq!(update.item.relative_path, "pictures/a.jpg");
        assert_eq!(update.item.name, "a.jpg");

        // A hint that is not a known album produces no update.
        fs::write(src.join("b.jpg"), b"x").unwrap();
        let outcome = relocate_file(
            &tool(),
            &out,
            Layout::Flat,
            Some(&known),
            &media(&src.join("b.jpg"), "not an album"),
            &sink,
        )
        .await
        .unwrap();
        assert!(outcome.update.is_none());
    }

    #[tokio::test]
    async fn unique_destination_counts_upward() {
        let dir = tempfile::tempdir().unwrap();
        let preferred = dir.path().join("a.jpg");
        assert_eq!(unique_destination(&preferred).await, preferred);

        fs::write(&preferred, b"x").unwrap();
        assert_eq!(
            unique_destination(&preferred).await,
            dir.path().join("a_duplicate_1.jpg")
        );
        fs::write(dir.path().join("a_duplicate_1.jpg"), b"x").unwrap();
        assert_eq!(
            unique_destination(&preferred).await,
            dir.path().join("a_duplicate_2.jpg")
        );
    }
}
