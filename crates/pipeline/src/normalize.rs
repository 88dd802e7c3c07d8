use std::io;
use std::path::{Path, PathBuf};

use common::MediaKind;
use metadata::dates::resolve_capture_time;
use metadata::{read_sidecar, ExifTool};
use tracing::{debug, warn};

use crate::report::{ErrorSink, FileError};
use crate::scan::MediaFile;

/// Fixes one file's extension and timestamps from its metadata sources.
/// Failures are recorded and the (possibly renamed) file is returned so the
/// relocation phase still sees it.
pub async fn normalize_file(exiftool: &ExifTool, sink: &ErrorSink, mut media: MediaFile) -> MediaFile {
    let (kind, fields) = match exiftool.read_media_fields(&media.path).await {
        Ok(result) => result,
        Err(err) => {
            warn!("Metadata read failed for {}: {}", media.path.display(), err);
            sink.metadata_error(&media.path, &FileError::MetadataRead(err));
            return media;
        }
    };

    match kind {
        Some(kind) => match correct_extension(&media.path, kind).await {
            Ok(Some(renamed)) => {
                debug!(
                    "Corrected extension: {} -> {}",
                    media.path.display(),
                    renamed.display()
                );
                media.path = renamed;
            }
            Ok(None) => {}
            Err(err) => {
                sink.metadata_error(&media.path, &FileError::ExtensionRename(err));
            }
        },
        None => debug!(
            "Unrecognized file type for {}; extension left alone",
            media.path.display()
        ),
    }

    let sidecar = read_sidecar(&media.sidecar_path).await;
    let taken = resolve_capture_time(
        sidecar.as_ref().and_then(|s| s.taken_time()),
        &fields,
    );
    let Some(taken) = taken else {
        sink.metadata_error(&media.path, &FileError::NoTimestamp);
        return media;
    };

    if let Err(err) = exiftool.write_capture_time(&media.path, taken).await {
        warn!(
            "Timestamp write failed for {}: {}",
            media.path.display(),
            err
        );
        sink.metadata_error(&media.path, &FileError::TimestampWrite(err));
    }
    media
}

/// Renames the file to its canonical extension if it differs. A file already
/// at the canonical name stays untouched; an occupied target gets a numeric
/// counter appended to the stem.
pub async fn correct_extension(
    path: &Path,
    kind: MediaKind,
) -> Result<Option<PathBuf>, io::Error> {
    let current = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase());
    if current.as_deref() == Some(kind.canonical_ext()) {
        return Ok(None);
    }

    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_default();
    let mut target = path.with_extension(kind.canonical_ext());
    let mut counter = 1u32;
    while tokio::fs::metadata(&target).await.is_ok() {
        target = path.with_file_name(format!("{}_{}.{}", stem, counter, kind.canonical_ext()));
        counter += 1;
    }
    tokio::fs::rename(path, &target).await?;
    Ok(Some(target))
}

#[cfg(test)]
mod tests {
    use super::correct_extension;
    use common::MediaKind;
    use std::fs;

    #[tokio::test]
    async fn matching_extension_is_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.jpg");
        fs::write(&path, b"x").unwrap();

        assert!(correct_extension(&path, MediaKind::Jpeg)
            .await
            .unwrap()
            .is_none());
        assert!(correct_extension(&path, MediaKind::Jpeg)
            .await
            .unwrap()
            .is_none());
        assert!(path.exists());
    }

    #[tokio::test]
    async fn extension_case_does_not_trigger_a_rename() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.JPG");
        fs::write(&path, b"x").unwrap();

        assert!(correct_extension(&path, MediaKind::Jpeg)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn mismatched_extension_is_corrected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shot.jpg");
        fs::write(&path, b"x").unwrap();

        let renamed = correct_extension(&path, MediaKind::Png)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(renamed, dir.path().join("shot.png"));
        assert!(!path.exists());
        assert!(renamed.exists());
    }

    #[tokio::test]
    async fn occupied_canonical_name_gets_a_counter() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shot.jpg");
        fs::write(&path, b"x").unwrap();
        fs::write(dir.path().join("shot.png"), b"other").unwrap();
        fs::write(dir.path().join("shot_1.png"), b"other").unwrap();

        let renamed = correct_extension(&path, MediaKind::Png)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(renamed, dir.path().join("shot_2.png"));
        assert!(renamed.exists());
        assert!(dir.path().join("shot.png").exists());
    }
}
