use std::path::{Path, PathBuf};

use common::{album_key, supported_media_ext};
use metadata::sidecar_path_for;
use tracing::debug;
use walkdir::WalkDir;

use crate::PipelineError;

/// A media file while it is being processed. The record is transient; the
/// path is updated in place as the file is renamed and moved.
#[derive(Clone, Debug)]
pub struct MediaFile {
    pub path: PathBuf,
    /// Sidecar location fixed at discovery time; renaming the media file
    /// does not move its sidecar.
    pub sidecar_path: PathBuf,
    /// Lowercased name of the folder the file was discovered in, used as a
    /// candidate album key during relocation.
    pub album_hint: Option<String>,
}

pub fn collect_media_files(root: &Path) -> Result<Vec<MediaFile>, PipelineError> {
    if !root.is_dir() {
        return Err(PipelineError::MissingInput(root.to_path_buf()));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(Result::ok)
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if !supported_media_ext(path) {
            debug!("Skipping unsupported file {}", path.display());
            continue;
        }
        let album_hint = path
            .parent()
            .and_then(|dir| dir.file_name())
            .map(|name| album_key(&name.to_string_lossy()));
        files.push(MediaFile {
            path: path.to_path_buf(),
            sidecar_path: sidecar_path_for(path),
            album_hint,
        });
    }
    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::collect_media_files;
    use std::fs;

    #[test]
    fn walks_only_allow_listed_files() {
        let dir = tempfile::tempdir().unwrap();
        let vacation = dir.path().join("Vacation 2022");
        fs::create_dir_all(&vacation).unwrap();
        fs::write(vacation.join("a.jpg"), b"x").unwrap();
        fs::write(vacation.join("b.MP4"), b"x").unwrap();
        fs::write(vacation.join("notes.txt"), b"x").unwrap();
        fs::write(vacation.join("c.jpeg"), b"x").unwrap();
        fs::write(
            vacation.join("a.jpg.supplemental-metadata.json"),
            b"{}",
        )
        .unwrap();

        let files = collect_media_files(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|f| f.path.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.jpg", "b.MP4"]);
        assert_eq!(files[0].album_hint.as_deref(), Some("vacation 2022"));
        assert_eq!(
            files[0].sidecar_path,
            vacation.join("a.jpg.supplemental-metadata.json")
        );
    }

    #[test]
    fn missing_root_is_a_structural_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(collect_media_files(&missing).is_err());
    }
}
