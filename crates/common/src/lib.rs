use serde::{Deserialize, Serialize};
use std::path::Path;

pub const MEDIA_EXTENSIONS: [&str; 4] = ["jpg", "heic", "png", "mp4"];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Jpeg,
    Heic,
    Png,
    Mp4,
}

impl MediaKind {
    /// Maps an exiftool `FileType` value to a supported kind.
    pub fn from_file_type(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "JPEG" => Some(MediaKind::Jpeg),
            "HEIC" | "HEIF" => Some(MediaKind::Heic),
            "PNG" => Some(MediaKind::Png),
            "MP4" => Some(MediaKind::Mp4),
            _ => None,
        }
    }

    pub fn canonical_ext(&self) -> &'static str {
        match self {
            MediaKind::Jpeg => "jpg",
            MediaKind::Heic => "heic",
            MediaKind::Png => "png",
            MediaKind::Mp4 => "mp4",
        }
    }

}

pub fn supported_media_ext(path: &Path) -> bool {
    match path.extension() {
        Some(ext) => {
            let ext = ext.to_string_lossy().to_ascii_lowercase();
            MEDIA_EXTENSIONS.contains(&ext.as_str())
        }
        None => false,
    }
}

/// One file attributed to an album, as persisted in the manifest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlbumItem {
    pub name: String,
    pub relative_path: String,
    pub full_path: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorRecord {
    #[serde(rename = "Path")]
    pub path: String,
    #[serde(rename = "Message")]
    pub message: String,
}

/// Canonical key for an album name: trimmed and lowercased.
pub fn album_key(name: &str) -> String {
    name.trim().to_lowercase()
}

pub fn relpath_from(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    Some(path_to_slash_string(rel))
}

fn path_to_slash_string(path: &Path) -> String {
    let parts: Vec<String> = path
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect();
    parts.join("/")
}

#[cfg(test)]
mod tests {
    use super::{album_key, relpath_from, supported_media_ext, MediaKind};
    use std::path::Path;

    #[test]
    fn file_type_maps_to_kind() {
        assert_eq!(MediaKind::from_file_type("JPEG"), Some(MediaKind::Jpeg));
        assert_eq!(MediaKind::from_file_type("heic"), Some(MediaKind::Heic));
        assert_eq!(MediaKind::from_file_type(" PNG "), Some(MediaKind::Png));
        assert_eq!(MediaKind::from_file_type("MP4"), Some(MediaKind::Mp4));
        assert_eq!(MediaKind::from_file_type("GIF"), None);
    }

    #[test]
    fn extension_allow_list_is_case_insensitive() {
        assert!(supported_media_ext(Path::new("a.JPG")));
        assert!(supported_media_ext(Path::new("b.mp4")));
        assert!(!supported_media_ext(Path::new("c.jpeg")));
        assert!(!supported_media_ext(Path::new("noext")));
    }

    #[test]
    fn album_key_trims_and_lowercases() {
        assert_eq!(album_key("  Summer 2023 "), "summer 2023");
        assert_eq!(album_key(""), "");
    }

    #[test]
    fn relpath_uses_forward_slashes() {
        let root = Path::new("/out");
        let path = Path::new("/out/2023/pictures/a.jpg");
        assert_eq!(
            relpath_from(root, path).as_deref(),
            Some("2023/pictures/a.jpg")
        );
        assert_eq!(relpath_from(Path::new("/other"), path), None);
    }
}
