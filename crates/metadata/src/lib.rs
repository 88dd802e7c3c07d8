use std::path::{Path, PathBuf};
use std::process::Output;

use chrono::NaiveDateTime;
use common::MediaKind;
use serde::Deserialize;
use tokio::process::Command;

pub mod dates;

pub const SIDECAR_SUFFIX: &str = ".supplemental-metadata.json";

const WRITE_STAMP_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

/// Candidate capture-time fields as reported by exiftool.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct DateFields {
    #[serde(rename = "DateTimeOriginal")]
    pub date_time_original: Option<String>,
    #[serde(rename = "CreateDate")]
    pub create_date: Option<String>,
    #[serde(rename = "FileModifyDate")]
    pub file_modify_date: Option<String>,
}

/// Client for the external exiftool binary. One short-lived process per call.
#[derive(Clone, Debug)]
pub struct ExifTool {
    command: PathBuf,
}

impl ExifTool {
    pub fn new(command: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
        }
    }

    pub async fn version(&self) -> Result<String, MetadataError> {
        let output = Command::new(&self.command).arg("-ver").output().await?;
        let stdout = check_output(output)?;
        Ok(stdout.trim().to_string())
    }

    /// Detected real file type, independent of the current extension.
    pub async fn file_type(&self, path: &Path) -> Result<Option<MediaKind>, MetadataError> {
        let output = Command::new(&self.command)
            .arg("-s3")
            .arg("-FileType")
            .arg(path)
            .output()
            .await?;
        let stdout = check_output(output)?;
        Ok(MediaKind::from_file_type(&stdout))
    }

    pub async fn date_fields(&self, path: &Path) -> Result<DateFields, MetadataError> {
        let output = Command::new(&self.command)
            .arg("-j")
            .arg("-DateTimeOriginal")
            .arg("-CreateDate")
            .arg("-FileModifyDate")
            .arg(path)
            .output()
            .await?;
        let stdout = check_output(output)?;
        let entries: Vec<DateFields> = serde_json::from_str(&stdout)?;
        Ok(entries.into_iter().next().unwrap_or_default())
    }

    /// Type detection and date extraction are independent queries; issue both
    /// at once and wait for the pair.
    pub async fn read_media_fields(
        &self,
        path: &Path,
    ) -> Result<(Option<MediaKind>, DateFields), MetadataError> {
        let (kind, fields) = tokio::join!(self.file_type(path), self.date_fields(path));
        Ok((kind?, fields?))
    }

    /// Writes creation and modification time in one exiftool invocation.
    pub async fn write_capture_time(
        &self,
        path: &Path,
        taken: NaiveDateTime,
    ) -> Result<(), MetadataError> {
        let stamp = taken.format(WRITE_STAMP_FORMAT).to_string();
        let output = Command::new(&self.command)
            .arg("-overwrite_original")
            .arg(format!("-FileCreateDate={}", stamp))
            .arg(format!("-FileModifyDate={}", stamp))
            .arg(path)
            .output()
            .await?;
        check_output(output)?;
        Ok(())
    }
}

fn check_output(output: Output) -> Result<String, MetadataError> {
    if !output.status.success() {
        return Err(MetadataError::Tool {
            status: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8(output.stdout)?)
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct Sidecar {
    #[serde(rename = "photoTakenTime")]
    pub photo_taken_time: Option<PhotoTakenTime>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct PhotoTakenTime {
    pub formatted: Option<String>,
}

impl Sidecar {
    pub fn taken_time(&self) -> Option<&str> {
        let value = self.photo_taken_time.as_ref()?.formatted.as_deref()?;
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed)
        }
    }
}

pub fn sidecar_path_for(media_path: &Path) -> PathBuf {
    let mut name = media_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    name.push_str(SIDECAR_SUFFIX);
    media_path.with_file_name(name)
}

pub async fn read_sidecar(path: &Path) -> Option<Sidecar> {
    let data = tokio::fs::read(path).await.ok()?;
    serde_json::from_slice(&data).ok()
}

#[derive(Debug)]
pub enum MetadataError {
    Io(std::io::Error),
    Utf8(std::string::FromUtf8Error),
    Json(serde_json::Error),
    Tool {
        status: Option<i32>,
        stderr: String,
    },
}

impl std::fmt::Display for MetadataError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetadataError::Io(err) => write!(f, "io error: {}", err),
            MetadataError::Utf8(err) => write!(f, "invalid tool output: {}", err),
            MetadataError::Json(err) => write!(f, "malformed tool output: {}", err),
            MetadataError::Tool { status, stderr } => match status {
                Some(code) => write!(f, "exiftool exited with status {}: {}", code, stderr),
                None => write!(f, "exiftool terminated by signal: {}", stderr),
            },
        }
    }
}

impl std::error::Error for MetadataError {}

impl From<std::io::Error> for MetadataError {
    fn from(err: std::io::Error) -> Self {
        MetadataError::Io(err)
    }
}

impl From<std::string::FromUtf8Error> for MetadataError {
    fn from(err: std::string::FromUtf8Error) -> Self {
        MetadataError::Utf8(err)
    }
}

impl From<serde_json::Error> for MetadataError {
    fn from(err: serde_json::Error) -> Self {
        MetadataError::Json(err)
    }
}
