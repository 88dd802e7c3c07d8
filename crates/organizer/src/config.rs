use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use pipeline::{Layout, DEFAULT_WORKERS};
use serde::{Deserialize, Serialize};

pub const CONFIG_VERSION: u32 = 1;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct OrganizerConfig {
    pub version: u32,
    /// Directory the exported media was extracted into.
    pub input_root: String,
    /// Directory the organized layout is written under.
    pub output_root: String,
    pub layout: Layout,
    /// Plain text file with one album name per line; empty disables albums.
    pub albums_file: String,
    pub albums_dir: String,
    pub logs_dir: String,
    pub workers: usize,
    pub exiftool: String,
}

impl Default for OrganizerConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            input_root: "".to_string(),
            output_root: "".to_string(),
            layout: Layout::Year,
            albums_file: "".to_string(),
            albums_dir: "albums".to_string(),
            logs_dir: "logs".to_string(),
            workers: DEFAULT_WORKERS,
            exiftool: "exiftool".to_string(),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "io error: {}", err),
            ConfigError::Yaml(err) => write!(f, "yaml error: {}", err),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err)
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::Yaml(err)
    }
}

pub fn config_path_from_env() -> PathBuf {
    match env::var("ORGANIZER_CONFIG") {
        Ok(value) if !value.trim().is_empty() => PathBuf::from(value),
        _ => default_config_path(),
    }
}

fn default_config_path() -> PathBuf {
    match env::current_exe() {
        Ok(exe) => exe
            .parent()
            .map(|dir| dir.join("config.yaml"))
            .unwrap_or_else(|| PathBuf::from("config.yaml")),
        Err(_) => PathBuf::from("config.yaml"),
    }
}

pub fn load_or_create_config(path: &Path) -> Result<(OrganizerConfig, bool), ConfigError> {
    if path.exists() {
        let contents = fs::read_to_string(path)?;
        let mut config: OrganizerConfig = serde_yaml::from_str(&contents)?;
        if config.version < CONFIG_VERSION {
            config.version = CONFIG_VERSION;
        }
        if config.workers == 0 {
            config.workers = DEFAULT_WORKERS;
        }
        if config.albums_dir.trim().is_empty() {
            config.albums_dir = "albums".to_string();
        }
        if config.logs_dir.trim().is_empty() {
            config.logs_dir = "logs".to_string();
        }
        if config.exiftool.trim().is_empty() {
            config.exiftool = "exiftool".to_string();
        }
        return Ok((config, false));
    }

    let config = OrganizerConfig::default();
    save_config(path, &config)?;
    Ok((config, true))
}

pub fn save_config(path: &Path, config: &OrganizerConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let contents = serde_yaml::to_string(config)?;
    fs::write(path, contents)?;
    Ok(())
}

pub fn resolve_path(config_path: &Path, value: &str) -> PathBuf {
    let raw = PathBuf::from(value);
    if raw.is_absolute() {
        return raw;
    }
    let base = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    base.join(raw)
}
