//! Configuration types for the takeout reconciler

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use crate::naming::split_extension;

/// Which resolved groups end up in the export folder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ExportMode {
    /// Export every file
    #[default]
    All,
    /// Export only images that were paired with a live video, plus that video
    Live,
    /// Export every base-name group that contains at least one live pair
    LiveAndConfusing,
}

/// Media kind used for live-photo pairing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Image,
    Video,
    Other,
}

/// Configuration for the takeout reconciler
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Folder holding the extracted takeout bundles as direct subfolders
    pub root_dir: PathBuf,

    /// Export filter
    pub export_mode: ExportMode,

    /// Name of the output folder created inside `root_dir`
    pub output_folder: String,

    /// Name of the append-only log file written inside `root_dir`
    pub log_file: String,

    /// File and folder names skipped everywhere (OS and tool junk)
    pub ignored_names: Vec<String>,

    /// Album-level metadata files that never belong to a media file
    pub album_metadata_files: Vec<String>,

    /// Concurrent workers resolving base-name groups
    pub resolve_workers: usize,

    /// Concurrent workers writing file groups of one album
    pub export_workers: usize,

    /// Videos at or above this size are never live-photo companions
    pub live_video_max_bytes: u64,

    /// Maximum capture time difference of a live pair, in seconds
    pub live_match_threshold_secs: i64,

    /// Extracted dates on or before this day are treated as clock defaults
    pub date_floor: NaiveDate,

    /// exiftool executable used as the last-resort date source
    pub exiftool: PathBuf,

    /// Extensions classified as images
    pub image_extensions: Vec<String>,

    /// Extensions classified as videos
    pub video_extensions: Vec<String>,

    /// Image extensions read with the embedded EXIF reader
    pub exif_extensions: Vec<String>,

    /// Video extensions read with the ISO base media (mvhd) reader
    pub container_extensions: Vec<String>,

    /// Verbose output
    pub verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("."),
            export_mode: ExportMode::default(),
            output_folder: "Prepared_Photos".into(),
            log_file: "Takeout_Reconcile_log.txt".into(),
            ignored_names: vec![".DS_Store".into(), "Thumbs.db".into(), ".dtrash".into()],
            album_metadata_files: vec!["Metadata.json".into(), "Metadaten.json".into()],
            resolve_workers: 128,
            export_workers: 16,
            live_video_max_bytes: 20 * 1024 * 1024, // 20MB
            live_match_threshold_secs: 24 * 60 * 60,
            date_floor: NaiveDate::from_ymd_opt(1972, 1, 1).unwrap_or_default(),
            exiftool: PathBuf::from("exiftool"),
            image_extensions: vec![
                "heic".into(), "heif".into(), "jpeg".into(), "jpg".into(), "png".into(),
                "gif".into(), "bmp".into(), "tiff".into(), "webp".into(),
            ],
            video_extensions: vec![
                "mov".into(), "mp4".into(), "m4v".into(), "avi".into(), "wmv".into(),
                "flv".into(), "mkv".into(), "webm".into(), "3gp".into(), "3g2".into(),
                "ogv".into(), "mpg".into(), "mp".into(),
            ],
            exif_extensions: vec![
                "jpg".into(), "jpeg".into(), "tif".into(), "tiff".into(), "png".into(),
                "heic".into(), "webp".into(),
            ],
            container_extensions: vec![
                "mp4".into(), "mov".into(), "m4v".into(), "3gp".into(), "3g2".into(),
            ],
            verbose: false,
        }
    }
}

fn contains_ext(list: &[String], ext: &str) -> bool {
    let ext_lower = ext.to_lowercase();
    list.iter().any(|e| e == &ext_lower)
}

impl Config {
    /// Classify a file name by the extension after its last dot
    pub fn media_kind(&self, file_name: &str) -> MediaKind {
        match split_extension(file_name).1 {
            Some(ext) if contains_ext(&self.image_extensions, ext) => MediaKind::Image,
            Some(ext) if contains_ext(&self.video_extensions, ext) => MediaKind::Video,
            _ => MediaKind::Other,
        }
    }

    /// Check if an extension carries embedded EXIF capture metadata
    pub fn is_exif_type(&self, ext: &str) -> bool {
        contains_ext(&self.exif_extensions, ext)
    }

    /// Check if an extension is an ISO base media container
    pub fn is_container_type(&self, ext: &str) -> bool {
        contains_ext(&self.container_extensions, ext)
    }

    /// Check if a directory entry name is on the ignore list
    pub fn is_ignored(&self, name: &OsStr) -> bool {
        self.ignored_names.iter().any(|n| OsStr::new(n) == name)
    }

    /// Check if a metadata file name is an album-level file
    pub fn is_album_metadata(&self, name: &str) -> bool {
        self.album_metadata_files.iter().any(|n| n == name)
    }

    /// Output folder inside the root
    pub fn output_dir(&self) -> PathBuf {
        self.root_dir.join(&self.output_folder)
    }

    /// Log sink file inside the root
    pub fn log_path(&self) -> PathBuf {
        self.root_dir.join(&self.log_file)
    }

    /// Check settings that would make the pipeline misbehave
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.resolve_workers == 0 || self.export_workers == 0 {
            return Err(ConfigError::Invalid(
                "worker counts must be at least 1".to_string(),
            ));
        }
        if self.live_match_threshold_secs < 0 {
            return Err(ConfigError::Invalid(
                "live_match_threshold_secs must not be negative".to_string(),
            ));
        }
        if self.output_folder.is_empty() || self.output_folder.contains(['/', '\\']) {
            return Err(ConfigError::Invalid(format!(
                "output_folder must be a plain folder name, got '{}'",
                self.output_folder
            )));
        }
        Ok(())
    }

    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;

        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError {
                path: path.to_path_buf(),
                source: e,
            })?;
        }

        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError {
            source: e,
        })?;

        fs::write(path, content).map_err(|e| ConfigError::WriteError {
            path: path.to_path_buf(),
            source: e,
        })?;

        Ok(())
    }

    /// Generate a sample configuration file content
    pub fn sample_config() -> String {
        r#"# Takeout Reconcile Configuration File
# This file uses TOML format (https://toml.io)

# Folder that holds the extracted takeout bundles as direct subfolders
root_dir = "D:/Takeout"

# Export mode: "all", "live", or "live-and-confusing"
# - all: export every file
# - live: export only live photos (image + paired video)
# - live-and-confusing: export every file sharing a base name with a live photo
export_mode = "all"

# Output folder created inside root_dir; must be missing or empty
output_folder = "Prepared_Photos"

# Append-only log written inside root_dir
log_file = "Takeout_Reconcile_log.txt"

# Names skipped everywhere
ignored_names = [".DS_Store", "Thumbs.db", ".dtrash"]

# Album-level metadata files that are not reported as unused sidecars
album_metadata_files = ["Metadata.json", "Metadaten.json"]

# Worker pool sizes
resolve_workers = 128
export_workers = 16

# Videos of this size or larger never pair with an image (20MB)
live_video_max_bytes = 20971520

# Maximum capture time difference of a live pair (24 hours)
live_match_threshold_secs = 86400

# Dates on or before this day are re-checked with exiftool
date_floor = "1972-01-01"

# exiftool executable
exiftool = "exiftool"

# Debug-level logging, same as --verbose
verbose = false
"#
        .to_string()
    }
}

/// Errors that can occur when loading or saving configuration
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read configuration file
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to parse configuration file
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },
    /// Failed to write configuration file
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to serialize configuration
    SerializeError {
        source: toml::ser::Error,
    },
    /// Settings are out of range
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError { path, source } => {
                write!(f, "Failed to read config file '{}': {}", path.display(), source)
            }
            ConfigError::ParseError { path, source } => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), source)
            }
            ConfigError::WriteError { path, source } => {
                write!(f, "Failed to write config file '{}': {}", path.display(), source)
            }
            ConfigError::SerializeError { source } => {
                write!(f, "Failed to serialize config: {}", source)
            }
            ConfigError::Invalid(message) => write!(f, "Invalid configuration: {}", message),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::ReadError { source, .. } => Some(source),
            ConfigError::ParseError { source, .. } => Some(source),
            ConfigError::WriteError { source, .. } => Some(source),
            ConfigError::SerializeError { source } => Some(source),
            ConfigError::Invalid(_) => None,
        }
    }
}
