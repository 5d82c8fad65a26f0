//! CLI argument parsing with clap

use crate::config::{Config, ExportMode};
use clap::Parser;
use std::path::PathBuf;

/// Takeout Reconcile - merge split photo takeout bundles into one album tree
///
/// Matches every media file with its JSON sidecar across all bundles,
/// links live photos with their short companion videos, and writes the
/// result to a fresh output folder next to the bundles.
#[derive(Parser, Debug)]
#[command(name = "takeout-reconcile")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to configuration file (TOML format)
    ///
    /// When specified, settings from the config file are used as defaults.
    /// CLI arguments will override config file settings.
    #[arg(short = 'C', long)]
    pub config: Option<PathBuf>,

    /// Folder holding the extracted takeout bundles as subfolders
    #[arg(short, long)]
    pub root: Option<PathBuf>,

    /// Export mode:
    /// - all: export every file (default)
    /// - live: export only live photos and their videos
    /// - live-and-confusing: export every group containing a live photo
    #[arg(short = 'M', long, value_enum)]
    pub mode: Option<ExportMode>,

    /// exiftool executable used as the last-resort date source
    #[arg(long)]
    pub exiftool: Option<PathBuf>,

    /// Only list the bundles and albums found, then exit
    #[arg(long)]
    pub list_albums: bool,

    /// Print a sample configuration file and exit
    #[arg(long)]
    pub sample_config: bool,

    /// Save the effective configuration to this TOML file and exit
    #[arg(long)]
    pub save_config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Output log format as JSON
    #[arg(long)]
    pub json_log: bool,
}

impl Cli {
    /// Get config file name (without extension) for log naming
    pub fn config_name(&self) -> Option<String> {
        self.config.as_ref().and_then(|p| {
            p.file_stem()
                .and_then(|s| s.to_str())
                .map(|s| s.to_string())
        })
    }

    /// Merge CLI arguments with config from file
    /// CLI arguments take precedence over config file settings
    pub fn merge_with_config(&self, mut config: Config) -> Config {
        if let Some(ref root) = self.root {
            config.root_dir = root.clone();
        }
        if let Some(mode) = self.mode {
            config.export_mode = mode;
        }
        if let Some(ref exiftool) = self.exiftool {
            config.exiftool = exiftool.clone();
        }
        if self.verbose {
            config.verbose = true;
        }

        config
    }

    /// Convert CLI arguments to Config (when no config file is used)
    pub fn to_config(&self) -> Config {
        self.merge_with_config(Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_arguments() {
        let cli = Cli::parse_from([
            "takeout-reconcile",
            "-r",
            "/data/takeout",
            "-M",
            "live-and-confusing",
            "--exiftool",
            "/opt/exiftool/exiftool",
            "-v",
        ]);

        let config = cli.to_config();
        assert_eq!(config.root_dir, PathBuf::from("/data/takeout"));
        assert_eq!(config.export_mode, ExportMode::LiveAndConfusing);
        assert_eq!(config.exiftool, PathBuf::from("/opt/exiftool/exiftool"));
        assert!(config.verbose);
        assert!(!cli.list_albums);
    }

    #[test]
    fn test_cli_overrides_file_settings() {
        let cli = Cli::parse_from(["takeout-reconcile", "-C", "Config/family.toml", "-M", "live"]);
        assert_eq!(cli.config_name().as_deref(), Some("family"));

        let file_config = Config {
            root_dir: PathBuf::from("/from/file"),
            export_mode: ExportMode::All,
            export_workers: 4,
            ..Config::default()
        };
        let merged = cli.merge_with_config(file_config);
        assert_eq!(merged.root_dir, PathBuf::from("/from/file"));
        assert_eq!(merged.export_mode, ExportMode::Live);
        assert_eq!(merged.export_workers, 4);
    }

    #[test]
    fn test_verbose_from_file_survives_merge() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("family.toml");
        std::fs::write(&path, "root_dir = \"/from/file\"\nverbose = true\n").unwrap();

        let cli = Cli::parse_from(["takeout-reconcile", "-C", "family"]);
        assert!(!cli.verbose);

        let merged = cli.merge_with_config(Config::load_from_file(&path).unwrap());
        assert!(merged.verbose);
        assert_eq!(merged.root_dir, PathBuf::from("/from/file"));
    }

    #[test]
    fn test_rejects_unknown_mode() {
        assert!(Cli::try_parse_from(["takeout-reconcile", "-M", "everything"]).is_err());
    }
}
