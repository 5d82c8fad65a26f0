//! Takeout Reconcile - merge split photo takeout bundles
//!
//! This library reconciles a photo export that was split across several
//! takeout bundles:
//! - Album discovery across bundles, merged by album name
//! - Sidecar matching under the truncating sidecar naming scheme
//! - Creation dates from EXIF, container headers and exiftool
//! - Greedy live-photo pairing of images with short videos
//! - Export into a fresh folder on a bounded worker pool

pub mod album;
pub mod cli;
pub mod config;
pub mod error;
pub mod export;
pub mod grouping;
pub mod live;
pub mod log_sink;
pub mod naming;
pub mod pipeline;
pub mod pool;
pub mod progress;
pub mod sidecar;
pub mod time;

pub use album::{AlbumFolder, Discovery, LogicalAlbum, MediaFile};
pub use cli::Cli;
pub use config::{Config, ConfigError, ExportMode, MediaKind};
pub use error::{Error, Result};
pub use export::{ExportReport, ResolvedAlbum};
pub use grouping::{BaseNameGroup, ReconciledEntry};
pub use log_sink::{LogEntry, LogSink, Severity};
pub use pipeline::{ReconcileStats, Reconciler};
pub use progress::{ProgressReporter, SilentProgress, TracingProgress};
pub use time::{CreationDateSource, DateExtractor};
