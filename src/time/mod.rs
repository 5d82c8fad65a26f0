//! Creation-date extraction
//!
//! Strategies, in order:
//! - Embedded EXIF for still images that carry it
//! - The `mvhd` movie header for ISO base media videos
//! - exiftool, when the above found nothing or a pre-floor clock default
//!
//! No strategy failure escapes this module; a failing strategy means
//! "no date from here".

pub mod container;
pub mod exif;
pub mod exiftool;

use chrono::{DateTime, NaiveDateTime, Offset, TimeDelta, TimeZone, Utc};
use tracing::{debug, trace};

use crate::album::MediaFile;
use crate::config::Config;
use crate::log_sink::LogSink;
use crate::naming::split_extension;

use self::exiftool::ExifTool;

/// Source of the extracted timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeSource {
    /// Extracted from EXIF metadata
    Exif,
    /// Extracted from the container's movie header
    Container,
    /// Reported by exiftool
    MetadataTool,
}

/// Result of timestamp extraction
#[derive(Debug, Clone)]
pub struct ExtractedTime {
    /// The extracted instant
    pub timestamp: DateTime<Utc>,
    /// Source of the timestamp
    pub source: TimeSource,
}

/// Anything that can tell the capture time of a media file
///
/// Implementations are called from many workers at once and must swallow
/// their own failures.
pub trait CreationDateSource: Send + Sync {
    fn creation_date(&self, file: &MediaFile, log: &LogSink) -> Option<DateTime<Utc>>;
}

/// Interpret a wall-clock time in `tz`
///
/// Ambiguous times take the earlier instant. Times skipped by a DST jump use
/// the offset in effect after the jump.
pub fn local_to_utc<Tz: TimeZone>(naive: NaiveDateTime, tz: &Tz) -> DateTime<Utc> {
    match tz.from_local_datetime(&naive).earliest() {
        Some(dt) => dt.with_timezone(&Utc),
        None => {
            let offset = tz.offset_from_utc_datetime(&naive).fix();
            (naive - TimeDelta::seconds(i64::from(offset.local_minus_utc()))).and_utc()
        }
    }
}

/// The cascading extractor used by the pipeline
pub struct DateExtractor {
    config: Config,
    exiftool: ExifTool,
}

impl DateExtractor {
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.clone(),
            exiftool: ExifTool::new(&config.exiftool),
        }
    }

    /// Best-known capture time of `file`, if any strategy finds one
    pub fn extract(&self, file: &MediaFile, log: &LogSink) -> Option<ExtractedTime> {
        let path = file.path();
        let mut found = None;

        if let Some(ext) = split_extension(&file.name).1 {
            if self.config.is_exif_type(ext) {
                match exif::extract_exif_time(&path) {
                    Ok(timestamp) => {
                        found = Some(ExtractedTime {
                            timestamp,
                            source: TimeSource::Exif,
                        })
                    }
                    Err(e) => debug!(file = %file.identifier(), error = %e, "No EXIF date"),
                }
            } else if self.config.is_container_type(ext) {
                match container::extract_container_time(&path) {
                    Ok(timestamp) => {
                        found = Some(ExtractedTime {
                            timestamp,
                            source: TimeSource::Container,
                        })
                    }
                    Err(e) => debug!(file = %file.identifier(), error = %e, "No container date"),
                }
            }
        }

        let needs_fallback = found
            .as_ref()
            .is_none_or(|t| t.timestamp.date_naive() <= self.config.date_floor);

        // A pre-floor value does not survive an empty fallback
        if needs_fallback {
            if found.is_some() {
                trace!(file = %file.identifier(), "Date on or before the floor, asking exiftool");
            }
            found = self
                .exiftool
                .creation_date(file, log)
                .map(|timestamp| ExtractedTime {
                    timestamp,
                    source: TimeSource::MetadataTool,
                });
        }

        if let Some(time) = &found {
            trace!(file = %file.identifier(), source = ?time.source, timestamp = %time.timestamp, "Extracted creation date");
        }
        found
    }
}

impl CreationDateSource for DateExtractor {
    fn creation_date(&self, file: &MediaFile, log: &LogSink) -> Option<DateTime<Utc>> {
        self.extract(file, log).map(|t| t.timestamp)
    }
}
