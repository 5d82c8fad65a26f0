//! Last-resort creation date via the exiftool binary

use crate::album::MediaFile;
use crate::error::{Error, Result};
use crate::log_sink::LogSink;
use crate::time::local_to_utc;
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;
use tracing::{debug, trace, warn};

/// exiftool fields to try, in priority order
pub const DATE_FIELDS: &[&str] = &["CreationDate", "CreateDate", "DateTimeOriginal"];

static COLON_DATE: OnceLock<Regex> = OnceLock::new();

fn colon_date() -> &'static Regex {
    COLON_DATE.get_or_init(|| Regex::new(r"^(\d{4}):(\d{2}):(\d{2})").unwrap())
}

/// Handle to an exiftool executable
pub struct ExifTool {
    program: PathBuf,
    available: OnceLock<bool>,
}

impl ExifTool {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            available: OnceLock::new(),
        }
    }

    /// Check if the executable runs (cached)
    pub fn is_available(&self) -> bool {
        *self.available.get_or_init(|| {
            let ok = Command::new(&self.program)
                .arg("-ver")
                .output()
                .is_ok_and(|o| o.status.success());
            if !ok {
                warn!(program = %self.program.display(), "exiftool not found, fallback dates disabled");
            }
            ok
        })
    }

    /// Run exiftool on `path` and return the JSON object of the date fields
    pub fn read_fields(&self, path: &Path) -> Result<Map<String, Value>> {
        let tool_error = |message: String| Error::MetadataTool {
            path: path.to_path_buf(),
            message,
        };

        let output = Command::new(&self.program)
            .args(["-json", "-n"])
            .args(DATE_FIELDS.iter().map(|f| format!("-{f}")))
            .arg(path)
            .output()
            .map_err(|e| tool_error(format!("Failed to execute exiftool: {e}")))?;

        // exiftool exits non-zero for files without the requested tags but
        // still prints a record
        if output.stdout.is_empty() {
            return Err(tool_error(format!(
                "exiftool failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        trace!(?path, "exiftool output: {}", String::from_utf8_lossy(&output.stdout));

        let records: Vec<Map<String, Value>> = serde_json::from_slice(&output.stdout)?;
        records
            .into_iter()
            .next()
            .ok_or_else(|| tool_error("exiftool returned no record".to_string()))
    }

    /// First parseable date field of `file`
    ///
    /// Unparseable date strings are reported to `log` and skipped.
    pub fn creation_date(&self, file: &MediaFile, log: &LogSink) -> Option<DateTime<Utc>> {
        if !self.is_available() {
            return None;
        }

        let fields = match self.read_fields(&file.path()) {
            Ok(fields) => fields,
            Err(e) => {
                debug!(file = %file.identifier(), error = %e, "exiftool gave no usable output");
                return None;
            }
        };

        first_date(&fields, |raw| {
            log.warning(format!("Could not parse date {}: {}", file.identifier(), raw));
        })
    }
}

/// Walk `DATE_FIELDS` and return the first value that parses
fn first_date(fields: &Map<String, Value>, on_unparseable: impl FnMut(&str)) -> Option<DateTime<Utc>> {
    first_date_in(fields, &Local, on_unparseable)
}

fn first_date_in<Tz: TimeZone>(
    fields: &Map<String, Value>,
    tz: &Tz,
    mut on_unparseable: impl FnMut(&str),
) -> Option<DateTime<Utc>> {
    for field in DATE_FIELDS {
        let raw = match fields.get(*field) {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => continue,
        };
        match parse_tool_date_in(&raw, tz) {
            Some(timestamp) => return Some(timestamp),
            None => on_unparseable(&raw),
        }
    }
    None
}

/// Parse an exiftool date string
///
/// `YYYY:MM:DD` is first rewritten to `YYYY-MM-DD`; if that does not parse,
/// the raw string is tried as is. Values without an offset are wall-clock
/// time in `tz`.
pub fn parse_tool_date_in<Tz: TimeZone>(raw: &str, tz: &Tz) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    let normalized = colon_date().replace(raw, "$1-$2-$3");
    parse_generic(&normalized, tz).or_else(|| parse_generic(raw, tz))
}

fn parse_generic<Tz: TimeZone>(s: &str, tz: &Tz) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    const WITH_OFFSET: &[&str] = &["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%z", "%Y-%m-%dT%H:%M:%S%.f%z"];
    if let Some(dt) = WITH_OFFSET
        .iter()
        .find_map(|format| DateTime::parse_from_str(s, format).ok())
    {
        return Some(dt.with_timezone(&Utc));
    }

    let (s, utc) = match s.strip_suffix('Z') {
        Some(stripped) => (stripped, true),
        None => (s, false),
    };
    const NAIVE: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M", "%Y/%m/%d %H:%M:%S"];
    let naive = NAIVE
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })?;

    Some(if utc { naive.and_utc() } else { local_to_utc(naive, tz) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::album::AlbumFolder;
    use std::sync::Arc;

    #[test]
    fn test_parse_colon_dates() {
        assert_eq!(
            parse_tool_date_in("2020:06:01 12:30:45", &Utc).unwrap().to_string(),
            "2020-06-01 12:30:45 UTC"
        );
        assert_eq!(
            parse_tool_date_in("2020:06:01 12:30:45.120", &Utc).unwrap().to_string(),
            "2020-06-01 12:30:45.120 UTC"
        );
    }

    #[test]
    fn test_parse_dates_with_offset_are_utc() {
        assert_eq!(
            parse_tool_date_in("2020:06:01 12:30:45+02:00", &Utc).unwrap().to_string(),
            "2020-06-01 10:30:45 UTC"
        );
        assert_eq!(
            parse_tool_date_in("2020-06-01T12:30:45Z", &Utc).unwrap().to_string(),
            "2020-06-01 12:30:45 UTC"
        );
    }

    #[test]
    fn test_naive_dates_are_local_time() {
        let berlin = chrono::FixedOffset::east_opt(7200).unwrap();
        assert_eq!(
            parse_tool_date_in("2020:06:01 12:30:45", &berlin).unwrap().to_string(),
            "2020-06-01 10:30:45 UTC"
        );
        // Explicit offsets and "Z" ignore the local zone
        assert_eq!(
            parse_tool_date_in("2020:06:01 12:30:45+02:00", &berlin).unwrap().to_string(),
            "2020-06-01 10:30:45 UTC"
        );
        assert_eq!(
            parse_tool_date_in("2020:06:01 12:30:45Z", &berlin).unwrap().to_string(),
            "2020-06-01 12:30:45 UTC"
        );
    }

    #[test]
    fn test_parse_date_only() {
        assert_eq!(
            parse_tool_date_in("2020:06:01", &Utc).unwrap().to_string(),
            "2020-06-01 00:00:00 UTC"
        );
    }

    #[test]
    fn test_unparseable_dates() {
        assert!(parse_tool_date_in("0000:00:00 00:00:00", &Utc).is_none());
        assert!(parse_tool_date_in("yesterday", &Utc).is_none());
        assert!(parse_tool_date_in("", &Utc).is_none());
    }

    #[test]
    fn test_first_date_reports_unparseable_fields() {
        let fields: Map<String, Value> = serde_json::from_str(
            r#"{"SourceFile":"a.mov","CreationDate":"0000:00:00 00:00:00","CreateDate":"2019:12:31 23:59:59"}"#,
        )
        .unwrap();

        let mut rejected = Vec::new();
        let date = first_date_in(&fields, &Utc, |raw| rejected.push(raw.to_string()));

        assert_eq!(date.unwrap().to_string(), "2019-12-31 23:59:59 UTC");
        assert_eq!(rejected, vec!["0000:00:00 00:00:00"]);
    }

    #[test]
    fn test_field_priority() {
        let fields: Map<String, Value> = serde_json::from_str(
            r#"{"DateTimeOriginal":"2001:01:01 00:00:00","CreateDate":"2002:02:02 00:00:00"}"#,
        )
        .unwrap();
        let date = first_date_in(&fields, &Utc, |_| panic!("nothing to reject"));
        assert_eq!(date.unwrap().to_string(), "2002-02-02 00:00:00 UTC");
    }

    #[test]
    fn test_missing_tool_yields_nothing() {
        let tool = ExifTool::new("takeout-reconcile-missing-exiftool");
        assert!(!tool.is_available());

        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.mov"), b"x").unwrap();
        let folder = Arc::new(AlbumFolder::from_path(dir.path(), dir.path()));
        let log = LogSink::in_memory();

        assert!(tool.creation_date(&MediaFile::new(&folder, "a.mov"), &log).is_none());
        assert!(log.recent().is_empty());
    }
}
