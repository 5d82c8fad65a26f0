//! EXIF capture time for still images

use crate::error::{Error, Result};
use crate::time::local_to_utc;
use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, TimeZone, Utc};
use exif::{Exif, In, Reader, Tag, Value};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::trace;

/// EXIF date tags to try, in priority order, each with its offset tag
const DATE_TAGS: &[(Tag, Tag)] = &[
    (Tag::DateTimeOriginal, Tag::OffsetTimeOriginal),   // When the original image was taken
    (Tag::DateTimeDigitized, Tag::OffsetTimeDigitized), // When the image was digitized
    (Tag::DateTime, Tag::OffsetTime),                   // File modification date/time
];

/// Extract the capture time from embedded EXIF metadata
///
/// EXIF stores wall-clock time. The matching offset tag is used when the
/// camera wrote one, the local time zone otherwise.
pub fn extract_exif_time(path: &Path) -> Result<DateTime<Utc>> {
    extract_exif_time_in(path, &Local)
}

fn extract_exif_time_in<Tz: TimeZone>(path: &Path, tz: &Tz) -> Result<DateTime<Utc>> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);

    let exif = Reader::new()
        .read_from_container(&mut reader)
        .map_err(|e| Error::ExifRead {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    for &(tag, offset_tag) in DATE_TAGS {
        if let Some(datetime) = ascii_field(&exif, tag).and_then(|raw| parse_exif_datetime(&raw)) {
            let offset = ascii_field(&exif, offset_tag).and_then(|raw| parse_exif_offset(&raw));
            trace!(?path, ?tag, ?offset, "Found EXIF date");
            return Ok(to_instant(datetime, offset, tz));
        }
    }

    Err(Error::ExifRead {
        path: path.to_path_buf(),
        message: "No valid date tag found in EXIF data".to_string(),
    })
}

fn ascii_field(exif: &Exif, tag: Tag) -> Option<String> {
    match &exif.get_field(tag, In::PRIMARY)?.value {
        Value::Ascii(parts) => parts.first().map(|raw| String::from_utf8_lossy(raw).into_owned()),
        _ => None,
    }
}

/// Wall-clock EXIF time as an instant
fn to_instant<Tz: TimeZone>(datetime: NaiveDateTime, offset: Option<FixedOffset>, tz: &Tz) -> DateTime<Utc> {
    match offset {
        Some(offset) => local_to_utc(datetime, &offset),
        None => local_to_utc(datetime, tz),
    }
}

/// Parse an EXIF offset string: "+HH:MM" or "-HH:MM"
fn parse_exif_offset(s: &str) -> Option<FixedOffset> {
    let s = s.trim().trim_end_matches('\0');
    let (sign, rest) = match s.as_bytes().first()? {
        b'+' => (1, &s[1..]),
        b'-' => (-1, &s[1..]),
        _ => return None,
    };
    let (hours, minutes) = rest.split_once(':')?;
    let seconds = hours.parse::<i32>().ok()? * 3600 + minutes.parse::<i32>().ok()? * 60;
    FixedOffset::east_opt(sign * seconds)
}

/// Parse EXIF datetime string format: "YYYY:MM:DD HH:MM:SS"
fn parse_exif_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim().trim_matches('"').trim_end_matches('\0');

    // Plain and with subseconds
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y:%m:%d %H:%M:%S%.f") {
        return Some(dt);
    }

    let formats = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y/%m/%d %H:%M:%S"];
    formats
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
}
