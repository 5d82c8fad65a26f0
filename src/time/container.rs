//! Movie header creation time for ISO base media files (mp4, mov, 3gp)
//!
//! Only the box structure is walked: top level until `moov`, then inside
//! `moov` until `mvhd`. Media data is skipped with seeks, so large files
//! cost a handful of reads.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use tracing::trace;

/// Seconds between 1904-01-01 (container epoch) and 1970-01-01
const MAC_EPOCH_OFFSET: i64 = 2_082_844_800;

/// Extract the `mvhd` creation time of a container file
pub fn extract_container_time(path: &Path) -> Result<DateTime<Utc>> {
    let file = File::open(path)?;
    let len = file.metadata()?.len();
    let mut reader = BufReader::new(file);

    let parse_error = |message: String| Error::ContainerParse {
        path: path.to_path_buf(),
        message,
    };

    let seconds = read_mvhd_creation_time(&mut reader, len)
        .map_err(|e| parse_error(e.to_string()))?
        .ok_or_else(|| parse_error("no moov/mvhd box".to_string()))?;

    if seconds == 0 {
        return Err(parse_error("creation time is not set".to_string()));
    }
    trace!(?path, seconds, "Found mvhd creation time");

    from_mac_seconds(seconds).ok_or_else(|| parse_error(format!("creation time {seconds} out of range")))
}

/// Convert seconds since 1904-01-01 UTC
fn from_mac_seconds(seconds: u64) -> Option<DateTime<Utc>> {
    let unix = i64::try_from(seconds).ok()?.checked_sub(MAC_EPOCH_OFFSET)?;
    DateTime::from_timestamp(unix, 0)
}

/// Raw `mvhd` creation time, `None` when the file has no movie header
fn read_mvhd_creation_time<R: Read + Seek>(reader: &mut R, len: u64) -> io::Result<Option<u64>> {
    reader.seek(SeekFrom::Start(0))?;
    let Some(moov_len) = find_box(reader, len, b"moov")? else {
        return Ok(None);
    };
    let moov_end = reader.stream_position()? + moov_len;
    let Some(mvhd_len) = find_box(reader, moov_end, b"mvhd")? else {
        return Ok(None);
    };

    let mut version_and_flags = [0u8; 4];
    reader.read_exact(&mut version_and_flags)?;
    let creation = match version_and_flags[0] {
        0 if mvhd_len >= 8 => {
            let mut buf = [0u8; 4];
            reader.read_exact(&mut buf)?;
            u64::from(u32::from_be_bytes(buf))
        }
        1 if mvhd_len >= 12 => {
            let mut buf = [0u8; 8];
            reader.read_exact(&mut buf)?;
            u64::from_be_bytes(buf)
        }
        version => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unsupported mvhd version {version} or short box"),
            ));
        }
    };

    Ok(Some(creation))
}

/// Scan sibling boxes from the current position up to `end`
///
/// On a hit the reader is left at the start of the box body and the body
/// length is returned.
fn find_box<R: Read + Seek>(reader: &mut R, end: u64, kind: &[u8; 4]) -> io::Result<Option<u64>> {
    loop {
        let start = reader.stream_position()?;
        if start + 8 > end {
            return Ok(None);
        }

        let mut header = [0u8; 8];
        reader.read_exact(&mut header)?;
        let size = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
        let (header_len, box_len) = match size {
            // 64-bit size follows the type
            1 => {
                let mut large = [0u8; 8];
                reader.read_exact(&mut large)?;
                (16, u64::from_be_bytes(large))
            }
            // Box extends to the end of its parent
            0 => (8, end - start),
            n => (8, u64::from(n)),
        };

        if box_len < header_len || start.saturating_add(box_len) > end {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("box {} at {start} overruns its parent", String::from_utf8_lossy(&header[4..])),
            ));
        }

        if &header[4..] == kind {
            return Ok(Some(box_len - header_len));
        }
        reader.seek(SeekFrom::Start(start + box_len))?;
    }
}
