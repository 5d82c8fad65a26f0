//! Sidecar matching within a logical album
//!
//! A media file's sidecar can sit in any physical folder of its album, since
//! bundles split albums at arbitrary points. The file's own folder is
//! searched first, then the other folders in discovery order.

use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::album::{AlbumFolder, LogicalAlbum, MediaFile};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::grouping::ReconciledEntry;
use crate::log_sink::LogSink;
use crate::naming::{is_metadata_file, sidecar_candidates};

/// Outcome of matching one logical album
#[derive(Debug)]
pub struct SidecarMatch {
    pub entries: Vec<ReconciledEntry>,
    /// Metadata files no media file claimed
    pub unused_metadata: Vec<MediaFile>,
}

/// Plain files of a folder, sorted by name
fn list_files(folder: &AlbumFolder, config: &Config, log: &LogSink) -> Result<Vec<String>> {
    let mut names = Vec::new();

    for entry in fs::read_dir(&folder.path).map_err(|e| Error::storage(&folder.path, e))? {
        let entry = entry.map_err(|e| Error::storage(&folder.path, e))?;
        let file_type = entry.file_type().map_err(|e| Error::storage(entry.path(), e))?;
        if file_type.is_dir() || config.is_ignored(&entry.file_name()) {
            continue;
        }
        match entry.file_name().into_string() {
            Ok(name) => names.push(name),
            Err(raw) => log.warning(format!(
                "Skipping file with a non UTF-8 name: {}/{}",
                folder.identifier(),
                raw.to_string_lossy()
            )),
        }
    }

    names.sort();
    Ok(names)
}

/// Check whether `dir` holds a file called `name`; not found is a miss
fn lookup_file(dir: &Path, name: &str) -> Result<bool> {
    let path = dir.join(name);
    match fs::metadata(&path) {
        Ok(metadata) => Ok(!metadata.is_dir()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(Error::storage(path, e)),
    }
}

/// Find the sidecar of `file_name`, searching `own` first
fn find_sidecar(
    file_name: &str,
    own: &Arc<AlbumFolder>,
    album: &LogicalAlbum,
) -> Result<Option<MediaFile>> {
    let candidates = sidecar_candidates(file_name);
    let search_order = std::iter::once(own)
        .chain(album.folders.iter().filter(|f| !Arc::ptr_eq(*f, own)));

    for folder in search_order {
        for candidate in &candidates {
            if lookup_file(&folder.path, candidate)? {
                trace!(file_name, sidecar = %candidate, folder = %folder.identifier(), "Matched sidecar");
                return Ok(Some(MediaFile::new(folder, candidate.as_str())));
            }
        }
    }

    Ok(None)
}

/// Pair every media file of `album` with its sidecar
///
/// `on_progress` receives the fraction of folders done. Metadata files left
/// over afterwards are reported to `log`; album-level metadata files are
/// exempt.
pub fn match_sidecars(
    album: &LogicalAlbum,
    config: &Config,
    log: &LogSink,
    on_progress: impl Fn(f64),
) -> Result<SidecarMatch> {
    let mut entries = Vec::new();
    let mut metadata_files = Vec::new();
    let folder_count = album.folders.len();

    for (i, folder) in album.folders.iter().enumerate() {
        on_progress(i as f64 / folder_count as f64);

        for name in list_files(folder, config, log)? {
            if is_metadata_file(&name) {
                metadata_files.push(MediaFile::new(folder, name));
                continue;
            }
            let sidecar = find_sidecar(&name, folder, album)?;
            if sidecar.is_none() {
                debug!(file = %name, folder = %folder.identifier(), "No sidecar found");
            }
            entries.push(ReconciledEntry::new(MediaFile::new(folder, name), sidecar));
        }
    }

    let used: HashSet<String> = entries
        .iter()
        .filter_map(|e| e.sidecar.as_ref().map(MediaFile::identifier))
        .collect();

    let mut unused_metadata = Vec::new();
    for metadata in metadata_files {
        if config.is_album_metadata(&metadata.name) || used.contains(&metadata.identifier()) {
            continue;
        }
        log.warning(format!("Unused metadata file: {}", metadata.identifier()));
        unused_metadata.push(metadata);
    }

    on_progress(1.0);
    Ok(SidecarMatch {
        entries,
        unused_metadata,
    })
}
