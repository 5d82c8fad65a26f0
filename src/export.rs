//! Export writer
//!
//! Copies resolved groups into `<root>/<output_folder>/<album>/` under
//! canonical names. Albums are written one after another; the groups of an
//! album are spread over the export worker pool.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info, span, Level};

use crate::album::MediaFile;
use crate::config::{Config, ExportMode};
use crate::error::{Error, Result};
use crate::grouping::{BaseNameGroup, ReconciledEntry};
use crate::log_sink::LogSink;
use crate::naming::{output_sidecar_name, parse_file_name};
use crate::pool::WorkerPool;
use crate::progress::ProgressCounter;

const COPY_BUFFER_SIZE: usize = 256 * 1024;

/// Resolved base-name groups of one logical album
#[derive(Debug, Clone)]
pub struct ResolvedAlbum {
    pub name: String,
    pub groups: Vec<BaseNameGroup>,
}

/// A group as it will be written
#[derive(Debug)]
pub struct ExportGroup<'a> {
    pub base_name: &'a str,
    pub entries: Vec<&'a ReconciledEntry>,
}

/// An album as it will be written
#[derive(Debug)]
pub struct ExportAlbum<'a> {
    pub name: &'a str,
    pub groups: Vec<ExportGroup<'a>>,
}

/// Counts of one export run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportReport {
    pub albums: usize,
    pub files_written: usize,
    pub collisions: usize,
}

/// Fail unless `dir` is missing or empty
pub fn check_output_dir(dir: &Path) -> Result<()> {
    match fs::read_dir(dir) {
        Ok(mut entries) => {
            if entries.next().is_some() {
                return Err(Error::OutputNotEmpty {
                    path: dir.to_path_buf(),
                });
            }
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::storage(dir, e)),
    }
}

/// Check the output folder and create it
pub fn prepare_output_dir(dir: &Path) -> Result<()> {
    check_output_dir(dir)?;
    fs::create_dir_all(dir).map_err(|e| Error::storage(dir, e))
}

/// `base` for the first entry of a group, `base_N` after that
pub fn output_base_name(base: &str, index: usize) -> String {
    if index == 0 {
        base.to_string()
    } else {
        format!("{base}_{index}")
    }
}

/// Output name for `source` under `out_base`, keeping its extension
fn output_file_name(out_base: &str, source: &str) -> String {
    let extension = parse_file_name(source).extension;
    if extension.is_empty() {
        out_base.to_string()
    } else {
        format!("{out_base}.{extension}")
    }
}

/// Apply the export mode filter
///
/// `live` and `live-and-confusing` drop albums left without groups.
pub fn select_for_export(albums: &[ResolvedAlbum], mode: ExportMode) -> Vec<ExportAlbum<'_>> {
    albums
        .iter()
        .map(|album| {
            let groups = album
                .groups
                .iter()
                .filter(|g| mode == ExportMode::All || g.has_live_pair())
                .map(|g| ExportGroup {
                    base_name: &g.base_name,
                    entries: g
                        .entries
                        .iter()
                        .filter(|e| mode != ExportMode::Live || e.is_live())
                        .collect(),
                })
                .collect();
            ExportAlbum {
                name: &album.name,
                groups,
            }
        })
        .filter(|album| mode == ExportMode::All || !album.groups.is_empty())
        .collect()
}

/// Buffered copy into a new file; `false` if the destination already exists
fn copy_file(source: &Path, dest: &Path) -> Result<bool> {
    let src_file = File::open(source).map_err(|e| Error::storage(source, e))?;
    let dest_file = match OpenOptions::new().write(true).create_new(true).open(dest) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
        Err(e) => return Err(Error::storage(dest, e)),
    };

    let mut reader = BufReader::with_capacity(COPY_BUFFER_SIZE, src_file);
    let mut writer = BufWriter::with_capacity(COPY_BUFFER_SIZE, dest_file);

    let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
    loop {
        let bytes_read = reader.read(&mut buffer).map_err(|e| Error::storage(source, e))?;
        if bytes_read == 0 {
            break;
        }
        writer
            .write_all(&buffer[..bytes_read])
            .map_err(|e| Error::storage(dest, e))?;
    }
    writer.flush().map_err(|e| Error::storage(dest, e))?;
    drop(writer);

    // Preserve modification time
    if let Ok(metadata) = fs::metadata(source)
        && let Ok(mtime) = metadata.modified()
    {
        let _ = filetime::set_file_mtime(dest, filetime::FileTime::from_system_time(mtime));
    }

    Ok(true)
}

/// Shared state of the writers of one export run
struct GroupWriter<'a> {
    log: &'a LogSink,
    files_written: AtomicUsize,
    collisions: AtomicUsize,
}

impl GroupWriter<'_> {
    fn copy(&self, source: &MediaFile, album_dir: &Path, album: &str, name: &str) -> Result<()> {
        if copy_file(&source.path(), &album_dir.join(name))? {
            self.files_written.fetch_add(1, Ordering::Relaxed);
        } else {
            self.collisions.fetch_add(1, Ordering::Relaxed);
            self.log.warning(format!(
                "Output file {album}/{name} already exists, skipped {}",
                source.identifier()
            ));
        }
        Ok(())
    }

    fn write_group(&self, group: &ExportGroup<'_>, album_dir: &Path, album: &str) -> Result<()> {
        for (index, entry) in group.entries.iter().enumerate() {
            let out_base = output_base_name(group.base_name, index);
            let out_name = output_file_name(&out_base, &entry.file.name);
            self.copy(&entry.file, album_dir, album, &out_name)?;

            if let Some(sidecar) = &entry.sidecar {
                self.copy(sidecar, album_dir, album, &output_sidecar_name(&out_name))?;
            }
            if let Some(video) = &entry.live_video {
                self.copy(video, album_dir, album, &output_file_name(&out_base, &video.name))?;
            }
        }
        Ok(())
    }
}

/// Write the selected part of `albums` to the output folder
///
/// `on_progress` receives the fraction of groups written across all albums.
/// Files already copied stay in place if a later copy fails.
pub fn write_export(
    albums: &[ResolvedAlbum],
    config: &Config,
    log: &LogSink,
    on_progress: impl Fn(f64) + Sync,
) -> Result<ExportReport> {
    let _span = span!(Level::INFO, "export").entered();
    let output_dir = config.output_dir();
    prepare_output_dir(&output_dir)?;

    let selected = select_for_export(albums, config.export_mode);
    let total_groups: usize = selected.iter().map(|a| a.groups.len()).sum();
    info!(
        mode = ?config.export_mode,
        albums = selected.len(),
        groups = total_groups,
        "Writing export"
    );

    let pool = WorkerPool::new("export", config.export_workers)?;
    let counter = ProgressCounter::new(total_groups);
    let writer = GroupWriter {
        log,
        files_written: AtomicUsize::new(0),
        collisions: AtomicUsize::new(0),
    };

    for album in &selected {
        let album_dir = output_dir.join(album.name);
        fs::create_dir_all(&album_dir).map_err(|e| Error::storage(&album_dir, e))?;
        debug!(album = album.name, groups = album.groups.len(), "Writing album");

        pool.run(album.groups.len(), |index| {
            writer.write_group(&album.groups[index], &album_dir, album.name)?;
            counter.finish_one(|pct| on_progress(f64::from(pct) / 100.0));
            Ok(())
        })?;
    }

    Ok(ExportReport {
        albums: selected.len(),
        files_written: writer.files_written.into_inner(),
        collisions: writer.collisions.into_inner(),
    })
}
