//! Album discovery across takeout bundles
//!
//! The selected root holds one folder per extracted takeout bundle. Inside a
//! bundle every folder that directly contains a file is an album folder;
//! its subfolders are searched as well. Album folders with the same name in
//! different bundles form one logical album.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::config::Config;
use crate::error::{Error, Result};

/// One physical album directory
#[derive(Debug, PartialEq, Eq)]
pub struct AlbumFolder {
    /// Absolute or root-relative location on disk
    pub path: PathBuf,
    /// Folder name, the logical album key
    pub name: String,
    /// Names of the ancestor folders below the root, bundle first
    pub parents: Vec<String>,
}

impl AlbumFolder {
    /// Build from a directory below `root`
    pub fn from_path(root: &Path, dir: &Path) -> Self {
        let relative = dir.strip_prefix(root).unwrap_or(dir);
        let mut components: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        let name = components.pop().unwrap_or_default();

        Self {
            path: dir.to_path_buf(),
            name,
            parents: components,
        }
    }

    /// Stable human-readable identifier used in log messages
    pub fn identifier(&self) -> String {
        format!("{}/{}", self.parents.join("/"), self.name)
    }
}

/// A file inside an album folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFile {
    pub folder: Arc<AlbumFolder>,
    pub name: String,
}

impl MediaFile {
    pub fn new(folder: &Arc<AlbumFolder>, name: impl Into<String>) -> Self {
        Self {
            folder: Arc::clone(folder),
            name: name.into(),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.folder.path.join(&self.name)
    }

    /// `ancestors/folder/file`, unique across the whole takeout
    pub fn identifier(&self) -> String {
        format!("{}/{}", self.folder.identifier(), self.name)
    }

    /// File size in bytes
    pub fn size(&self) -> Result<u64> {
        let path = self.path();
        fs::metadata(&path)
            .map(|m| m.len())
            .map_err(|e| Error::storage(path, e))
    }
}

/// A top-level takeout bundle and the album folders found inside it
#[derive(Debug)]
pub struct TakeoutBundle {
    pub name: String,
    pub path: PathBuf,
    pub albums: Vec<Arc<AlbumFolder>>,
}

/// Album folders of all bundles that share one name
#[derive(Debug, Clone)]
pub struct LogicalAlbum {
    pub name: String,
    pub folders: Vec<Arc<AlbumFolder>>,
}

/// Result of scanning the root folder
#[derive(Debug)]
pub struct Discovery {
    pub bundles: Vec<TakeoutBundle>,
    pub albums: Vec<LogicalAlbum>,
}

impl Discovery {
    /// Album names, sorted for display
    pub fn sorted_album_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.albums.iter().map(|a| a.name.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn folder_count(&self) -> usize {
        self.bundles.iter().map(|b| b.albums.len()).sum()
    }
}

/// List the bundle folders directly inside `root`, sorted by name
///
/// The export folder is never a bundle.
pub fn list_takeout_bundles(root: &Path, config: &Config) -> Result<Vec<PathBuf>> {
    let mut bundles = Vec::new();

    for entry in fs::read_dir(root).map_err(|e| Error::storage(root, e))? {
        let entry = entry.map_err(|e| Error::storage(root, e))?;
        let name = entry.file_name();
        if config.is_ignored(&name) || name == config.output_folder.as_str() {
            continue;
        }
        let file_type = entry.file_type().map_err(|e| Error::storage(entry.path(), e))?;
        if file_type.is_dir() {
            bundles.push(entry.path());
        }
    }

    bundles.sort();
    Ok(bundles)
}

/// Find every album folder inside one bundle
pub fn find_album_folders(root: &Path, bundle: &Path, config: &Config) -> Result<Vec<AlbumFolder>> {
    let mut albums = Vec::new();
    let mut seen: HashSet<PathBuf> = HashSet::new();

    let walker = WalkDir::new(bundle)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !config.is_ignored(e.file_name()));

    for entry in walker {
        let entry = entry?;
        if entry.file_type().is_dir() {
            continue;
        }

        // The first file decides; subfolders are still walked on their own
        if let Some(dir) = entry.path().parent()
            && seen.insert(dir.to_path_buf())
        {
            let album = AlbumFolder::from_path(root, dir);
            debug!(album = %album.identifier(), "Found album folder");
            albums.push(album);
        }
    }

    Ok(albums)
}

/// Merge album folders with equal names into logical albums, first seen first
pub fn group_by_album_name(bundles: &[TakeoutBundle]) -> Vec<LogicalAlbum> {
    let mut albums: Vec<LogicalAlbum> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for folder in bundles.iter().flat_map(|b| b.albums.iter()) {
        match index.get(&folder.name) {
            Some(&i) => albums[i].folders.push(Arc::clone(folder)),
            None => {
                index.insert(folder.name.clone(), albums.len());
                albums.push(LogicalAlbum {
                    name: folder.name.clone(),
                    folders: vec![Arc::clone(folder)],
                });
            }
        }
    }

    albums
}

/// Scan `config.root_dir` for bundles and logical albums
pub fn discover(config: &Config) -> Result<Discovery> {
    let root = config.root_dir.as_path();
    let mut bundles = Vec::new();

    for bundle_path in list_takeout_bundles(root, config)? {
        let albums = find_album_folders(root, &bundle_path, config)?;
        let name = bundle_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        info!(bundle = %name, albums = albums.len(), "Scanned takeout bundle");

        bundles.push(TakeoutBundle {
            name,
            path: bundle_path,
            albums: albums.into_iter().map(Arc::new).collect(),
        });
    }

    let albums = group_by_album_name(&bundles);
    info!(
        bundles = bundles.len(),
        albums = albums.len(),
        "Album discovery complete"
    );

    Ok(Discovery { bundles, albums })
}
