//! Reconciled entries and base-name grouping

use std::collections::HashMap;

use crate::album::MediaFile;
use crate::naming::parse_file_name;

/// A media file with its sidecar and, for live photos, its companion video
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciledEntry {
    pub file: MediaFile,
    pub sidecar: Option<MediaFile>,
    pub live_video: Option<MediaFile>,
}

impl ReconciledEntry {
    pub fn new(file: MediaFile, sidecar: Option<MediaFile>) -> Self {
        Self {
            file,
            sidecar,
            live_video: None,
        }
    }

    pub fn is_live(&self) -> bool {
        self.live_video.is_some()
    }
}

/// Entries of one logical album sharing a base name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseNameGroup {
    pub base_name: String,
    pub entries: Vec<ReconciledEntry>,
}

impl BaseNameGroup {
    pub fn has_live_pair(&self) -> bool {
        self.entries.iter().any(ReconciledEntry::is_live)
    }
}

/// Group entries by base name (extension and `(N)` marker stripped)
///
/// Groups appear in order of their first entry; entries keep their order.
pub fn group_by_base_name(entries: Vec<ReconciledEntry>) -> Vec<BaseNameGroup> {
    let mut groups: Vec<BaseNameGroup> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for entry in entries {
        let base_name = parse_file_name(&entry.file.name).base;
        match index.get(&base_name) {
            Some(&i) => groups[i].entries.push(entry),
            None => {
                index.insert(base_name.clone(), groups.len());
                groups.push(BaseNameGroup {
                    base_name,
                    entries: vec![entry],
                });
            }
        }
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::album::AlbumFolder;
    use std::path::PathBuf;
    use std::sync::Arc;

    fn entry(folder: &Arc<AlbumFolder>, name: &str) -> ReconciledEntry {
        ReconciledEntry::new(MediaFile::new(folder, name), None)
    }

    #[test]
    fn test_group_by_base_name() {
        let folder = Arc::new(AlbumFolder {
            path: PathBuf::from("/t/Trip"),
            name: "Trip".into(),
            parents: vec!["t".into()],
        });
        let entries = vec![
            entry(&folder, "IMG_0001.HEIC"),
            entry(&folder, "IMG_0002.jpg"),
            entry(&folder, "IMG_0001(1).HEIC"),
            entry(&folder, "IMG_0001.MP4"),
            entry(&folder, "notes"),
        ];

        let groups = group_by_base_name(entries);
        assert_eq!(groups.len(), 3);

        assert_eq!(groups[0].base_name, "IMG_0001");
        let names: Vec<&str> = groups[0].entries.iter().map(|e| e.file.name.as_str()).collect();
        assert_eq!(names, vec!["IMG_0001.HEIC", "IMG_0001(1).HEIC", "IMG_0001.MP4"]);

        assert_eq!(groups[1].base_name, "IMG_0002");
        assert_eq!(groups[2].base_name, "notes");
        assert!(!groups[0].has_live_pair());
    }
}
