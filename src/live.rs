//! Live-photo pairing inside base-name groups
//!
//! Short videos are paired with images greedily by smallest capture-time
//! difference. A paired video moves into the image's `live_video` field and
//! is no longer emitted on its own.

use chrono::{DateTime, TimeDelta, Utc};
use std::sync::Mutex;
use tracing::{debug, trace};

use crate::config::{Config, MediaKind};
use crate::error::{Error, Result};
use crate::grouping::{BaseNameGroup, ReconciledEntry};
use crate::log_sink::LogSink;
use crate::pool::WorkerPool;
use crate::progress::ProgressCounter;
use crate::time::CreationDateSource;

/// A possible (video, image) pairing; indices into the group's entries
#[derive(Debug, Clone, Copy)]
struct CandidatePair {
    video: usize,
    image: usize,
    diff: TimeDelta,
}

/// Build every pair where both dates are known, sorted by difference
///
/// The sort is stable, so ties keep video-major input order.
fn candidate_pairs(
    videos: &[(usize, Option<DateTime<Utc>>)],
    images: &[(usize, Option<DateTime<Utc>>)],
) -> Vec<CandidatePair> {
    let mut pairs = Vec::with_capacity(videos.len() * images.len());
    for &(video, video_date) in videos {
        let Some(video_date) = video_date else { continue };
        for &(image, image_date) in images {
            let Some(image_date) = image_date else { continue };
            pairs.push(CandidatePair {
                video,
                image,
                diff: (video_date - image_date).abs(),
            });
        }
    }
    pairs.sort_by_key(|p| p.diff);
    pairs
}

/// Commit pairs in order until the threshold is exceeded
///
/// Returns `(image, video)` links; a pair exactly at the threshold is kept.
fn greedy_match(pairs: &[CandidatePair], threshold: TimeDelta, len: usize) -> Vec<(usize, usize)> {
    let mut claimed = vec![false; len];
    let mut links = Vec::new();

    for pair in pairs {
        if pair.diff > threshold {
            break;
        }
        if !claimed[pair.video] && !claimed[pair.image] {
            claimed[pair.video] = true;
            claimed[pair.image] = true;
            links.push((pair.image, pair.video));
        }
    }
    links
}

/// Resolve live pairs within one base-name group
///
/// Groups without both an image and a short video come back unchanged.
/// Otherwise the output is: unpaired short videos, images, other files,
/// then large videos.
pub fn resolve_group(
    entries: Vec<ReconciledEntry>,
    config: &Config,
    dates: &dyn CreationDateSource,
    log: &LogSink,
) -> Result<Vec<ReconciledEntry>> {
    let kinds: Vec<MediaKind> = entries
        .iter()
        .map(|e| config.media_kind(&e.file.name))
        .collect();
    if !kinds.contains(&MediaKind::Image) || !kinds.contains(&MediaKind::Video) {
        return Ok(entries);
    }

    let (mut short, mut large, mut images, mut others) = (Vec::new(), Vec::new(), Vec::new(), Vec::new());
    for (i, (entry, kind)) in entries.iter().zip(&kinds).enumerate() {
        match kind {
            MediaKind::Image => images.push(i),
            MediaKind::Other => others.push(i),
            MediaKind::Video if entry.file.size()? < config.live_video_max_bytes => short.push(i),
            MediaKind::Video => large.push(i),
        }
    }
    if short.is_empty() {
        return Ok(entries);
    }

    let dated = |indices: &[usize]| -> Vec<(usize, Option<DateTime<Utc>>)> {
        indices
            .iter()
            .map(|&i| (i, dates.creation_date(&entries[i].file, log)))
            .collect()
    };
    let video_dates = dated(&short);
    let image_dates = dated(&images);

    let threshold = TimeDelta::try_seconds(config.live_match_threshold_secs).unwrap_or(TimeDelta::MAX);
    let pairs = candidate_pairs(&video_dates, &image_dates);
    let links = greedy_match(&pairs, threshold, entries.len());

    let mut slots: Vec<Option<ReconciledEntry>> = entries.into_iter().map(Some).collect();
    for &(image, video) in &links {
        let video_entry = slots[video].take();
        if let (Some(image_entry), Some(video_entry)) = (slots[image].as_mut(), video_entry) {
            trace!(image = %image_entry.file.name, video = %video_entry.file.name, "Paired live photo");
            image_entry.live_video = Some(video_entry.file);
        }
    }

    debug!(
        candidates = pairs.len(),
        pairs = links.len(),
        "Resolved base-name group"
    );

    let resolved = short
        .iter()
        .chain(&images)
        .chain(&others)
        .chain(&large)
        .filter_map(|&i| slots[i].take())
        .collect();
    Ok(resolved)
}

/// Resolve every group of one album on the worker pool
///
/// `on_progress` receives the fraction of groups done and never goes
/// backwards. Group order is preserved.
pub fn resolve_groups(
    groups: Vec<BaseNameGroup>,
    config: &Config,
    dates: &dyn CreationDateSource,
    log: &LogSink,
    pool: &WorkerPool,
    on_progress: impl Fn(f64) + Sync,
) -> Result<Vec<BaseNameGroup>> {
    let total = groups.len();
    let counter = ProgressCounter::new(total);
    let slots: Vec<Mutex<Option<BaseNameGroup>>> =
        groups.into_iter().map(|g| Mutex::new(Some(g))).collect();

    pool.run(total, |index| {
        let group = slots[index]
            .lock()
            .map_err(|_| Error::WorkerPool("group slot poisoned".to_string()))?
            .take()
            .ok_or_else(|| Error::WorkerPool(format!("group {index} claimed twice")))?;

        let entries = resolve_group(group.entries, config, dates, log)?;
        counter.finish_one(|pct| on_progress(f64::from(pct) / 100.0));

        Ok(BaseNameGroup {
            base_name: group.base_name,
            entries,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::album::{AlbumFolder, MediaFile};
    use crate::grouping::group_by_base_name;
    use crate::time::local_to_utc;
    use chrono::{FixedOffset, NaiveDateTime};
    use std::collections::{HashMap, HashSet};
    use std::fs::{self, File};
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Dates keyed by file name
    struct FixedDates(HashMap<String, DateTime<Utc>>);

    impl CreationDateSource for FixedDates {
        fn creation_date(&self, file: &MediaFile, _log: &LogSink) -> Option<DateTime<Utc>> {
            self.0.get(&file.name).copied()
        }
    }

    fn wall_clock(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn at(minutes: i64) -> DateTime<Utc> {
        wall_clock("2021-07-04 00:00:00").and_utc() + TimeDelta::minutes(minutes)
    }

    struct Fixture {
        dir: TempDir,
        folder: Arc<AlbumFolder>,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let folder = Arc::new(AlbumFolder::from_path(dir.path(), dir.path()));
            Self { dir, folder }
        }

        fn file(&self, name: &str, size: u64) -> ReconciledEntry {
            let file = File::create(self.dir.path().join(name)).unwrap();
            file.set_len(size).unwrap();
            ReconciledEntry::new(MediaFile::new(&self.folder, name), None)
        }
    }

    fn dates(pairs: &[(&str, i64)]) -> FixedDates {
        FixedDates(pairs.iter().map(|(n, m)| (n.to_string(), at(*m))).collect())
    }

    fn link_of<'a>(entries: &'a [ReconciledEntry], image: &str) -> Option<&'a str> {
        entries
            .iter()
            .find(|e| e.file.name == image)
            .and_then(|e| e.live_video.as_ref())
            .map(|v| v.name.as_str())
    }

    #[test]
    fn test_greedy_smallest_difference_first() {
        let fx = Fixture::new();
        let entries = vec![
            fx.file("A.mp4", 10),
            fx.file("B.mp4", 10),
            fx.file("X.jpg", 10),
            fx.file("Y.jpg", 10),
        ];
        let source = dates(&[("A.mp4", 0), ("B.mp4", 10), ("X.jpg", 5), ("Y.jpg", 9)]);
        let log = LogSink::in_memory();

        let resolved = resolve_group(entries, &Config::default(), &source, &log).unwrap();

        assert_eq!(resolved.len(), 2);
        assert_eq!(link_of(&resolved, "Y.jpg"), Some("B.mp4"));
        assert_eq!(link_of(&resolved, "X.jpg"), Some("A.mp4"));
    }

    #[test]
    fn test_burst_pairs_across_time_zones() {
        let fx = Fixture::new();
        let entries = vec![
            fx.file("IMG.jpg", 10),
            fx.file("IMG(1).jpg", 10),
            fx.file("IMG.mp4", 10),
            fx.file("IMG(1).mp4", 10),
        ];
        // Images carry Berlin wall-clock time, videos store UTC
        let berlin = FixedOffset::east_opt(2 * 3600).unwrap();
        let source = FixedDates(HashMap::from([
            ("IMG.jpg".to_string(), local_to_utc(wall_clock("2021-07-04 10:00:00"), &berlin)),
            ("IMG(1).jpg".to_string(), local_to_utc(wall_clock("2021-07-04 10:05:00"), &berlin)),
            ("IMG.mp4".to_string(), wall_clock("2021-07-04 08:00:00").and_utc()),
            ("IMG(1).mp4".to_string(), wall_clock("2021-07-04 08:05:00").and_utc()),
        ]));

        let resolved =
            resolve_group(entries, &Config::default(), &source, &LogSink::in_memory()).unwrap();

        assert_eq!(link_of(&resolved, "IMG.jpg"), Some("IMG.mp4"));
        assert_eq!(link_of(&resolved, "IMG(1).jpg"), Some("IMG(1).mp4"));
    }

    #[test]
    fn test_threshold_boundary_is_inclusive() {
        let fx = Fixture::new();
        let entries = vec![
            fx.file("A.mov", 10),
            fx.file("B.mov", 10),
            fx.file("X.heic", 10),
            fx.file("Y.heic", 10),
        ];
        // A-X exactly 24h apart, B-Y one minute more; B-X and A-Y further
        let source = dates(&[
            ("A.mov", 0),
            ("X.heic", 24 * 60),
            ("B.mov", 10_000),
            ("Y.heic", 10_000 + 24 * 60 + 1),
        ]);

        let resolved =
            resolve_group(entries, &Config::default(), &source, &LogSink::in_memory()).unwrap();

        assert_eq!(link_of(&resolved, "X.heic"), Some("A.mov"));
        assert_eq!(link_of(&resolved, "Y.heic"), None);
        // B stays standalone and comes first
        assert_eq!(resolved[0].file.name, "B.mov");
        assert_eq!(resolved.len(), 3);
    }

    #[test]
    fn test_size_boundary() {
        let fx = Fixture::new();
        let limit = Config::default().live_video_max_bytes;
        let entries = vec![
            fx.file("IMG.jpg", 10),
            fx.file("IMG.mp4", limit),
            fx.file("IMG(1).mp4", limit - 1),
        ];
        let source = dates(&[("IMG.jpg", 0), ("IMG.mp4", 0), ("IMG(1).mp4", 30)]);

        let resolved =
            resolve_group(entries, &Config::default(), &source, &LogSink::in_memory()).unwrap();

        assert_eq!(link_of(&resolved, "IMG.jpg"), Some("IMG(1).mp4"));
        let names: Vec<&str> = resolved.iter().map(|e| e.file.name.as_str()).collect();
        assert_eq!(names, vec!["IMG.jpg", "IMG.mp4"]);
    }

    #[test]
    fn test_only_large_videos_leaves_group_unchanged() {
        let fx = Fixture::new();
        let limit = Config::default().live_video_max_bytes;
        let entries = vec![fx.file("IMG.mp4", limit), fx.file("IMG.jpg", 10)];
        let source = dates(&[("IMG.jpg", 0), ("IMG.mp4", 0)]);

        let resolved =
            resolve_group(entries.clone(), &Config::default(), &source, &LogSink::in_memory())
                .unwrap();
        assert_eq!(resolved, entries);
    }

    #[test]
    fn test_unknown_dates_never_pair() {
        let fx = Fixture::new();
        let entries = vec![fx.file("IMG.mp4", 10), fx.file("IMG.jpg", 10), fx.file("IMG.txt", 10)];
        let source = dates(&[("IMG.jpg", 0)]);

        let resolved =
            resolve_group(entries, &Config::default(), &source, &LogSink::in_memory()).unwrap();
        let names: Vec<&str> = resolved.iter().map(|e| e.file.name.as_str()).collect();
        assert_eq!(names, vec!["IMG.mp4", "IMG.jpg", "IMG.txt"]);
        assert!(resolved.iter().all(|e| e.live_video.is_none()));
    }

    #[test]
    fn test_resolve_groups_keeps_every_file_once() {
        let fx = Fixture::new();
        let mut entries = Vec::new();
        let mut known = Vec::new();
        for g in 0..40 {
            for (suffix, minute) in [(".jpg", 0), (".mp4", 1), ("(1).jpg", 2), (".png", 500)] {
                let name = format!("IMG_{g:03}{suffix}");
                entries.push(fx.file(&name, 10));
                known.push((name, g * 10_000 + minute));
            }
        }
        fs::write(fx.dir.path().join("IMG_000.txt"), b"note").unwrap();
        entries.push(ReconciledEntry::new(MediaFile::new(&fx.folder, "IMG_000.txt"), None));

        let input_names: HashSet<String> = entries.iter().map(|e| e.file.name.clone()).collect();
        let source = FixedDates(known.into_iter().map(|(n, m)| (n, at(m))).collect());
        let pool = WorkerPool::new("resolve-test", 8).unwrap();
        let log = LogSink::in_memory();

        let groups = group_by_base_name(entries);
        let resolved = resolve_groups(groups, &Config::default(), &source, &log, &pool, |_| {}).unwrap();
        assert_eq!(resolved.len(), 40);
        assert_eq!(resolved[0].base_name, "IMG_000");

        let mut seen = HashSet::new();
        for entry in resolved.iter().flat_map(|g| &g.entries) {
            assert!(seen.insert(entry.file.name.clone()));
            if let Some(video) = &entry.live_video {
                assert!(seen.insert(video.name.clone()));
            }
        }
        assert_eq!(seen, input_names);

        let pairs = resolved.iter().flat_map(|g| &g.entries).filter(|e| e.is_live()).count();
        assert_eq!(pairs, 40);
    }
}
