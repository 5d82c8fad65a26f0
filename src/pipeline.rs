//! Reconciliation pipeline: discovery, sidecar matching, grouping,
//! live-pair resolution and export

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{Level, debug, info, span};

use crate::album::{self, Discovery};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::export::{self, ExportReport, ResolvedAlbum};
use crate::grouping::group_by_base_name;
use crate::live::resolve_groups;
use crate::log_sink::LogSink;
use crate::pool::WorkerPool;
use crate::progress::{ProgressReporter, SilentProgress, percent};
use crate::sidecar::match_sidecars;
use crate::time::{CreationDateSource, DateExtractor};

/// Share of the per-album progress spent on sidecar matching
const MATCHING_SHARE: f64 = 0.3;

/// Run statistics
#[derive(Debug, Default)]
pub struct ReconcileStats {
    pub albums: AtomicUsize,
    pub media_files: AtomicUsize,
    pub sidecars_matched: AtomicUsize,
    pub unused_metadata: AtomicUsize,
    pub live_pairs: AtomicUsize,
    pub files_written: AtomicUsize,
    pub collisions: AtomicUsize,
}

impl ReconcileStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn load(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::Relaxed)
    }

    pub fn summary(&self) -> String {
        format!(
            "Albums: {}, Files: {}, Sidecars: {}, Unused metadata: {}, Live pairs: {}, Written: {}, Collisions: {}",
            Self::load(&self.albums),
            Self::load(&self.media_files),
            Self::load(&self.sidecars_matched),
            Self::load(&self.unused_metadata),
            Self::load(&self.live_pairs),
            Self::load(&self.files_written),
            Self::load(&self.collisions)
        )
    }
}

/// Drives one reconciliation run over `config.root_dir`
pub struct Reconciler {
    config: Config,
    log: Arc<LogSink>,
    progress: Arc<dyn ProgressReporter>,
    dates: Arc<dyn CreationDateSource>,
    stats: ReconcileStats,
}

impl Reconciler {
    /// Create a reconciler with the default date extractor
    pub fn new(config: Config, log: Arc<LogSink>) -> Result<Self> {
        config
            .validate()
            .map_err(|e| Error::Config(e.to_string()))?;
        let dates = Arc::new(DateExtractor::new(&config));

        Ok(Self {
            config,
            log,
            progress: Arc::new(SilentProgress),
            dates,
            stats: ReconcileStats::new(),
        })
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// Replace the creation-date source
    pub fn with_date_source(mut self, dates: Arc<dyn CreationDateSource>) -> Self {
        self.dates = dates;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn log(&self) -> &LogSink {
        &self.log
    }

    pub fn stats(&self) -> &ReconcileStats {
        &self.stats
    }

    /// Find bundles and logical albums
    pub fn discover(&self) -> Result<Discovery> {
        self.progress.overall(0, "Searching albums");
        let discovery = album::discover(&self.config)?;
        self.stats
            .albums
            .store(discovery.albums.len(), Ordering::Relaxed);
        Ok(discovery)
    }

    /// Match sidecars and resolve live pairs for every logical album
    ///
    /// Fails before any work if the output folder already has content.
    pub fn reconcile(&self, discovery: &Discovery) -> Result<Vec<ResolvedAlbum>> {
        let _span = span!(Level::INFO, "reconcile").entered();
        export::check_output_dir(&self.config.output_dir())?;

        let pool = WorkerPool::new("resolve", self.config.resolve_workers)?;
        let album_count = discovery.albums.len();
        let mut resolved = Vec::with_capacity(album_count);

        for (index, logical) in discovery.albums.iter().enumerate() {
            let message = format!("Processing album {}", logical.name);
            self.progress.overall(percent(index, album_count), &message);

            let matched = match_sidecars(logical, &self.config, &self.log, |fraction| {
                self.progress
                    .album((fraction * MATCHING_SHARE * 100.0) as u8, "Matching metadata files");
            })?;

            let media_files = matched.entries.len();
            let sidecars = matched.entries.iter().filter(|e| e.sidecar.is_some()).count();
            self.stats.media_files.fetch_add(media_files, Ordering::Relaxed);
            self.stats.sidecars_matched.fetch_add(sidecars, Ordering::Relaxed);
            self.stats
                .unused_metadata
                .fetch_add(matched.unused_metadata.len(), Ordering::Relaxed);

            let groups = group_by_base_name(matched.entries);
            debug!(album = %logical.name, media_files, groups = groups.len(), "Grouped by base name");

            let groups = resolve_groups(
                groups,
                &self.config,
                self.dates.as_ref(),
                &self.log,
                &pool,
                |fraction| {
                    let pct = (MATCHING_SHARE + fraction * (1.0 - MATCHING_SHARE)) * 100.0;
                    self.progress.album(pct as u8, "Resolving live photos");
                },
            )?;

            let pairs = groups
                .iter()
                .flat_map(|g| &g.entries)
                .filter(|e| e.is_live())
                .count();
            self.stats.live_pairs.fetch_add(pairs, Ordering::Relaxed);
            info!(album = %logical.name, media_files, sidecars, live_pairs = pairs, "Album reconciled");

            resolved.push(ResolvedAlbum {
                name: logical.name.clone(),
                groups,
            });
        }

        self.progress.overall(100, "Albums reconciled");
        Ok(resolved)
    }

    /// Write the resolved albums to the output folder
    pub fn export(&self, albums: &[ResolvedAlbum]) -> Result<ExportReport> {
        let report = export::write_export(albums, &self.config, &self.log, |fraction| {
            self.progress.overall((fraction * 100.0) as u8, "Writing files");
        })?;

        self.stats
            .files_written
            .fetch_add(report.files_written, Ordering::Relaxed);
        self.stats
            .collisions
            .fetch_add(report.collisions, Ordering::Relaxed);
        Ok(report)
    }

    /// Run every stage
    ///
    /// A fatal failure is appended to the log sink before it is returned.
    pub fn run(&self) -> Result<ExportReport> {
        let _span = span!(Level::INFO, "reconciler_run").entered();

        let outcome = self
            .discover()
            .and_then(|discovery| self.reconcile(&discovery))
            .and_then(|albums| self.export(&albums));

        if let Err(e) = &outcome {
            self.log.error(e.to_string());
        }
        if let Err(e) = self.log.flush() {
            tracing::error!(error = %e, "Failed to flush log file");
        }

        if outcome.is_ok() {
            info!(stats = %self.stats.summary(), "Reconciliation complete");
        }
        outcome
    }
}
