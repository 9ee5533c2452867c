//! End-to-end indexing run.
//!
//! The dispatcher produces [`ScanEvent`]s; a single aggregator task consumes
//! them, buffers parsed charts in a [`BatchPersister`], and records failures.
//! The aggregator is the only writer, so flushes never overlap.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use fumen_core::schema::Database;

use crate::config::IndexerOptions;
use crate::encoding::{CharsetDetector, HeuristicDetector};
use crate::error::{ConfigError, IndexError, IndexResult, ScanFailure};
use crate::persist::{BatchPersister, FlushStats};
use crate::scan::{ScanDispatcher, ScanEvent, SourceSet};

/// Summary of one indexing run.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ScanReport {
    /// Accepted files handed to the parse workers.
    pub files_dispatched: usize,
    /// Pattern upserts committed. Charts with identical content count once
    /// per file, though they share a row.
    pub patterns_written: usize,
    pub songs_created: usize,
    pub flushes: usize,
    pub failures: Vec<ScanFailure>,
}

impl ScanReport {
    fn absorb(&mut self, stats: FlushStats) {
        self.patterns_written += stats.patterns;
        self.songs_created += stats.songs_created;
        self.flushes += 1;
    }
}

/// Scans a set of sources into a store.
#[derive(Debug)]
pub struct Indexer {
    sources: SourceSet,
    options: IndexerOptions,
    detector: Arc<dyn CharsetDetector>,
}

impl Indexer {
    pub fn new(sources: SourceSet, options: IndexerOptions) -> Result<Self, ConfigError> {
        options.validate()?;
        Ok(Self {
            sources,
            options,
            detector: Arc::new(HeuristicDetector),
        })
    }

    #[must_use]
    pub fn with_detector(mut self, detector: Arc<dyn CharsetDetector>) -> Self {
        self.detector = detector;
        self
    }

    /// Index every accepted file under the sources into `db`.
    ///
    /// Completes when the walk is exhausted, every dispatched file has been
    /// parsed or recorded as failed, and the trailing partial batch has been
    /// flushed. Cancellation stops dispatch and skips the trailing flush;
    /// batches committed before that point stay committed.
    pub async fn run(&self, db: Database, cancel: CancellationToken) -> IndexResult<ScanReport> {
        log::info!(
            "Indexing {} source directories for [{}] ({} workers, batch size {})",
            self.sources.roots().len(),
            self.sources.extensions().join(", "),
            self.options.workers,
            self.options.batch_size
        );

        let (event_tx, event_rx) = mpsc::channel(self.options.queue_capacity.max(1));

        let aggregator = {
            let batch_size = self.options.batch_size;
            let max_failures = self.options.max_failures;
            let cancel = cancel.clone();
            tokio::task::spawn_blocking(move || -> IndexResult<ScanReport> {
                let persister = BatchPersister::new(db, batch_size)?;
                aggregate(persister, event_rx, max_failures, &cancel)
            })
        };

        let dispatched = ScanDispatcher::new(
            self.sources.clone(),
            self.options.workers,
            self.options.queue_capacity,
        )
        .with_detector(Arc::clone(&self.detector))
        .run(event_tx, cancel.clone())
        .await;

        if dispatched.is_err() {
            // Unblock the aggregator; it reports Cancelled, but the dispatch
            // error is the real cause.
            cancel.cancel();
        }

        let aggregated = aggregator
            .await
            .map_err(|e| IndexError::Worker(format!("aggregator: {e}")))?;

        let report = match (dispatched, aggregated) {
            (Err(e), Err(IndexError::Cancelled)) => return Err(e),
            (_, Err(e)) | (Err(e), Ok(_)) => return Err(e),
            (Ok(files_dispatched), Ok(mut report)) => {
                report.files_dispatched = files_dispatched;
                report
            }
        };

        log::info!(
            "Indexed {} files: {} patterns, {} new songs, {} failures",
            report.files_dispatched,
            report.patterns_written,
            report.songs_created,
            report.failures.len()
        );
        Ok(report)
    }
}

fn aggregate(
    mut persister: BatchPersister,
    mut events: mpsc::Receiver<ScanEvent>,
    max_failures: Option<usize>,
    cancel: &CancellationToken,
) -> IndexResult<ScanReport> {
    let mut report = ScanReport::default();

    while let Some(event) = events.blocking_recv() {
        match event {
            ScanEvent::Parsed(chart) => match persister.push(chart) {
                Ok(Some(stats)) => report.absorb(stats),
                Ok(None) => {}
                Err(e) => {
                    cancel.cancel();
                    return Err(e.into());
                }
            },
            ScanEvent::Failed(failure) => {
                report.failures.push(failure);
                if let Some(limit) = max_failures {
                    let count = report.failures.len();
                    if count > limit {
                        log::error!("{} files failed, limit is {}; aborting", count, limit);
                        cancel.cancel();
                        return Err(IndexError::TooManyFailures { count, limit });
                    }
                }
            }
        }
    }

    if cancel.is_cancelled() {
        log::warn!(
            "Indexing cancelled; {} buffered records were not written",
            persister.pending()
        );
        return Err(IndexError::Cancelled);
    }

    let stats = persister.flush()?;
    if stats.patterns > 0 {
        report.absorb(stats);
    }
    Ok(report)
}
