//! Source discovery and bounded-concurrency dispatch of parse tasks.
//!
//! One blocking walker feeds chart paths into a bounded queue. A fixed pool
//! of workers pulls from the queue, parses each file on the blocking pool,
//! and reports a [`ScanEvent`] per file. Walk and parse failures are
//! reported as events too; they never stop the scan on their own.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use crate::encoding::{CharsetDetector, HeuristicDetector};
use crate::error::{ConfigError, IndexError, IndexResult, ScanFailure};
use crate::parse::{parse_chart_with, ParsedChart};

/// Validated source roots and accepted file extensions.
#[derive(Debug, Clone)]
pub struct SourceSet {
    roots: Vec<PathBuf>,
    extensions: Vec<String>,
}

impl SourceSet {
    /// Every root must be an absolute path to an existing directory, and
    /// every extension must be in dotted form (`".bms"`).
    pub fn new(roots: Vec<PathBuf>, extensions: Vec<String>) -> Result<Self, ConfigError> {
        if extensions.is_empty() {
            return Err(ConfigError::NoExtensions);
        }
        if let Some(bad) = extensions
            .iter()
            .find(|ext| !ext.starts_with('.') || ext.len() < 2)
        {
            return Err(ConfigError::InvalidExtension(bad.clone()));
        }

        if roots.is_empty() {
            return Err(ConfigError::NoSourceDirectories);
        }
        for root in &roots {
            check_root(root)?;
        }

        Ok(Self { roots, extensions })
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// Whether a file name ends in an accepted extension. The extension is
    /// everything from the last dot of the name, so a file named `.bms` is
    /// accepted. Matching is exact and case-sensitive.
    pub fn accepts(&self, path: &Path) -> bool {
        let Some(name) = path.file_name() else {
            return false;
        };
        let name = name.to_string_lossy();
        let Some(dot) = name.rfind('.') else {
            return false;
        };
        let ext = &name[dot..];
        self.extensions.iter().any(|accepted| accepted == ext)
    }
}

fn check_root(root: &Path) -> Result<(), ConfigError> {
    if !root.is_absolute() {
        return Err(ConfigError::RelativeSourceDirectory(root.to_path_buf()));
    }
    match std::fs::metadata(root) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(ConfigError::NotADirectory(root.to_path_buf())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(ConfigError::MissingSourceDirectory(root.to_path_buf()))
        }
        Err(source) => Err(ConfigError::Inaccessible {
            path: root.to_path_buf(),
            source,
        }),
    }
}

/// What a worker (or the walker) reports for one unit of work.
#[derive(Debug)]
pub enum ScanEvent {
    Parsed(ParsedChart),
    Failed(ScanFailure),
}

/// Walks the sources and parses every accepted file with at most
/// `workers` parses in flight.
#[derive(Debug)]
pub struct ScanDispatcher {
    sources: SourceSet,
    workers: usize,
    queue_capacity: usize,
    detector: Arc<dyn CharsetDetector>,
}

impl ScanDispatcher {
    pub fn new(sources: SourceSet, workers: usize, queue_capacity: usize) -> Self {
        Self {
            sources,
            workers: workers.max(1),
            queue_capacity: queue_capacity.max(1),
            detector: Arc::new(HeuristicDetector),
        }
    }

    #[must_use]
    pub fn with_detector(mut self, detector: Arc<dyn CharsetDetector>) -> Self {
        self.detector = detector;
        self
    }

    /// Run the walk and the worker pool to completion, sending one event per
    /// accepted file (plus one per walk error) to `events`.
    ///
    /// Stops early when `cancel` fires or `events` is closed. Returns the
    /// number of files handed to the workers.
    pub async fn run(
        self,
        events: mpsc::Sender<ScanEvent>,
        cancel: CancellationToken,
    ) -> IndexResult<usize> {
        let (path_tx, path_rx) = mpsc::channel::<PathBuf>(self.queue_capacity);
        let path_rx = Arc::new(Mutex::new(path_rx));

        let mut workers = JoinSet::new();
        for _ in 0..self.workers {
            workers.spawn(parse_worker(
                Arc::clone(&path_rx),
                events.clone(),
                Arc::clone(&self.detector),
                cancel.clone(),
            ));
        }
        // Only workers hold the receiver now, so the walker unblocks once
        // they have all exited.
        drop(path_rx);

        let walker = {
            let sources = self.sources;
            let events = events.clone();
            let cancel = cancel.clone();
            tokio::task::spawn_blocking(move || walk_sources(&sources, &path_tx, &events, &cancel))
        };
        drop(events);

        let dispatched = walker
            .await
            .map_err(|e| IndexError::Worker(format!("walker: {e}")))?;

        while let Some(joined) = workers.join_next().await {
            joined.map_err(|e| IndexError::Worker(format!("parse worker: {e}")))??;
        }

        Ok(dispatched)
    }
}

fn walk_sources(
    sources: &SourceSet,
    paths: &mpsc::Sender<PathBuf>,
    events: &mpsc::Sender<ScanEvent>,
    cancel: &CancellationToken,
) -> usize {
    let mut dispatched = 0;

    for root in sources.roots() {
        log::debug!("Walking {}", root.display());

        for entry in WalkDir::new(root).follow_links(false) {
            if cancel.is_cancelled() {
                return dispatched;
            }

            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    log::warn!("Skipping unreadable path: {}", err);
                    if events
                        .blocking_send(ScanEvent::Failed(ScanFailure::walk(&err)))
                        .is_err()
                    {
                        return dispatched;
                    }
                    continue;
                }
            };

            if entry.file_type().is_dir() || !sources.accepts(entry.path()) {
                continue;
            }

            log::debug!("Dispatching: {}", entry.path().display());
            if paths.blocking_send(entry.into_path()).is_err() {
                // Workers are gone.
                return dispatched;
            }
            dispatched += 1;
        }
    }

    dispatched
}

async fn parse_worker(
    paths: Arc<Mutex<mpsc::Receiver<PathBuf>>>,
    events: mpsc::Sender<ScanEvent>,
    detector: Arc<dyn CharsetDetector>,
    cancel: CancellationToken,
) -> IndexResult<()> {
    loop {
        // Hold the receiver only long enough to take one path.
        let next = {
            let mut rx = paths.lock().await;
            tokio::select! {
                () = cancel.cancelled() => None,
                path = rx.recv() => path,
            }
        };
        let Some(path) = next else {
            break;
        };

        let detector = Arc::clone(&detector);
        let parsed =
            tokio::task::spawn_blocking(move || parse_chart_with(detector.as_ref(), &path))
                .await
                .map_err(|e| IndexError::Worker(format!("parse task: {e}")))?;

        let event = match parsed {
            Ok(chart) => ScanEvent::Parsed(chart),
            Err(err) => {
                log::warn!("{}", err);
                ScanEvent::Failed(ScanFailure::parse(&err))
            }
        };

        if events.send(event).await.is_err() {
            break;
        }
    }

    Ok(())
}
