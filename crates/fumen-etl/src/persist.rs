//! Batched, transactional persistence of parsed charts.

use serde::Serialize;

use fumen_core::model::Pattern;
use fumen_core::schema::Database;

use crate::parse::ParsedChart;
use crate::registry::SongRegistry;

/// Default number of records per flush.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// What a single flush wrote.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FlushStats {
    pub patterns: usize,
    pub songs_created: usize,
}

/// Owns the store, the song registry, and the pending buffer.
///
/// All mutation goes through `&mut self`, so at most one flush runs at a
/// time and song registration cannot race.
#[derive(Debug)]
pub struct BatchPersister {
    db: Database,
    registry: SongRegistry,
    buffer: Vec<ParsedChart>,
    batch_size: usize,
}

impl BatchPersister {
    /// Load the registry from `db` and start with an empty buffer.
    pub fn new(db: Database, batch_size: usize) -> fumen_core::Result<Self> {
        let registry = SongRegistry::load(&db)?;
        let batch_size = batch_size.max(1);
        Ok(Self {
            db,
            registry,
            buffer: Vec::with_capacity(batch_size),
            batch_size,
        })
    }

    /// Buffer a record, flushing when the buffer reaches the batch size.
    pub fn push(&mut self, chart: ParsedChart) -> fumen_core::Result<Option<FlushStats>> {
        self.buffer.push(chart);
        if self.buffer.len() < self.batch_size {
            return Ok(None);
        }
        self.flush().map(Some)
    }

    /// Write every buffered record in one transaction.
    ///
    /// Songs are inserted before the patterns that reference them. On
    /// failure the transaction rolls back, newly minted songs are dropped
    /// from the registry, and the buffer is left as it was.
    pub fn flush(&mut self) -> fumen_core::Result<FlushStats> {
        if self.buffer.is_empty() {
            return Ok(FlushStats::default());
        }

        if let Err(e) = write_batch(&mut self.db, &mut self.registry, &self.buffer) {
            let discarded = self.registry.rollback();
            log::error!(
                "Flush of {} records failed, rolled back ({} new songs discarded): {}",
                self.buffer.len(),
                discarded,
                e
            );
            return Err(e);
        }

        let stats = FlushStats {
            patterns: self.buffer.len(),
            songs_created: self.registry.commit(),
        };
        self.buffer.clear();
        log::info!(
            "Flushed {} patterns ({} new songs)",
            stats.patterns,
            stats.songs_created
        );
        Ok(stats)
    }

    /// Records waiting for the next flush.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn registry(&self) -> &SongRegistry {
        &self.registry
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn into_database(self) -> Database {
        self.db
    }
}

fn write_batch(
    db: &mut Database,
    registry: &mut SongRegistry,
    charts: &[ParsedChart],
) -> fumen_core::Result<()> {
    let batch = db.begin()?;
    for chart in charts {
        let song_id = registry.resolve(&batch, chart.song_dir())?;
        let pattern = Pattern::new(
            chart.hash.clone(),
            chart.metadata.clone(),
            chart.path.clone(),
            song_id,
        );
        batch.upsert_pattern(&pattern)?;
    }
    batch.commit()
}
