//! Directory-to-song resolution.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use fumen_core::model::{Song, SongId};
use fumen_core::schema::{Batch, Database};

/// Maps chart directories to their durable song id.
///
/// Pre-loaded from the store once, then grown during flushes. Songs minted
/// inside a batch are pending until [`SongRegistry::commit`] is called after
/// the batch commits, so the registry never exposes an id whose row could
/// still be rolled back.
#[derive(Debug, Default)]
pub struct SongRegistry {
    known: HashMap<PathBuf, SongId>,
    pending: HashMap<PathBuf, SongId>,
}

impl SongRegistry {
    pub fn load(db: &Database) -> fumen_core::Result<Self> {
        let known = db.song_index()?;
        log::debug!("Loaded {} known songs", known.len());
        Ok(Self {
            known,
            pending: HashMap::new(),
        })
    }

    pub fn get(&self, dir: &Path) -> Option<SongId> {
        self.known
            .get(dir)
            .or_else(|| self.pending.get(dir))
            .copied()
    }

    /// Return the song id for `dir`, inserting a new song row into `batch`
    /// on first sight.
    pub fn resolve(&mut self, batch: &Batch<'_>, dir: &Path) -> fumen_core::Result<SongId> {
        if let Some(id) = self.get(dir) {
            return Ok(id);
        }

        let song = Song::new(dir);
        batch.insert_song(&song)?;
        log::debug!("Registered song {} for {}", song.id, dir.display());
        self.pending.insert(song.path, song.id);
        Ok(song.id)
    }

    /// Make songs minted since the last commit or rollback visible. Returns
    /// how many there were.
    pub fn commit(&mut self) -> usize {
        let created = self.pending.len();
        self.known.extend(self.pending.drain());
        created
    }

    /// Forget songs minted since the last commit or rollback.
    pub fn rollback(&mut self) -> usize {
        let discarded = self.pending.len();
        self.pending.clear();
        discarded
    }

    /// Number of committed songs.
    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }
}
