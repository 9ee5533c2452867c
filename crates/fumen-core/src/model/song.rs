use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::model::ids::SongId;

/// A directory grouping one or more chart files.
///
/// Songs are only ever inserted; the indexer never updates or deletes them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Song {
    pub id: SongId,

    /// Directory containing the charts. Unique in practice, not enforced.
    pub path: PathBuf,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Song {
    /// Mint a new song for a directory that has not been seen before.
    #[must_use]
    pub fn new(path: impl AsRef<Path>) -> Self {
        let now = Utc::now();
        Self {
            id: SongId::new(),
            path: path.as_ref().to_path_buf(),
            created_at: now,
            updated_at: now,
        }
    }
}
