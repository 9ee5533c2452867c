use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::model::ids::SongId;

/// Header metadata extracted from a chart file.
///
/// Each field holds the first matching header value, or an empty string
/// when the header is absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartMetadata {
    pub title: String,
    pub subtitle: String,
    pub artist: String,
    pub subartist: String,
}

impl ChartMetadata {
    /// Whether all four headers have a value.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.title.is_empty()
            && !self.subtitle.is_empty()
            && !self.artist.is_empty()
            && !self.subartist.is_empty()
    }
}

/// One indexed chart file, keyed by the hash of its normalized content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    /// Lowercase hex SHA-256 of the UTF-8 normalized file bytes.
    pub hash: String,

    pub metadata: ChartMetadata,

    /// Last path the content was seen at.
    pub path: PathBuf,

    pub song_id: SongId,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Pattern {
    #[must_use]
    pub fn new(hash: String, metadata: ChartMetadata, path: PathBuf, song_id: SongId) -> Self {
        let now = Utc::now();
        Self {
            hash,
            metadata,
            path,
            song_id,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_default_is_incomplete() {
        assert!(!ChartMetadata::default().is_complete());
    }

    #[test]
    fn test_metadata_complete_requires_all_fields() {
        let mut meta = ChartMetadata {
            title: "Title".to_string(),
            subtitle: "[ANOTHER]".to_string(),
            artist: "Artist".to_string(),
            subartist: String::new(),
        };
        assert!(!meta.is_complete());

        meta.subartist = "obj: someone".to_string();
        assert!(meta.is_complete());
    }
}
