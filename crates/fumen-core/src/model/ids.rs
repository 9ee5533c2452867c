use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier for a song (one chart directory).
///
/// Minted once per distinct directory path with a random v4 UUID and
/// stored in its hyphenated text form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SongId(Uuid);

impl SongId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SongId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SongId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SongId {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|source| crate::Error::InvalidId {
                value: s.to_string(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_song_id_generation() {
        let id1 = SongId::new();
        let id2 = SongId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_song_id_text_round_trip() {
        let id = SongId::new();
        let parsed: SongId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_song_id_rejects_garbage() {
        let err = "not-a-uuid".parse::<SongId>().unwrap_err();
        assert!(err.to_string().contains("not-a-uuid"));
    }
}
