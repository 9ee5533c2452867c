use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, Type, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::model::{ChartMetadata, Pattern, Song, SongId};

use super::migrations::MIGRATIONS;

const UPSERT_PATTERN: &str = "
INSERT INTO patterns (hash, title, subtitle, artist, subartist, path, song_id, created_at, updated_at)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
ON CONFLICT(hash) DO UPDATE SET
    title = excluded.title,
    subtitle = excluded.subtitle,
    artist = excluded.artist,
    subartist = excluded.subartist,
    path = excluded.path,
    song_id = excluded.song_id,
    updated_at = excluded.updated_at";

const SELECT_PATTERN: &str = "
SELECT hash, title, subtitle, artist, subartist, path, song_id, created_at, updated_at
FROM patterns";

/// A database connection holding the chart index.
#[derive(Debug)]
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) a database at the given path and apply migrations.
    ///
    /// Missing parent directories are created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Self::from_connection(Connection::open(path)?)
    }

    /// Open an in-memory database (for tests).
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", true)?;
        let db = Self { conn };
        db.apply_migrations()?;
        Ok(db)
    }

    /// Get a reference to the underlying connection (for advanced queries).
    #[must_use]
    pub const fn conn(&self) -> &Connection {
        &self.conn
    }

    fn apply_migrations(&self) -> Result<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TEXT NOT NULL DEFAULT (datetime('now'))
            )",
            [],
        )?;

        let mut stmt = self
            .conn
            .prepare("SELECT version FROM schema_migrations ORDER BY version")?;
        let applied: Vec<u32> = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        for migration in MIGRATIONS {
            if !applied.contains(&migration.version) {
                log::info!(
                    "Applying migration {} ({})",
                    migration.version,
                    migration.name
                );
                self.conn.execute_batch(migration.sql)?;
                self.conn.execute(
                    "INSERT INTO schema_migrations (version, name) VALUES (?1, ?2)",
                    params![migration.version, migration.name],
                )?;
            }
        }

        Ok(())
    }

    /// Start a write batch. Dropping the batch without committing rolls it back.
    pub fn begin(&mut self) -> Result<Batch<'_>> {
        Ok(Batch {
            tx: self.conn.transaction()?,
        })
    }
}

// Song queries
impl Database {
    /// Every known song directory mapped to its id.
    pub fn song_index(&self) -> Result<HashMap<PathBuf, SongId>> {
        let mut stmt = self.conn.prepare("SELECT id, path FROM songs")?;
        let songs = stmt
            .query_map([], |row| {
                let id: SongId = row.get(0)?;
                let path: Vec<u8> = row.get(1)?;
                Ok((path_from_bytes(path), id))
            })?
            .collect::<rusqlite::Result<HashMap<_, _>>>()?;
        Ok(songs)
    }

    pub fn find_song_by_path(&self, path: &Path) -> Result<Option<Song>> {
        let song = self
            .conn
            .query_row(
                "SELECT id, path, created_at, updated_at FROM songs WHERE path = ?1",
                [path_bytes(path)],
                row_to_song,
            )
            .optional()?;
        Ok(song)
    }

    /// All songs registered for a directory. More than one row means the
    /// one-song-per-directory invariant was broken.
    pub fn list_songs_by_path(&self, path: &Path) -> Result<Vec<Song>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, path, created_at, updated_at FROM songs WHERE path = ?1 ORDER BY created_at",
        )?;
        let songs = stmt
            .query_map([path_bytes(path)], row_to_song)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(songs)
    }

    pub fn count_songs(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM songs", [], |row| row.get(0))?;
        Ok(count.unsigned_abs())
    }
}

// Pattern queries
impl Database {
    pub fn get_pattern(&self, hash: &str) -> Result<Option<Pattern>> {
        let pattern = self
            .conn
            .query_row(&format!("{SELECT_PATTERN} WHERE hash = ?1"), [hash], row_to_pattern)
            .optional()?;
        Ok(pattern)
    }

    pub fn list_patterns_for_song(&self, song_id: &SongId) -> Result<Vec<Pattern>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{SELECT_PATTERN} WHERE song_id = ?1 ORDER BY path"))?;
        let patterns = stmt
            .query_map([song_id], row_to_pattern)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(patterns)
    }

    pub fn count_patterns(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM patterns", [], |row| row.get(0))?;
        Ok(count.unsigned_abs())
    }
}

/// An open write transaction against the index.
///
/// Songs must be inserted before any pattern that references them; the
/// `patterns.song_id` foreign key rejects the upsert otherwise.
#[derive(Debug)]
pub struct Batch<'conn> {
    tx: Transaction<'conn>,
}

impl Batch<'_> {
    pub fn insert_song(&self, song: &Song) -> Result<()> {
        self.tx
            .prepare_cached(
                "INSERT INTO songs (id, path, created_at, updated_at) VALUES (?1, ?2, ?3, ?4)",
            )?
            .execute(params![
                song.id,
                path_bytes(&song.path),
                song.created_at.to_rfc3339(),
                song.updated_at.to_rfc3339(),
            ])?;
        Ok(())
    }

    /// Insert a pattern, or overwrite every non-key column of the row with
    /// the same hash. `created_at` of an existing row is preserved.
    pub fn upsert_pattern(&self, pattern: &Pattern) -> Result<()> {
        self.tx.prepare_cached(UPSERT_PATTERN)?.execute(params![
            pattern.hash,
            pattern.metadata.title,
            pattern.metadata.subtitle,
            pattern.metadata.artist,
            pattern.metadata.subartist,
            path_bytes(&pattern.path),
            pattern.song_id,
            pattern.created_at.to_rfc3339(),
            pattern.updated_at.to_rfc3339(),
        ])?;
        Ok(())
    }

    pub fn commit(self) -> Result<()> {
        self.tx.commit()?;
        Ok(())
    }

    pub fn rollback(self) -> Result<()> {
        self.tx.rollback()?;
        Ok(())
    }
}

impl ToSql for SongId {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.to_string()))
    }
}

impl FromSql for SongId {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: crate::Error| FromSqlError::Other(Box::new(e)))
    }
}

/// Paths are stored as their raw OS bytes so non-UTF-8 names round-trip.
#[cfg(unix)]
fn path_bytes(path: &Path) -> Vec<u8> {
    use std::os::unix::ffi::OsStrExt;
    path.as_os_str().as_bytes().to_vec()
}

#[cfg(not(unix))]
fn path_bytes(path: &Path) -> Vec<u8> {
    path.to_string_lossy().into_owned().into_bytes()
}

#[cfg(unix)]
fn path_from_bytes(bytes: Vec<u8>) -> PathBuf {
    use std::os::unix::ffi::OsStringExt;
    PathBuf::from(std::ffi::OsString::from_vec(bytes))
}

#[cfg(not(unix))]
fn path_from_bytes(bytes: Vec<u8>) -> PathBuf {
    PathBuf::from(String::from_utf8_lossy(&bytes).into_owned())
}

fn timestamp(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn row_to_song(row: &Row) -> rusqlite::Result<Song> {
    Ok(Song {
        id: row.get(0)?,
        path: path_from_bytes(row.get(1)?),
        created_at: timestamp(row, 2)?,
        updated_at: timestamp(row, 3)?,
    })
}

fn row_to_pattern(row: &Row) -> rusqlite::Result<Pattern> {
    Ok(Pattern {
        hash: row.get(0)?,
        metadata: ChartMetadata {
            title: row.get(1)?,
            subtitle: row.get(2)?,
            artist: row.get(3)?,
            subartist: row.get(4)?,
        },
        path: path_from_bytes(row.get(5)?),
        song_id: row.get(6)?,
        created_at: timestamp(row, 7)?,
        updated_at: timestamp(row, 8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_pattern(hash: &str, path: &str, song_id: SongId) -> Pattern {
        Pattern::new(
            hash.to_string(),
            ChartMetadata {
                title: "Title".to_string(),
                artist: "Artist".to_string(),
                ..Default::default()
            },
            PathBuf::from(path),
            song_id,
        )
    }

    #[test]
    fn test_database_open_in_memory() {
        let db = Database::open_in_memory().unwrap();
        let count: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(db.count_songs().unwrap(), 0);
        assert_eq!(db.count_patterns().unwrap(), 0);
    }

    #[test]
    fn test_reopen_does_not_reapply_migrations() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("index.db");

        drop(Database::open(&db_path).unwrap());
        let db = Database::open(&db_path).unwrap();

        let count: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_song_and_pattern_round_trip() {
        let mut db = Database::open_in_memory().unwrap();
        let song = Song::new("/charts/song");
        let pattern = sample_pattern("abc", "/charts/song/normal.bms", song.id);

        let batch = db.begin().unwrap();
        batch.insert_song(&song).unwrap();
        batch.upsert_pattern(&pattern).unwrap();
        batch.commit().unwrap();

        let index = db.song_index().unwrap();
        assert_eq!(index.get(Path::new("/charts/song")), Some(&song.id));

        let stored = db.get_pattern("abc").unwrap().unwrap();
        assert_eq!(stored.song_id, song.id);
        assert_eq!(stored.metadata.title, "Title");
        assert_eq!(stored.metadata.subtitle, "");
        assert_eq!(stored.path, PathBuf::from("/charts/song/normal.bms"));
    }

    #[test]
    fn test_upsert_overwrites_non_key_columns() {
        let mut db = Database::open_in_memory().unwrap();
        let first = Song::new("/a");
        let second = Song::new("/b");
        let original = sample_pattern("same", "/a/x.bms", first.id);

        let batch = db.begin().unwrap();
        batch.insert_song(&first).unwrap();
        batch.insert_song(&second).unwrap();
        batch.upsert_pattern(&original).unwrap();
        batch.commit().unwrap();

        let mut moved = sample_pattern("same", "/b/y.bms", second.id);
        moved.metadata.title = "Renamed".to_string();
        let batch = db.begin().unwrap();
        batch.upsert_pattern(&moved).unwrap();
        batch.commit().unwrap();

        assert_eq!(db.count_patterns().unwrap(), 1);
        let stored = db.get_pattern("same").unwrap().unwrap();
        assert_eq!(stored.path, PathBuf::from("/b/y.bms"));
        assert_eq!(stored.song_id, second.id);
        assert_eq!(stored.metadata.title, "Renamed");
        assert_eq!(
            stored.created_at.timestamp_millis(),
            original.created_at.timestamp_millis()
        );
        assert!(db.list_patterns_for_song(&first.id).unwrap().is_empty());
    }

    #[test]
    fn test_dropped_batch_rolls_back() {
        let mut db = Database::open_in_memory().unwrap();
        {
            let batch = db.begin().unwrap();
            batch.insert_song(&Song::new("/charts/lost")).unwrap();
        }
        assert_eq!(db.count_songs().unwrap(), 0);
    }

    #[test]
    fn test_pattern_requires_existing_song() {
        let mut db = Database::open_in_memory().unwrap();
        let orphan = sample_pattern("orphan", "/nowhere/x.bms", SongId::new());

        let batch = db.begin().unwrap();
        assert!(batch.upsert_pattern(&orphan).is_err());
    }

    #[test]
    fn test_find_song_by_path() {
        let mut db = Database::open_in_memory().unwrap();
        let song = Song::new("/charts/found");
        let batch = db.begin().unwrap();
        batch.insert_song(&song).unwrap();
        batch.commit().unwrap();

        let found = db.find_song_by_path(Path::new("/charts/found")).unwrap();
        assert_eq!(found.map(|s| s.id), Some(song.id));
        assert!(db
            .find_song_by_path(Path::new("/charts/missing"))
            .unwrap()
            .is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_paths_round_trip() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let mut db = Database::open_in_memory().unwrap();
        let dir = Path::new("/charts").join(OsStr::from_bytes(&[0x8B, 0xC8]));
        let other = Path::new("/charts").join(OsStr::from_bytes(&[0x8B, 0xC9]));
        let song = Song::new(&dir);
        let pattern = Pattern::new(
            "raw".to_string(),
            ChartMetadata::default(),
            dir.join("a.bms"),
            song.id,
        );

        let batch = db.begin().unwrap();
        batch.insert_song(&song).unwrap();
        batch.upsert_pattern(&pattern).unwrap();
        batch.commit().unwrap();

        assert_eq!(db.song_index().unwrap().get(&dir), Some(&song.id));
        assert_eq!(db.find_song_by_path(&dir).unwrap().unwrap().path, dir);
        assert!(db.find_song_by_path(&other).unwrap().is_none());
        assert_eq!(db.get_pattern("raw").unwrap().unwrap().path, dir.join("a.bms"));
    }
}
