/// A schema migration.
#[derive(Debug)]
pub struct Migration {
    pub version: u32,
    pub name: &'static str,
    pub sql: &'static str,
}

const MIGRATION_001: &str = r#"
-- Songs: one row per chart directory. Paths are raw OS bytes.
CREATE TABLE IF NOT EXISTS songs (
    id TEXT PRIMARY KEY,
    path BLOB NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_songs_path ON songs(path);

-- Patterns: one row per distinct normalized chart content
CREATE TABLE IF NOT EXISTS patterns (
    hash TEXT PRIMARY KEY,
    title TEXT NOT NULL DEFAULT '',
    subtitle TEXT NOT NULL DEFAULT '',
    artist TEXT NOT NULL DEFAULT '',
    subartist TEXT NOT NULL DEFAULT '',
    path BLOB NOT NULL,
    song_id TEXT NOT NULL REFERENCES songs(id),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_patterns_song_id ON patterns(song_id);
"#;

pub const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "initial_schema",
    sql: MIGRATION_001,
}];
