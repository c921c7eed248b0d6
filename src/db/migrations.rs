// Database migrations
use rusqlite::Connection;
use anyhow::Result;

/// Bumped whenever the schema below changes shape
pub const SCHEMA_VERSION: i32 = 1;

const ENTITY_TABLES: &[&str] = &["tracks", "artists", "albums", "genres", "playlists"];

pub fn run_migrations(conn: &Connection) -> Result<()> {
    // Enable foreign keys
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;

    // Create albums table (tracks reference it)
    conn.execute(
        "CREATE TABLE IF NOT EXISTS albums (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            artist_name TEXT NOT NULL,
            year INTEGER,
            artwork_path TEXT,
            UNIQUE(name, artist_name)
        )",
        [],
    )?;

    // Create tracks table
    conn.execute(
        "CREATE TABLE IF NOT EXISTS tracks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            file_path TEXT UNIQUE NOT NULL,
            name TEXT NOT NULL,
            album_id INTEGER NOT NULL REFERENCES albums(id),
            track_number INTEGER,
            disc_number INTEGER,
            year INTEGER,
            duration_ms INTEGER,
            date_added INTEGER NOT NULL,
            date_modified INTEGER NOT NULL,
            file_hash TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS artists (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT UNIQUE NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS genres (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT UNIQUE NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS playlists (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT UNIQUE NOT NULL,
            date_created INTEGER NOT NULL,
            date_modified INTEGER NOT NULL
        )",
        [],
    )?;

    // Junction tables; `position` keeps artist credit order
    conn.execute(
        "CREATE TABLE IF NOT EXISTS track_artists (
            track_id INTEGER NOT NULL REFERENCES tracks(id) ON DELETE CASCADE,
            artist_id INTEGER NOT NULL REFERENCES artists(id) ON DELETE CASCADE,
            position INTEGER NOT NULL,
            PRIMARY KEY (track_id, artist_id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS track_genres (
            track_id INTEGER NOT NULL REFERENCES tracks(id) ON DELETE CASCADE,
            genre_id INTEGER NOT NULL REFERENCES genres(id) ON DELETE CASCADE,
            PRIMARY KEY (track_id, genre_id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS playlist_tracks (
            playlist_id INTEGER NOT NULL REFERENCES playlists(id) ON DELETE CASCADE,
            position INTEGER NOT NULL,
            track_id INTEGER NOT NULL REFERENCES tracks(id) ON DELETE CASCADE,
            date_added INTEGER NOT NULL,
            PRIMARY KEY (playlist_id, position)
        )",
        [],
    )?;

    // No foreign key on track_id: rows of deleted tracks are pruned by the queue
    // repository, which renumbers positions
    conn.execute(
        "CREATE TABLE IF NOT EXISTS queue (
            queue_position INTEGER PRIMARY KEY,
            track_id INTEGER NOT NULL,
            queue_item_id INTEGER UNIQUE NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS now_playing (
            id INTEGER PRIMARY KEY CHECK (id = 0),
            position_in_queue INTEGER NOT NULL DEFAULT -1,
            last_recorded_position_ms INTEGER NOT NULL DEFAULT 0,
            media_group TEXT
        )",
        [],
    )?;
    conn.execute(
        "INSERT OR IGNORE INTO now_playing (id, position_in_queue, last_recorded_position_ms)
         VALUES (0, -1, 0)",
        [],
    )?;

    // Full-text search mirrors, one per entity, kept current by triggers
    for table in ENTITY_TABLES {
        create_fts_mirror(conn, table)?;
    }

    // Create indexes for better query performance
    conn.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_tracks_album ON tracks(album_id);
         CREATE INDEX IF NOT EXISTS idx_track_artists_artist ON track_artists(artist_id);
         CREATE INDEX IF NOT EXISTS idx_track_genres_genre ON track_genres(genre_id);
         CREATE INDEX IF NOT EXISTS idx_playlist_tracks_track ON playlist_tracks(track_id);
         CREATE INDEX IF NOT EXISTS idx_queue_track ON queue(track_id);",
    )?;

    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;

    Ok(())
}

/// External-content FTS4 table over `table.name` plus the triggers that keep it in sync
fn create_fts_mirror(conn: &Connection, table: &str) -> Result<()> {
    conn.execute_batch(&format!(
        "CREATE VIRTUAL TABLE IF NOT EXISTS {table}_fts USING fts4(content=\"{table}\", name);
         CREATE TRIGGER IF NOT EXISTS {table}_fts_bu BEFORE UPDATE ON {table} BEGIN
             DELETE FROM {table}_fts WHERE docid = old.id;
         END;
         CREATE TRIGGER IF NOT EXISTS {table}_fts_bd BEFORE DELETE ON {table} BEGIN
             DELETE FROM {table}_fts WHERE docid = old.id;
         END;
         CREATE TRIGGER IF NOT EXISTS {table}_fts_au AFTER UPDATE ON {table} BEGIN
             INSERT INTO {table}_fts(docid, name) VALUES (new.id, new.name);
         END;
         CREATE TRIGGER IF NOT EXISTS {table}_fts_ai AFTER INSERT ON {table} BEGIN
             INSERT INTO {table}_fts(docid, name) VALUES (new.id, new.name);
         END;"
    ))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let version: i32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);

        let now_playing: i64 = conn
            .query_row(
                "SELECT position_in_queue FROM now_playing WHERE id = 0",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(now_playing, -1);
    }

    #[test]
    fn test_fts_triggers_follow_renames() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn.execute("INSERT INTO artists (name) VALUES ('Nina Simone')", []).unwrap();
        conn.execute("UPDATE artists SET name = 'Nick Drake' WHERE name = 'Nina Simone'", [])
            .unwrap();

        let hits = |term: &str| -> i64 {
            conn.query_row(
                "SELECT COUNT(*) FROM artists_fts WHERE artists_fts MATCH ?1",
                [term],
                |row| row.get(0),
            )
            .unwrap()
        };
        assert_eq!(hits("nina"), 0);
        assert_eq!(hits("drak*"), 1);
    }
}
