use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;

use crate::db::models::{
    ArtistCredit, MediaGroup, NowPlayingInfo, Playlist, QueueEntry, QueuedTrack, Track,
};
use crate::error::{Error, Result};
use crate::metadata::extractor::ScannedTrack;

pub(crate) const UNKNOWN_ALBUM: &str = "Unknown Album";
pub(crate) const UNKNOWN_ARTIST: &str = "Unknown Artist";

/// Column list matching [`DbOperations::track_from_row`].
///
/// `t` aliases `tracks` and `al` aliases `albums`.
pub(crate) const TRACK_COLUMNS: &str = "t.id, t.name, t.album_id, al.name, t.file_path,
     t.track_number, t.disc_number, t.year, t.duration_ms, t.date_added";

/// What the library already knows about a file, for incremental sync
#[derive(Debug, Clone)]
pub struct IndexedFile {
    pub track_id: i64,
    pub date_modified: i64,
    pub file_hash: Option<String>,
}

pub(crate) fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Database operations for library management
pub struct DbOperations;

impl DbOperations {
    /// Map a row selected with [`TRACK_COLUMNS`]; artists are attached separately
    pub(crate) fn track_from_row(row: &Row<'_>) -> rusqlite::Result<Track> {
        Ok(Track {
            id: row.get(0)?,
            name: row.get(1)?,
            artists: Vec::new(),
            album_id: row.get(2)?,
            album_name: row.get(3)?,
            file_path: row.get(4)?,
            track_number: row.get(5)?,
            disc_number: row.get(6)?,
            year: row.get(7)?,
            duration_ms: row.get(8)?,
            date_added: row.get(9)?,
        })
    }

    /// Fill in each track's artist credits, in credit order
    pub(crate) fn attach_artists(conn: &Connection, tracks: &mut [Track]) -> Result<()> {
        let mut stmt = conn.prepare_cached(
            "SELECT ar.id, ar.name
             FROM track_artists ta
             INNER JOIN artists ar ON ar.id = ta.artist_id
             WHERE ta.track_id = ?1
             ORDER BY ta.position",
        )?;
        for track in tracks.iter_mut() {
            track.artists = stmt
                .query_map([track.id], |row| {
                    Ok(ArtistCredit {
                        id: row.get(0)?,
                        name: row.get(1)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
        }
        Ok(())
    }

    /// Run a track query built on [`TRACK_COLUMNS`] and attach artists
    pub(crate) fn query_tracks<P: rusqlite::Params>(
        conn: &Connection,
        sql: &str,
        params: P,
    ) -> Result<Vec<Track>> {
        let mut stmt = conn.prepare(sql)?;
        let mut tracks = stmt
            .query_map(params, Self::track_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Self::attach_artists(conn, &mut tracks)?;
        Ok(tracks)
    }

    /// Get a track by id
    pub fn get_track(conn: &Connection, track_id: i64) -> Result<Option<Track>> {
        let sql = format!(
            "SELECT {TRACK_COLUMNS}
             FROM tracks t
             INNER JOIN albums al ON al.id = t.album_id
             WHERE t.id = ?1"
        );
        Ok(Self::query_tracks(conn, &sql, [track_id])?.into_iter().next())
    }

    // ===== Library sync =====

    /// Every indexed file keyed by path
    pub fn indexed_files(conn: &Connection) -> Result<HashMap<String, IndexedFile>> {
        let mut stmt = conn.prepare("SELECT file_path, id, date_modified, file_hash FROM tracks")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                IndexedFile {
                    track_id: row.get(1)?,
                    date_modified: row.get(2)?,
                    file_hash: row.get(3)?,
                },
            ))
        })?;
        Ok(rows.collect::<rusqlite::Result<HashMap<_, _>>>()?)
    }

    /// Insert or get artist ID
    pub fn insert_or_get_artist(conn: &Connection, name: &str) -> Result<i64> {
        if let Some(id) = conn
            .query_row("SELECT id FROM artists WHERE name = ?1", [name], |row| row.get(0))
            .optional()?
        {
            return Ok(id);
        }
        conn.execute("INSERT INTO artists (name) VALUES (?1)", [name])?;
        Ok(conn.last_insert_rowid())
    }

    /// Insert or get genre ID
    pub fn insert_or_get_genre(conn: &Connection, name: &str) -> Result<i64> {
        if let Some(id) = conn
            .query_row("SELECT id FROM genres WHERE name = ?1", [name], |row| row.get(0))
            .optional()?
        {
            return Ok(id);
        }
        conn.execute("INSERT INTO genres (name) VALUES (?1)", [name])?;
        Ok(conn.last_insert_rowid())
    }

    /// Insert or get album ID; year and artwork are filled in when first known
    pub fn insert_or_get_album(
        conn: &Connection,
        name: &str,
        artist_name: &str,
        year: Option<i32>,
        artwork_path: Option<&str>,
    ) -> Result<i64> {
        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM albums WHERE name = ?1 AND artist_name = ?2",
                params![name, artist_name],
                |row| row.get(0),
            )
            .optional()?;

        match existing {
            Some(id) => {
                conn.execute(
                    "UPDATE albums
                     SET year = COALESCE(year, ?1), artwork_path = COALESCE(artwork_path, ?2)
                     WHERE id = ?3",
                    params![year, artwork_path, id],
                )?;
                Ok(id)
            }
            None => {
                conn.execute(
                    "INSERT INTO albums (name, artist_name, year, artwork_path) VALUES (?1, ?2, ?3, ?4)",
                    params![name, artist_name, year, artwork_path],
                )?;
                Ok(conn.last_insert_rowid())
            }
        }
    }

    /// Insert or update a scanned file together with its album, artist and genre links
    pub fn upsert_scanned_track(
        conn: &Connection,
        scanned: &ScannedTrack,
        file_hash: &str,
    ) -> Result<i64> {
        let album_artist = scanned
            .album_artist
            .as_deref()
            .or_else(|| scanned.artists.first().map(String::as_str))
            .unwrap_or(UNKNOWN_ARTIST);
        let album_name = scanned.album.as_deref().unwrap_or(UNKNOWN_ALBUM);
        let artwork = scanned.has_artwork.then_some(scanned.file_path.as_str());
        let album_id =
            Self::insert_or_get_album(conn, album_name, album_artist, scanned.year, artwork)?;

        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM tracks WHERE file_path = ?1",
                [&scanned.file_path],
                |row| row.get(0),
            )
            .optional()?;

        let track_id = match existing {
            Some(track_id) => {
                conn.execute(
                    "UPDATE tracks SET
                        name = ?1, album_id = ?2, track_number = ?3, disc_number = ?4,
                        year = ?5, duration_ms = ?6, date_modified = ?7, file_hash = ?8
                     WHERE id = ?9",
                    params![
                        scanned.title,
                        album_id,
                        scanned.track_number,
                        scanned.disc_number,
                        scanned.year,
                        scanned.duration_ms,
                        scanned.date_modified,
                        file_hash,
                        track_id
                    ],
                )?;
                track_id
            }
            None => {
                conn.execute(
                    "INSERT INTO tracks (
                        file_path, name, album_id, track_number, disc_number,
                        year, duration_ms, date_added, date_modified, file_hash
                     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    params![
                        scanned.file_path,
                        scanned.title,
                        album_id,
                        scanned.track_number,
                        scanned.disc_number,
                        scanned.year,
                        scanned.duration_ms,
                        now_ts(),
                        scanned.date_modified,
                        file_hash
                    ],
                )?;
                conn.last_insert_rowid()
            }
        };

        // Replace relationships wholesale
        conn.execute("DELETE FROM track_artists WHERE track_id = ?1", [track_id])?;
        conn.execute("DELETE FROM track_genres WHERE track_id = ?1", [track_id])?;

        let credited: Vec<&str> = if scanned.artists.is_empty() {
            vec![UNKNOWN_ARTIST]
        } else {
            scanned.artists.iter().map(String::as_str).collect()
        };
        for (position, artist_name) in credited.iter().enumerate() {
            let artist_id = Self::insert_or_get_artist(conn, artist_name)?;
            conn.execute(
                "INSERT OR IGNORE INTO track_artists (track_id, artist_id, position) VALUES (?1, ?2, ?3)",
                params![track_id, artist_id, position as i64],
            )?;
        }
        for genre_name in &scanned.genres {
            let genre_id = Self::insert_or_get_genre(conn, genre_name)?;
            conn.execute(
                "INSERT OR IGNORE INTO track_genres (track_id, genre_id) VALUES (?1, ?2)",
                params![track_id, genre_id],
            )?;
        }

        Ok(track_id)
    }

    /// Delete tracks by id; junction rows cascade
    pub fn delete_tracks(conn: &Connection, track_ids: &[i64]) -> Result<usize> {
        let mut stmt = conn.prepare_cached("DELETE FROM tracks WHERE id = ?1")?;
        let mut removed = 0;
        for id in track_ids {
            removed += stmt.execute([id])?;
        }
        Ok(removed)
    }

    /// Drop albums, artists and genres no track refers to any more
    pub fn remove_orphans(conn: &Connection) -> Result<()> {
        conn.execute(
            "DELETE FROM albums WHERE id NOT IN (SELECT DISTINCT album_id FROM tracks)",
            [],
        )?;
        conn.execute(
            "DELETE FROM artists WHERE id NOT IN (SELECT DISTINCT artist_id FROM track_artists)",
            [],
        )?;
        conn.execute(
            "DELETE FROM genres WHERE id NOT IN (SELECT DISTINCT genre_id FROM track_genres)",
            [],
        )?;
        Ok(())
    }

    /// Delete the whole library (queue and playlists included)
    pub fn clear_library(conn: &mut Connection) -> Result<()> {
        let tx = conn.transaction()?;
        tx.execute_batch(
            "DELETE FROM queue;
             UPDATE now_playing SET position_in_queue = -1, last_recorded_position_ms = 0, media_group = NULL;
             DELETE FROM playlist_tracks;
             DELETE FROM playlists;
             DELETE FROM track_artists;
             DELETE FROM track_genres;
             DELETE FROM tracks;
             DELETE FROM albums;
             DELETE FROM artists;
             DELETE FROM genres;",
        )?;
        tx.commit()?;
        Ok(())
    }

    // ===== Queue =====

    /// Queue rows in position order, including rows whose track has vanished
    pub fn queue_entries(conn: &Connection) -> Result<Vec<QueueEntry>> {
        let mut stmt = conn.prepare(
            "SELECT track_id, queue_item_id FROM queue ORDER BY queue_position",
        )?;
        let entries = stmt
            .query_map([], |row| Ok(QueueEntry::new(row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    /// Queue rows resolved to tracks, positions renumbered from zero
    pub fn queued_tracks(conn: &Connection) -> Result<Vec<QueuedTrack>> {
        let sql = format!(
            "SELECT {TRACK_COLUMNS}, q.queue_item_id
             FROM queue q
             INNER JOIN tracks t ON t.id = q.track_id
             INNER JOIN albums al ON al.id = t.album_id
             ORDER BY q.queue_position"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], |row| Ok((Self::track_from_row(row)?, row.get::<_, i64>(10)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut tracks: Vec<Track> = Vec::with_capacity(rows.len());
        let mut item_ids = Vec::with_capacity(rows.len());
        for (track, item_id) in rows {
            tracks.push(track);
            item_ids.push(item_id);
        }
        Self::attach_artists(conn, &mut tracks)?;

        Ok(tracks
            .into_iter()
            .zip(item_ids)
            .enumerate()
            .map(|(position, (track, queue_item_id))| QueuedTrack {
                track,
                position,
                queue_item_id,
            })
            .collect())
    }

    pub fn load_now_playing(conn: &Connection) -> Result<NowPlayingInfo> {
        let (position, offset, group): (i64, i64, Option<String>) = conn.query_row(
            "SELECT position_in_queue, last_recorded_position_ms, media_group
             FROM now_playing WHERE id = 0",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;

        let media_group = match group {
            Some(json) => match serde_json::from_str::<MediaGroup>(&json) {
                Ok(group) => Some(group),
                Err(e) => {
                    log::warn!("Ignoring unreadable media group '{}': {}", json, e);
                    None
                }
            },
            None => None,
        };

        Ok(NowPlayingInfo {
            position_in_queue: NowPlayingInfo::position_from_sql(position),
            last_recorded_position_ms: u64::try_from(offset).unwrap_or(0),
            media_group,
        })
    }

    pub fn write_now_playing(conn: &Connection, info: &NowPlayingInfo) -> Result<()> {
        let group = info.media_group.map(|g| serde_json::to_string(&g)).transpose()?;
        conn.execute(
            "UPDATE now_playing
             SET position_in_queue = ?1, last_recorded_position_ms = ?2, media_group = ?3
             WHERE id = 0",
            params![
                info.position_to_sql(),
                i64::try_from(info.last_recorded_position_ms).unwrap_or(i64::MAX),
                group
            ],
        )?;
        Ok(())
    }

    /// Clear the queue table and write `entries` at positions 0..n, then the
    /// now-playing record, in one transaction
    pub fn replace_queue(
        conn: &mut Connection,
        info: &NowPlayingInfo,
        entries: &[QueueEntry],
    ) -> Result<()> {
        let tx = conn.transaction()?;
        Self::write_queue(&tx, info, entries)?;
        tx.commit()?;
        Ok(())
    }

    /// [`replace_queue`](Self::replace_queue) inside a transaction the caller owns
    pub fn write_queue(
        conn: &Connection,
        info: &NowPlayingInfo,
        entries: &[QueueEntry],
    ) -> Result<()> {
        conn.execute("DELETE FROM queue", [])?;
        {
            let mut stmt = conn.prepare(
                "INSERT INTO queue (queue_position, track_id, queue_item_id) VALUES (?1, ?2, ?3)",
            )?;
            for (position, entry) in entries.iter().enumerate() {
                stmt.execute(params![position as i64, entry.track_id, entry.queue_item_id])?;
            }
        }
        Self::write_now_playing(conn, info)
    }

    pub fn max_queue_item_id(conn: &Connection) -> Result<i64> {
        Ok(conn.query_row("SELECT COALESCE(MAX(queue_item_id), 0) FROM queue", [], |row| {
            row.get(0)
        })?)
    }

    // ===== User Playlists =====

    /// Create a new playlist
    pub fn create_playlist(conn: &Connection, name: &str) -> Result<i64> {
        let exists: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM playlists WHERE name = ?1",
            [name],
            |row| row.get(0),
        )?;
        if exists {
            return Err(Error::DuplicatePlaylist(name.to_string()));
        }

        let now = now_ts();
        conn.execute(
            "INSERT INTO playlists (name, date_created, date_modified) VALUES (?1, ?2, ?3)",
            params![name, now, now],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Rename a playlist
    pub fn rename_playlist(conn: &Connection, playlist_id: i64, new_name: &str) -> Result<()> {
        let exists: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM playlists WHERE name = ?1 AND id != ?2",
            params![new_name, playlist_id],
            |row| row.get(0),
        )?;
        if exists {
            return Err(Error::DuplicatePlaylist(new_name.to_string()));
        }

        let rows_affected = conn.execute(
            "UPDATE playlists SET name = ?1, date_modified = ?2 WHERE id = ?3",
            params![new_name, now_ts(), playlist_id],
        )?;
        if rows_affected == 0 {
            return Err(Error::not_found("playlist", playlist_id));
        }
        Ok(())
    }

    pub fn delete_playlist(conn: &Connection, playlist_id: i64) -> Result<()> {
        let rows_affected = conn.execute("DELETE FROM playlists WHERE id = ?1", [playlist_id])?;
        if rows_affected == 0 {
            return Err(Error::not_found("playlist", playlist_id));
        }
        Ok(())
    }

    /// Append a track to a playlist; the same track may appear more than once
    pub fn add_track_to_playlist(conn: &Connection, playlist_id: i64, track_id: i64) -> Result<()> {
        if Self::get_playlist(conn, playlist_id)?.is_none() {
            return Err(Error::not_found("playlist", playlist_id));
        }
        if Self::get_track(conn, track_id)?.is_none() {
            return Err(Error::not_found("track", track_id));
        }

        let position: i64 = conn.query_row(
            "SELECT COALESCE(MAX(position), -1) + 1 FROM playlist_tracks WHERE playlist_id = ?1",
            [playlist_id],
            |row| row.get(0),
        )?;
        let now = now_ts();
        conn.execute(
            "INSERT INTO playlist_tracks (playlist_id, position, track_id, date_added) VALUES (?1, ?2, ?3, ?4)",
            params![playlist_id, position, track_id, now],
        )?;
        conn.execute(
            "UPDATE playlists SET date_modified = ?1 WHERE id = ?2",
            params![now, playlist_id],
        )?;
        Ok(())
    }

    /// Remove the entry at `position` and close the gap
    pub fn remove_from_playlist(
        conn: &mut Connection,
        playlist_id: i64,
        position: usize,
    ) -> Result<()> {
        let tx = conn.transaction()?;
        let removed = tx.execute(
            "DELETE FROM playlist_tracks WHERE playlist_id = ?1 AND position = ?2",
            params![playlist_id, position as i64],
        )?;
        if removed == 0 {
            return Err(Error::not_found("playlist entry", position as i64));
        }
        Self::renumber_playlist(&tx, playlist_id)?;
        tx.commit()?;
        Ok(())
    }

    /// Rewrite playlist positions as 0..n in their current order
    pub(crate) fn renumber_playlist(conn: &Connection, playlist_id: i64) -> Result<()> {
        let mut stmt = conn.prepare(
            "SELECT position FROM playlist_tracks WHERE playlist_id = ?1 ORDER BY position",
        )?;
        let positions = stmt
            .query_map([playlist_id], |row| row.get::<_, i64>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        // Two passes through negative positions so the primary key never collides
        let mut update = conn.prepare_cached(
            "UPDATE playlist_tracks SET position = ?1 WHERE playlist_id = ?2 AND position = ?3",
        )?;
        for (index, old) in positions.iter().enumerate() {
            update.execute(params![-(index as i64) - 1, playlist_id, old])?;
        }
        for index in 0..positions.len() as i64 {
            update.execute(params![index, playlist_id, -index - 1])?;
        }
        Ok(())
    }

    pub fn get_playlist(conn: &Connection, playlist_id: i64) -> Result<Option<Playlist>> {
        Ok(conn
            .query_row(
                "SELECT p.id, p.name, p.date_created,
                        (SELECT COUNT(*) FROM playlist_tracks pt WHERE pt.playlist_id = p.id)
                 FROM playlists p WHERE p.id = ?1",
                [playlist_id],
                |row| {
                    Ok(Playlist {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        date_created: row.get(2)?,
                        track_count: row.get(3)?,
                    })
                },
            )
            .optional()?)
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::db::migrations::run_migrations;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn
    }

    #[test]
    fn test_upsert_keeps_artist_credit_order() {
        let conn = conn();
        let ids = seed(&conn, &[scanned("/m/a.mp3", "Duet", &["Zed", "Abe"], "Pairs")]);

        let track = DbOperations::get_track(&conn, ids[0]).unwrap().unwrap();
        let names: Vec<_> = track.artists.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["Zed", "Abe"]);
        assert_eq!(track.album_name, "Pairs");
    }

    #[test]
    fn test_upsert_same_path_updates_in_place() {
        let conn = conn();
        let first = seed(&conn, &[scanned("/m/a.mp3", "Old", &["A"], "X")])[0];
        let second = seed(&conn, &[scanned("/m/a.mp3", "New", &["B"], "Y")])[0];
        assert_eq!(first, second);

        DbOperations::remove_orphans(&conn).unwrap();
        let track = DbOperations::get_track(&conn, first).unwrap().unwrap();
        assert_eq!(track.name, "New");
        assert_eq!(track.artists[0].name, "B");
        let albums: i64 = conn.query_row("SELECT COUNT(*) FROM albums", [], |r| r.get(0)).unwrap();
        assert_eq!(albums, 1);
    }

    #[test]
    fn test_untagged_file_gets_placeholders() {
        let conn = conn();
        let mut bare = scanned("/m/bare.wav", "bare", &[], "");
        bare.album = None;
        let id = seed(&conn, &[bare])[0];

        let track = DbOperations::get_track(&conn, id).unwrap().unwrap();
        assert_eq!(track.album_name, UNKNOWN_ALBUM);
        assert_eq!(track.artists[0].name, UNKNOWN_ARTIST);
    }

    #[test]
    fn test_replace_queue_round_trip() {
        let mut conn = conn();
        let ids = seed(
            &conn,
            &[
                scanned("/m/1.mp3", "One", &["A"], "X"),
                scanned("/m/2.mp3", "Two", &["A"], "X"),
            ],
        );
        let entries = vec![
            QueueEntry::new(ids[1], 10),
            QueueEntry::new(ids[0], 11),
            QueueEntry::new(ids[1], 12),
        ];
        let info = NowPlayingInfo::playing(2)
            .with_position_ms(4_500)
            .with_media_group(MediaGroup::Album(1));

        DbOperations::replace_queue(&mut conn, &info, &entries).unwrap();

        assert_eq!(DbOperations::queue_entries(&conn).unwrap(), entries);
        assert_eq!(DbOperations::load_now_playing(&conn).unwrap(), info);
        let queued = DbOperations::queued_tracks(&conn).unwrap();
        assert_eq!(queued.len(), 3);
        assert_eq!(queued[2].position, 2);
        assert_eq!(queued[2].queue_item_id, 12);
        assert_eq!(queued[0].track.name, "Two");
        assert_eq!(DbOperations::max_queue_item_id(&conn).unwrap(), 12);
    }

    #[test]
    fn test_playlist_positions_stay_contiguous() {
        let mut conn = conn();
        let ids = seed(
            &conn,
            &[
                scanned("/m/1.mp3", "One", &["A"], "X"),
                scanned("/m/2.mp3", "Two", &["A"], "X"),
            ],
        );
        let playlist = DbOperations::create_playlist(&conn, "Mix").unwrap();
        for id in [ids[0], ids[1], ids[0]] {
            DbOperations::add_track_to_playlist(&conn, playlist, id).unwrap();
        }
        DbOperations::remove_from_playlist(&mut conn, playlist, 0).unwrap();

        let positions: Vec<(i64, i64)> = conn
            .prepare("SELECT position, track_id FROM playlist_tracks ORDER BY position")
            .unwrap()
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))
            .unwrap()
            .collect::<rusqlite::Result<_>>()
            .unwrap();
        assert_eq!(positions, vec![(0, ids[1]), (1, ids[0])]);
    }

    #[test]
    fn test_duplicate_playlist_name_rejected() {
        let conn = conn();
        DbOperations::create_playlist(&conn, "Mix").unwrap();
        assert!(matches!(
            DbOperations::create_playlist(&conn, "Mix"),
            Err(Error::DuplicatePlaylist(_))
        ));
        assert!(DbOperations::rename_playlist(&conn, 99, "Other").unwrap_err().is_not_found());
    }
}
