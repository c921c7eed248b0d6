// Read-side queries: sorted lists per media group and full-text search
use regex::Regex;
use rusqlite::{params, Connection};
use std::sync::OnceLock;

use super::models::{Album, Artist, Genre, MediaGroup, Playlist, SearchResults, Track};
use super::operations::{DbOperations, TRACK_COLUMNS};
use crate::error::Result;
use crate::settings::preferences::{SortOption, SortPreference};

/// First credited artist of `t`, for sorting
const FIRST_ARTIST: &str = "(SELECT ar.name FROM track_artists ta
      INNER JOIN artists ar ON ar.id = ta.artist_id
      WHERE ta.track_id = t.id ORDER BY ta.position LIMIT 1)";

fn track_order(pref: SortPreference, custom: Option<&str>) -> String {
    let dir = pref.order.sql();
    match pref.option {
        SortOption::ArtistName => format!(
            "{FIRST_ARTIST} COLLATE NOCASE {dir}, al.name COLLATE NOCASE, t.disc_number, t.track_number, t.id"
        ),
        SortOption::AlbumName => format!(
            "al.name COLLATE NOCASE {dir}, t.disc_number, t.track_number, t.id"
        ),
        SortOption::Year => format!("t.year {dir}, t.name COLLATE NOCASE, t.id"),
        SortOption::DateAdded => format!("t.date_added {dir}, t.id {dir}"),
        SortOption::Custom => match custom {
            Some(position) => format!("{position} {dir}"),
            None => format!("t.name COLLATE NOCASE {dir}, t.id"),
        },
        SortOption::Name | SortOption::TrackCount => format!("t.name COLLATE NOCASE {dir}, t.id"),
    }
}

/// Turn free text into an FTS4 expression: every token must match as a prefix.
///
/// Returns `None` when nothing searchable is left.
pub fn fts_match_expression(query: &str) -> Option<String> {
    static SEPARATORS: OnceLock<Regex> = OnceLock::new();
    let separators = SEPARATORS.get_or_init(|| {
        Regex::new(r"[^\p{L}\p{N}]+").expect("separator pattern is valid")
    });

    // Lowercase so tokens are never read as AND/OR/NOT operators
    let terms: Vec<String> = separators
        .split(query)
        .filter(|token| !token.is_empty())
        .map(|token| format!("{}*", token.to_lowercase()))
        .collect();

    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" "))
    }
}

impl DbOperations {
    /// Tracks of a media group in display order.
    ///
    /// `pref` applies to all-tracks, genre and playlist groups; albums and artists
    /// have a fixed order.
    pub fn tracks_for_group(
        conn: &Connection,
        group: MediaGroup,
        pref: SortPreference,
    ) -> Result<Vec<Track>> {
        let base = format!(
            "SELECT {TRACK_COLUMNS} FROM tracks t INNER JOIN albums al ON al.id = t.album_id"
        );
        match group {
            MediaGroup::AllTracks => {
                let sql = format!("{base} ORDER BY {}", track_order(pref, None));
                Self::query_tracks(conn, &sql, [])
            }
            MediaGroup::SingleTrack(track_id) => {
                Ok(Self::get_track(conn, track_id)?.into_iter().collect())
            }
            MediaGroup::Album(album_id) => {
                let sql = format!(
                    "{base} WHERE t.album_id = ?1
                     ORDER BY t.disc_number, t.track_number, t.name COLLATE NOCASE, t.id"
                );
                Self::query_tracks(conn, &sql, [album_id])
            }
            MediaGroup::Artist(artist_id) => {
                let sql = format!(
                    "{base} INNER JOIN track_artists ta ON ta.track_id = t.id
                     WHERE ta.artist_id = ?1
                     ORDER BY al.name COLLATE NOCASE, t.disc_number, t.track_number, t.id"
                );
                Self::query_tracks(conn, &sql, [artist_id])
            }
            MediaGroup::Genre(genre_id) => {
                let sql = format!(
                    "{base} INNER JOIN track_genres tg ON tg.track_id = t.id
                     WHERE tg.genre_id = ?1
                     ORDER BY {}",
                    track_order(pref, None)
                );
                Self::query_tracks(conn, &sql, [genre_id])
            }
            MediaGroup::Playlist(playlist_id) => {
                let sql = format!(
                    "{base} INNER JOIN playlist_tracks pt ON pt.track_id = t.id
                     WHERE pt.playlist_id = ?1
                     ORDER BY {}",
                    track_order(pref, Some("pt.position"))
                );
                Self::query_tracks(conn, &sql, [playlist_id])
            }
        }
    }

    fn query_albums(
        conn: &Connection,
        filter: &str,
        order: &str,
        arg: Option<&str>,
    ) -> Result<Vec<Album>> {
        let sql = format!(
            "SELECT al.id, al.name, al.artist_name, al.year, al.artwork_path, COUNT(t.id) AS track_count
             FROM albums al
             LEFT JOIN tracks t ON t.album_id = al.id
             {filter}
             GROUP BY al.id
             ORDER BY {order}"
        );
        let mut stmt = conn.prepare(&sql)?;
        let map = |row: &rusqlite::Row<'_>| -> rusqlite::Result<Album> {
            Ok(Album {
                id: row.get(0)?,
                name: row.get(1)?,
                artist_name: row.get(2)?,
                year: row.get(3)?,
                artwork_path: row.get(4)?,
                track_count: row.get(5)?,
            })
        };
        let albums = match arg {
            Some(arg) => stmt.query_map([arg], map)?.collect::<rusqlite::Result<Vec<_>>>()?,
            None => stmt.query_map([], map)?.collect::<rusqlite::Result<Vec<_>>>()?,
        };
        Ok(albums)
    }

    /// Get all albums
    pub fn get_all_albums(conn: &Connection, pref: SortPreference) -> Result<Vec<Album>> {
        let dir = pref.order.sql();
        let order = match pref.option {
            SortOption::ArtistName => {
                format!("al.artist_name COLLATE NOCASE {dir}, al.name COLLATE NOCASE, al.id")
            }
            SortOption::Year => format!("al.year {dir}, al.name COLLATE NOCASE, al.id"),
            SortOption::TrackCount => format!("track_count {dir}, al.name COLLATE NOCASE, al.id"),
            _ => format!("al.name COLLATE NOCASE {dir}, al.id"),
        };
        Self::query_albums(conn, "", &order, None)
    }

    fn count_order(pref: SortPreference, alias: &str) -> String {
        let dir = pref.order.sql();
        match pref.option {
            SortOption::TrackCount => format!("track_count {dir}, {alias}.name COLLATE NOCASE"),
            _ => format!("{alias}.name COLLATE NOCASE {dir}, {alias}.id"),
        }
    }

    fn query_named_counts<T>(
        conn: &Connection,
        sql: &str,
        arg: Option<&str>,
        build: fn(i64, String, i64) -> T,
    ) -> Result<Vec<T>> {
        let mut stmt = conn.prepare(sql)?;
        let map = |row: &rusqlite::Row<'_>| -> rusqlite::Result<T> {
            Ok(build(row.get(0)?, row.get(1)?, row.get(2)?))
        };
        let rows = match arg {
            Some(arg) => stmt.query_map([arg], map)?.collect::<rusqlite::Result<Vec<_>>>()?,
            None => stmt.query_map([], map)?.collect::<rusqlite::Result<Vec<_>>>()?,
        };
        Ok(rows)
    }

    fn artist(id: i64, name: String, track_count: i64) -> Artist {
        Artist { id, name, track_count }
    }

    fn genre(id: i64, name: String, track_count: i64) -> Genre {
        Genre { id, name, track_count }
    }

    /// Get all artists with their track counts
    pub fn get_all_artists(conn: &Connection, pref: SortPreference) -> Result<Vec<Artist>> {
        let sql = format!(
            "SELECT ar.id, ar.name, COUNT(DISTINCT ta.track_id) AS track_count
             FROM artists ar
             LEFT JOIN track_artists ta ON ta.artist_id = ar.id
             GROUP BY ar.id
             ORDER BY {}",
            Self::count_order(pref, "ar")
        );
        Self::query_named_counts(conn, &sql, None, Self::artist)
    }

    /// Get all genres with their track counts
    pub fn get_all_genres(conn: &Connection, pref: SortPreference) -> Result<Vec<Genre>> {
        let sql = format!(
            "SELECT g.id, g.name, COUNT(DISTINCT tg.track_id) AS track_count
             FROM genres g
             LEFT JOIN track_genres tg ON tg.genre_id = g.id
             GROUP BY g.id
             ORDER BY {}",
            Self::count_order(pref, "g")
        );
        Self::query_named_counts(conn, &sql, None, Self::genre)
    }

    fn query_playlists(
        conn: &Connection,
        filter: &str,
        order: &str,
        arg: Option<&str>,
    ) -> Result<Vec<Playlist>> {
        let sql = format!(
            "SELECT p.id, p.name, p.date_created, COUNT(pt.track_id) AS track_count
             FROM playlists p
             LEFT JOIN playlist_tracks pt ON pt.playlist_id = p.id
             {filter}
             GROUP BY p.id
             ORDER BY {order}"
        );
        let mut stmt = conn.prepare(&sql)?;
        let map = |row: &rusqlite::Row<'_>| -> rusqlite::Result<Playlist> {
            Ok(Playlist {
                id: row.get(0)?,
                name: row.get(1)?,
                date_created: row.get(2)?,
                track_count: row.get(3)?,
            })
        };
        let playlists = match arg {
            Some(arg) => stmt.query_map([arg], map)?.collect::<rusqlite::Result<Vec<_>>>()?,
            None => stmt.query_map([], map)?.collect::<rusqlite::Result<Vec<_>>>()?,
        };
        Ok(playlists)
    }

    pub fn get_all_playlists(conn: &Connection, pref: SortPreference) -> Result<Vec<Playlist>> {
        let dir = pref.order.sql();
        let order = match pref.option {
            SortOption::DateAdded => format!("p.date_created {dir}, p.id {dir}"),
            SortOption::TrackCount => format!("track_count {dir}, p.name COLLATE NOCASE"),
            _ => format!("p.name COLLATE NOCASE {dir}, p.id"),
        };
        Self::query_playlists(conn, "", &order, None)
    }

    /// Prefix search over every entity's name; an empty query matches nothing
    pub fn search(conn: &Connection, query: &str) -> Result<SearchResults> {
        let Some(expr) = fts_match_expression(query) else {
            return Ok(SearchResults::default());
        };

        let track_sql = format!(
            "SELECT {TRACK_COLUMNS}
             FROM tracks t
             INNER JOIN albums al ON al.id = t.album_id
             WHERE t.id IN (SELECT docid FROM tracks_fts WHERE tracks_fts MATCH ?1)
             ORDER BY t.name COLLATE NOCASE, t.id"
        );
        let tracks = Self::query_tracks(conn, &track_sql, params![expr])?;

        let albums = Self::query_albums(
            conn,
            "WHERE al.id IN (SELECT docid FROM albums_fts WHERE albums_fts MATCH ?1)",
            "al.name COLLATE NOCASE, al.id",
            Some(expr.as_str()),
        )?;

        let artists = Self::query_named_counts(
            conn,
            "SELECT ar.id, ar.name, COUNT(DISTINCT ta.track_id)
             FROM artists ar
             LEFT JOIN track_artists ta ON ta.artist_id = ar.id
             WHERE ar.id IN (SELECT docid FROM artists_fts WHERE artists_fts MATCH ?1)
             GROUP BY ar.id
             ORDER BY ar.name COLLATE NOCASE",
            Some(expr.as_str()),
            Self::artist,
        )?;

        let genres = Self::query_named_counts(
            conn,
            "SELECT g.id, g.name, COUNT(DISTINCT tg.track_id)
             FROM genres g
             LEFT JOIN track_genres tg ON tg.genre_id = g.id
             WHERE g.id IN (SELECT docid FROM genres_fts WHERE genres_fts MATCH ?1)
             GROUP BY g.id
             ORDER BY g.name COLLATE NOCASE",
            Some(expr.as_str()),
            Self::genre,
        )?;

        let playlists = Self::query_playlists(
            conn,
            "WHERE p.id IN (SELECT docid FROM playlists_fts WHERE playlists_fts MATCH ?1)",
            "p.name COLLATE NOCASE, p.id",
            Some(expr.as_str()),
        )?;

        Ok(SearchResults {
            tracks,
            artists,
            albums,
            genres,
            playlists,
        })
    }
}
