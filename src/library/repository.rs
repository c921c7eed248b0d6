// Reactive browsing, search and playlist editing over the indexed library
use std::path::PathBuf;

use crate::db::connection::{DatabaseConnection, Table};
use crate::db::live::LiveQuery;
use crate::db::models::{Album, Artist, Genre, MediaGroup, Playlist, SearchResults, Track};
use crate::db::operations::DbOperations;
use crate::error::{Error, Result};
use crate::metadata::extractor::read_artwork;
use crate::settings::preferences::{SortPreferences, SortScope};

const TRACK_TABLES: &[Table] = &[
    Table::Tracks,
    Table::Albums,
    Table::Artists,
    Table::Genres,
    Table::Playlists,
];

/// The sort scope governing a media group's track list, if the user can sort it
pub fn sort_scope(group: MediaGroup) -> Option<SortScope> {
    match group {
        MediaGroup::AllTracks => Some(SortScope::AllTracks),
        MediaGroup::Genre(id) => Some(SortScope::Genre(id)),
        MediaGroup::Playlist(id) => Some(SortScope::Playlist(id)),
        MediaGroup::SingleTrack(_) | MediaGroup::Artist(_) | MediaGroup::Album(_) => None,
    }
}

#[derive(Clone)]
pub struct LibraryRepository {
    db: DatabaseConnection,
    prefs: SortPreferences,
}

impl LibraryRepository {
    pub fn new(db: DatabaseConnection, prefs: SortPreferences) -> Self {
        Self { db, prefs }
    }

    /// Tracks of `group`, re-sorted whenever its preference changes
    pub fn tracks(&self, group: MediaGroup) -> LiveQuery<Vec<Track>> {
        let scope = sort_scope(group).unwrap_or(SortScope::AllTracks);
        self.db
            .observe_with(TRACK_TABLES, self.prefs.observe(), move |conn, prefs| {
                DbOperations::tracks_for_group(conn, group, prefs.get(scope))
            })
    }

    /// One-shot read of a group's tracks in the current sort order
    pub async fn track_list(&self, group: MediaGroup) -> Result<Vec<Track>> {
        let pref = self
            .prefs
            .get(sort_scope(group).unwrap_or(SortScope::AllTracks));
        self.db
            .read(move |conn| DbOperations::tracks_for_group(conn, group, pref))
            .await
    }

    pub async fn track(&self, track_id: i64) -> Result<Option<Track>> {
        self.db
            .read(move |conn| DbOperations::get_track(conn, track_id))
            .await
    }

    pub fn albums(&self) -> LiveQuery<Vec<Album>> {
        self.db.observe_with(TRACK_TABLES, self.prefs.observe(), |conn, prefs| {
            DbOperations::get_all_albums(conn, prefs.get(SortScope::Albums))
        })
    }

    pub fn artists(&self) -> LiveQuery<Vec<Artist>> {
        self.db.observe_with(TRACK_TABLES, self.prefs.observe(), |conn, prefs| {
            DbOperations::get_all_artists(conn, prefs.get(SortScope::Artists))
        })
    }

    pub fn genres(&self) -> LiveQuery<Vec<Genre>> {
        self.db.observe_with(TRACK_TABLES, self.prefs.observe(), |conn, prefs| {
            DbOperations::get_all_genres(conn, prefs.get(SortScope::Genres))
        })
    }

    pub fn playlists(&self) -> LiveQuery<Vec<Playlist>> {
        self.db
            .observe_with(&[Table::Playlists], self.prefs.observe(), |conn, prefs| {
                DbOperations::get_all_playlists(conn, prefs.get(SortScope::Playlists))
            })
    }

    /// Prefix search across tracks, artists, albums, genres and playlists
    pub fn search(&self, query: impl Into<String>) -> LiveQuery<SearchResults> {
        let query = query.into();
        self.db
            .observe(TRACK_TABLES, move |conn| DbOperations::search(conn, &query))
    }

    /// Embedded cover art of an album, read from the file recorded at index time
    pub async fn album_artwork(&self, album_id: i64) -> Result<Option<Vec<u8>>> {
        let artwork_path: Option<String> = self
            .db
            .read(move |conn| {
                let path = conn.query_row(
                    "SELECT artwork_path FROM albums WHERE id = ?1",
                    [album_id],
                    |row| row.get(0),
                );
                match path {
                    Ok(path) => Ok(path),
                    Err(rusqlite::Error::QueryReturnedNoRows) => {
                        Err(Error::not_found("album", album_id))
                    }
                    Err(e) => Err(e.into()),
                }
            })
            .await?;

        let Some(path) = artwork_path else {
            return Ok(None);
        };
        let bytes = tokio::task::spawn_blocking(move || read_artwork(&PathBuf::from(path))).await??;
        Ok(bytes)
    }

    // ===== Playlists =====

    pub async fn create_playlist(&self, name: impl Into<String>) -> Result<i64> {
        let name = name.into();
        self.db
            .run(&[Table::Playlists], move |conn| {
                DbOperations::create_playlist(conn, name.trim())
            })
            .await
    }

    pub async fn rename_playlist(&self, playlist_id: i64, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        self.db
            .run(&[Table::Playlists], move |conn| {
                DbOperations::rename_playlist(conn, playlist_id, name.trim())
            })
            .await
    }

    pub async fn delete_playlist(&self, playlist_id: i64) -> Result<()> {
        self.db
            .run(&[Table::Playlists], move |conn| {
                DbOperations::delete_playlist(conn, playlist_id)
            })
            .await
    }

    pub async fn add_to_playlist(&self, playlist_id: i64, track_id: i64) -> Result<()> {
        self.db
            .run(&[Table::Playlists], move |conn| {
                DbOperations::add_track_to_playlist(conn, playlist_id, track_id)
            })
            .await
    }

    /// Remove the entry at `position`; later entries move up
    pub async fn remove_from_playlist(&self, playlist_id: i64, position: usize) -> Result<()> {
        self.db
            .run(&[Table::Playlists], move |conn| {
                DbOperations::remove_from_playlist(conn, playlist_id, position)
            })
            .await
    }
}
