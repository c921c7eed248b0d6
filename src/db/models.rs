// Data models
use serde::{Deserialize, Serialize};

/// One credited artist of a track, in credit order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtistCredit {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: i64,
    pub name: String,
    pub artists: Vec<ArtistCredit>,
    pub album_id: i64,
    pub album_name: String,
    pub file_path: String,
    pub track_number: Option<i32>,
    pub disc_number: Option<i32>,
    pub year: Option<i32>,
    pub duration_ms: Option<i64>,
    pub date_added: i64,
}

impl Track {
    /// Artist names joined for display ("A, B")
    pub fn artist_line(&self) -> String {
        self.artists
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Album {
    pub id: i64,
    pub name: String,
    pub artist_name: String,
    pub year: Option<i32>,
    pub artwork_path: Option<String>,
    pub track_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artist {
    pub id: i64,
    pub name: String,
    pub track_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Genre {
    pub id: i64,
    pub name: String,
    pub track_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Playlist {
    pub id: i64,
    pub name: String,
    pub date_created: i64,
    pub track_count: i64,
}

/// A track at a given position of the play queue.
///
/// `queue_item_id` tells apart repeated plays of the same track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedTrack {
    pub track: Track,
    pub position: usize,
    pub queue_item_id: i64,
}

/// The persisted shape of one queue row, minus its position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub track_id: i64,
    pub queue_item_id: i64,
}

impl QueueEntry {
    pub fn new(track_id: i64, queue_item_id: i64) -> Self {
        Self {
            track_id,
            queue_item_id,
        }
    }
}

impl From<&QueuedTrack> for QueueEntry {
    fn from(queued: &QueuedTrack) -> Self {
        Self::new(queued.track.id, queued.queue_item_id)
    }
}

/// What a track list or queue was built from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum MediaGroup {
    AllTracks,
    SingleTrack(i64),
    Artist(i64),
    Album(i64),
    Genre(i64),
    Playlist(i64),
}

/// Pointer into the queue plus the last known transport offset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NowPlayingInfo {
    /// `None` is persisted as -1 and means nothing is playing
    pub position_in_queue: Option<usize>,
    pub last_recorded_position_ms: u64,
    pub media_group: Option<MediaGroup>,
}

impl NowPlayingInfo {
    pub const NOTHING_PLAYING: i64 = -1;

    pub fn playing(position_in_queue: usize) -> Self {
        Self {
            position_in_queue: Some(position_in_queue),
            last_recorded_position_ms: 0,
            media_group: None,
        }
    }

    pub fn with_position_ms(mut self, position_ms: u64) -> Self {
        self.last_recorded_position_ms = position_ms;
        self
    }

    pub fn with_media_group(mut self, group: MediaGroup) -> Self {
        self.media_group = Some(group);
        self
    }

    pub(crate) fn position_to_sql(&self) -> i64 {
        self.position_in_queue
            .map(|p| p as i64)
            .unwrap_or(Self::NOTHING_PLAYING)
    }

    pub(crate) fn position_from_sql(raw: i64) -> Option<usize> {
        usize::try_from(raw).ok()
    }
}

/// Search hits across every entity type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    pub tracks: Vec<Track>,
    pub artists: Vec<Artist>,
    pub albums: Vec<Album>,
    pub genres: Vec<Genre>,
    pub playlists: Vec<Playlist>,
}

impl SearchResults {
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
            && self.artists.is_empty()
            && self.albums.is_empty()
            && self.genres.is_empty()
            && self.playlists.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_playing_sentinel() {
        assert_eq!(NowPlayingInfo::default().position_to_sql(), -1);
        assert_eq!(NowPlayingInfo::position_from_sql(-1), None);
        assert_eq!(NowPlayingInfo::position_from_sql(3), Some(3));
        assert_eq!(NowPlayingInfo::playing(2).position_to_sql(), 2);
    }

    #[test]
    fn test_media_group_json_shape() {
        let json = serde_json::to_string(&MediaGroup::Genre(7)).unwrap();
        assert_eq!(json, r#"{"kind":"genre","id":7}"#);
        let all: MediaGroup = serde_json::from_str(r#"{"kind":"all_tracks"}"#).unwrap();
        assert_eq!(all, MediaGroup::AllTracks);
    }
}
