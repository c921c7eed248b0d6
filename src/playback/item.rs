// Values exchanged with the media session
use serde::{Deserialize, Serialize};

use crate::db::models::{QueuedTrack, Track};

/// A track in the form the media session plays it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayableItem {
    /// Identity within the queue; repeated tracks get distinct ids
    pub queue_item_id: i64,
    pub track_id: i64,
    pub file_path: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    /// Album id, for looking up cover art
    pub album_id: i64,
    pub duration_ms: Option<u64>,
}

impl PlayableItem {
    pub fn new(track: &Track, queue_item_id: i64) -> Self {
        Self {
            queue_item_id,
            track_id: track.id,
            file_path: track.file_path.clone(),
            title: track.name.clone(),
            artist: track.artist_line(),
            album: track.album_name.clone(),
            album_id: track.album_id,
            duration_ms: track.duration_ms.and_then(|ms| u64::try_from(ms).ok()),
        }
    }
}

impl From<&QueuedTrack> for PlayableItem {
    fn from(queued: &QueuedTrack) -> Self {
        Self::new(&queued.track, queued.queue_item_id)
    }
}

/// What the transport is doing right now
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum PlaybackState {
    #[default]
    NotPlaying,
    Playing {
        item: PlayableItem,
        /// False while paused
        is_playing: bool,
        duration_ms: Option<u64>,
        elapsed_ms: u64,
    },
}

impl PlaybackState {
    pub fn item(&self) -> Option<&PlayableItem> {
        match self {
            PlaybackState::NotPlaying => None,
            PlaybackState::Playing { item, .. } => Some(item),
        }
    }

    pub fn is_playing(&self) -> bool {
        matches!(self, PlaybackState::Playing { is_playing: true, .. })
    }
}

/// Notifications a session publishes so the persisted queue can follow it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Items were replaced, added, moved or removed
    QueueChanged,
    /// A different item (or nothing) is now playing
    NowPlayingChanged {
        index: Option<usize>,
        position_ms: u64,
    },
    /// Transport offset worth persisting (pause, seek)
    PositionChanged { position_ms: u64 },
}
