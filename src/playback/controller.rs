// Contract of the platform media session that renders audio
use async_trait::async_trait;
use tokio::sync::{broadcast, watch};

use super::item::{PlayableItem, PlaybackState, SessionEvent};
use crate::error::Result;

/// A media session holding the live queue.
///
/// While not connected every command is accepted and ignored. Index arguments
/// refer to positions in [`items`](Self::items); out-of-range indices fail with
/// [`Error::InvalidQueueIndex`](crate::Error::InvalidQueueIndex).
#[async_trait]
pub trait PlaybackController: Send + Sync + 'static {
    fn is_connected(&self) -> bool;

    /// Replace the queue and start at `start_index`
    async fn play(
        &self,
        items: Vec<PlayableItem>,
        start_index: usize,
        start_position_ms: u64,
        play_when_ready: bool,
    ) -> Result<()>;

    async fn toggle_play(&self) -> Result<()>;

    async fn next(&self) -> Result<()>;

    async fn prev(&self) -> Result<()>;

    async fn seek_to(&self, position_ms: u64) -> Result<()>;

    async fn move_item(&self, from: usize, to: usize) -> Result<()>;

    async fn remove_items(&self, positions: Vec<usize>) -> Result<()>;

    async fn play_item(&self, index: usize) -> Result<()>;

    /// Append to the end of the queue
    async fn add_items(&self, items: Vec<PlayableItem>) -> Result<()>;

    fn items(&self) -> Vec<PlayableItem>;

    fn current_index(&self) -> Option<usize>;

    fn position_ms(&self) -> u64;

    fn state(&self) -> watch::Receiver<PlaybackState>;

    fn events(&self) -> broadcast::Receiver<SessionEvent>;
}
