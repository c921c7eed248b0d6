// Playback façade: turns domain intents into media session commands
use rand::seq::SliceRandom;
use std::sync::Arc;
use tokio::sync::watch;

use super::controller::PlaybackController;
use super::item::{PlayableItem, PlaybackState};
use crate::db::models::{MediaGroup, NowPlayingInfo, QueueEntry, Track};
use crate::error::{Error, Result};
use crate::library::LibraryRepository;
use crate::queue::QueueRepository;

/// Entry point for everything that plays, pauses or edits the queue.
///
/// With a connected session commands go to the session and reach the database
/// through the queue sync; without one, queue edits go straight to the
/// [`QueueRepository`] and transport commands are ignored.
#[derive(Clone)]
pub struct PlaybackManager {
    controller: Arc<dyn PlaybackController>,
    library: LibraryRepository,
    queue: QueueRepository,
}

impl PlaybackManager {
    pub fn new(
        controller: Arc<dyn PlaybackController>,
        library: LibraryRepository,
        queue: QueueRepository,
    ) -> Self {
        Self {
            controller,
            library,
            queue,
        }
    }

    /// Replace the queue with the tracks of `group` and start at `initial_index`.
    ///
    /// An empty group leaves the queue untouched.
    pub async fn play_media(&self, group: MediaGroup, initial_index: usize) -> Result<()> {
        let tracks = self.library.track_list(group).await?;
        self.play_tracks(group, tracks, initial_index).await
    }

    /// Like [`play_media`](Self::play_media) in a random order, starting at the top
    pub async fn shuffle_media(&self, group: MediaGroup) -> Result<()> {
        let mut tracks = self.library.track_list(group).await?;
        tracks.shuffle(&mut rand::thread_rng());
        self.play_tracks(group, tracks, 0).await
    }

    async fn play_tracks(&self, group: MediaGroup, tracks: Vec<Track>, start: usize) -> Result<()> {
        if tracks.is_empty() {
            log::debug!("Nothing to play in {:?}", group);
            return Ok(());
        }
        if start >= tracks.len() {
            return Err(Error::InvalidQueueIndex {
                index: start,
                len: tracks.len(),
            });
        }

        let item_ids = self.queue.allocate_item_ids(tracks.len());
        let items: Vec<PlayableItem> = tracks
            .iter()
            .zip(item_ids)
            .map(|(track, id)| PlayableItem::new(track, id))
            .collect();
        let entries = items
            .iter()
            .map(|item| QueueEntry::new(item.track_id, item.queue_item_id))
            .collect();

        // Persist first so the group is on record whether or not a session is bound
        let info = NowPlayingInfo::playing(start).with_media_group(group);
        self.queue.save_queue(info, entries).await?;

        log::info!("Playing {:?}: {} tracks from {}", group, items.len(), start);
        self.controller.play(items, start, 0, true).await
    }

    pub async fn toggle_play(&self) -> Result<()> {
        self.controller.toggle_play().await
    }

    pub async fn next(&self) -> Result<()> {
        self.controller.next().await
    }

    pub async fn prev(&self) -> Result<()> {
        self.controller.prev().await
    }

    pub async fn seek_to_track_position(&self, position_ms: u64) -> Result<()> {
        self.controller.seek_to(position_ms).await
    }

    pub async fn move_queue_item(&self, from: usize, to: usize) -> Result<()> {
        if self.controller.is_connected() {
            self.controller.move_item(from, to).await
        } else {
            self.queue.move_queue_item(from, to).await
        }
    }

    pub async fn play_queue_item(&self, index: usize) -> Result<()> {
        if self.controller.is_connected() {
            self.controller.play_item(index).await
        } else {
            self.queue.play_queue_item(index).await
        }
    }

    pub async fn remove_items_from_queue(&self, positions: Vec<usize>) -> Result<()> {
        if self.controller.is_connected() {
            self.controller.remove_items(positions).await
        } else {
            self.queue.remove_items_from_queue(positions).await.map(|_| ())
        }
    }

    /// Append a track to the queue. An unknown track is a no-op: returns `false`.
    pub async fn add_to_queue(&self, track_id: i64) -> Result<bool> {
        if !self.controller.is_connected() {
            return match self.queue.add_to_queue(track_id).await {
                Ok(_) => Ok(true),
                Err(e) if e.is_not_found() => {
                    log::warn!("Not queueing unknown track {}", track_id);
                    Ok(false)
                }
                Err(e) => Err(e),
            };
        }

        let Some(track) = self.library.track(track_id).await? else {
            log::warn!("Not queueing unknown track {}", track_id);
            return Ok(false);
        };
        let item_id = self.queue.allocate_item_ids(1)[0];
        self.controller
            .add_items(vec![PlayableItem::new(&track, item_id)])
            .await?;
        Ok(true)
    }

    /// Continuously-updating transport state
    pub fn get_playback_state(&self) -> watch::Receiver<PlaybackState> {
        self.controller.state()
    }

    /// Load the persisted queue into a freshly connected, empty session, paused at
    /// the recorded offset. Returns whether anything was restored.
    pub async fn restore(&self) -> Result<bool> {
        if !self.controller.is_connected() || !self.controller.items().is_empty() {
            return Ok(false);
        }

        let snapshot = self.queue.queue_snapshot().await?;
        let Some(position) = snapshot.now_playing.position_in_queue else {
            return Ok(false);
        };
        if position >= snapshot.tracks.len() {
            log::warn!("Persisted now-playing position {} is out of range", position);
            return Ok(false);
        }

        let items: Vec<PlayableItem> = snapshot.tracks.iter().map(PlayableItem::from).collect();
        log::info!(
            "Restoring queue of {} items at {} ({} ms)",
            items.len(),
            position,
            snapshot.now_playing.last_recorded_position_ms
        );
        self.controller
            .play(
                items,
                position,
                snapshot.now_playing.last_recorded_position_ms,
                false,
            )
            .await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connection::DatabaseConnection;
    use crate::db::operations::test_support::{scanned, seed};
    use crate::playback::session::LocalMediaSession;
    use crate::settings::preferences::SortPreferences;

    struct Harness {
        session: Arc<LocalMediaSession>,
        queue: QueueRepository,
        manager: PlaybackManager,
        ids: Vec<i64>,
        album: i64,
    }

    fn harness(connected: bool) -> Harness {
        let db = DatabaseConnection::open_in_memory().unwrap();
        let ids = db
            .with_conn(|conn| {
                let mut one = scanned("/m/1.mp3", "One", &["A"], "Record");
                one.track_number = Some(1);
                let mut two = scanned("/m/2.mp3", "Two", &["A"], "Record");
                two.track_number = Some(2);
                let mut three = scanned("/m/3.mp3", "Three", &["A"], "Record");
                three.track_number = Some(3);
                Ok(seed(conn, &[one, two, three]))
            })
            .unwrap();
        let album = db
            .with_conn(|conn| Ok(conn.query_row("SELECT id FROM albums", [], |r| r.get(0))?))
            .unwrap();

        let session = Arc::new(if connected {
            LocalMediaSession::connected()
        } else {
            LocalMediaSession::new()
        });
        let queue = QueueRepository::new(db.clone()).unwrap();
        let library = LibraryRepository::new(db, SortPreferences::in_memory());
        let manager = PlaybackManager::new(session.clone(), library, queue.clone());
        Harness {
            session,
            queue,
            manager,
            ids,
            album,
        }
    }

    fn titles(items: &[PlayableItem]) -> Vec<&str> {
        items.iter().map(|i| i.title.as_str()).collect()
    }

    #[tokio::test]
    async fn test_play_media_fills_session_and_persists_group() {
        let h = harness(true);
        h.manager.play_media(MediaGroup::Album(h.album), 1).await.unwrap();

        assert_eq!(titles(&h.session.items()), vec!["One", "Two", "Three"]);
        assert_eq!(h.session.current_index(), Some(1));
        let state = h.manager.get_playback_state().borrow().clone();
        assert_eq!(state.item().unwrap().title, "Two");

        let snapshot = h.queue.queue_snapshot().await.unwrap();
        assert_eq!(snapshot.now_playing.media_group, Some(MediaGroup::Album(h.album)));
        assert_eq!(snapshot.now_playing.position_in_queue, Some(1));
        let persisted: Vec<i64> = snapshot.tracks.iter().map(|t| t.queue_item_id).collect();
        let live: Vec<i64> = h.session.items().iter().map(|i| i.queue_item_id).collect();
        assert_eq!(persisted, live);
    }

    #[tokio::test]
    async fn test_play_media_bad_index_changes_nothing() {
        let h = harness(true);
        let err = h.manager.play_media(MediaGroup::AllTracks, 3).await.unwrap_err();
        assert!(matches!(err, Error::InvalidQueueIndex { index: 3, len: 3 }));
        assert!(h.session.items().is_empty());
        assert!(h.queue.queue_snapshot().await.unwrap().tracks.is_empty());
    }

    #[tokio::test]
    async fn test_empty_group_is_a_no_op() {
        let h = harness(true);
        h.manager.play_media(MediaGroup::Playlist(77), 0).await.unwrap();
        assert!(h.session.items().is_empty());
    }

    #[tokio::test]
    async fn test_shuffle_keeps_every_track() {
        let h = harness(true);
        h.manager.shuffle_media(MediaGroup::AllTracks).await.unwrap();
        let mut shuffled = titles(&h.session.items())
            .into_iter()
            .map(String::from)
            .collect::<Vec<_>>();
        shuffled.sort();
        assert_eq!(shuffled, vec!["One", "Three", "Two"]);
        assert_eq!(h.session.current_index(), Some(0));
    }

    #[tokio::test]
    async fn test_add_to_queue_connected() {
        let h = harness(true);
        h.manager.play_media(MediaGroup::SingleTrack(h.ids[0]), 0).await.unwrap();

        assert!(h.manager.add_to_queue(h.ids[2]).await.unwrap());
        assert!(!h.manager.add_to_queue(12_345).await.unwrap());
        assert_eq!(titles(&h.session.items()), vec!["One", "Three"]);
        assert_eq!(h.session.current_index(), Some(0));
    }

    #[tokio::test]
    async fn test_disconnected_edits_go_to_repository() {
        let h = harness(false);
        h.manager.play_media(MediaGroup::Album(h.album), 0).await.unwrap();
        assert!(h.session.items().is_empty());

        h.manager.move_queue_item(2, 0).await.unwrap();
        h.manager.play_queue_item(2).await.unwrap();
        assert!(h.manager.add_to_queue(h.ids[0]).await.unwrap());
        assert!(!h.manager.add_to_queue(999).await.unwrap());
        h.manager.remove_items_from_queue(vec![0]).await.unwrap();
        h.manager.toggle_play().await.unwrap();

        let snapshot = h.queue.queue_snapshot().await.unwrap();
        let names: Vec<_> = snapshot.tracks.iter().map(|t| t.track.name.as_str()).collect();
        assert_eq!(names, vec!["One", "Two", "One"]);
        assert_eq!(snapshot.now_playing.position_in_queue, Some(1));
    }

    #[tokio::test]
    async fn test_restore_loads_paused_session() {
        let h = harness(false);
        h.manager.play_media(MediaGroup::Album(h.album), 2).await.unwrap();
        h.queue.set_last_recorded_position(4_200).await.unwrap();

        assert!(!h.manager.restore().await.unwrap());
        h.session.connect();
        assert!(h.manager.restore().await.unwrap());

        assert_eq!(h.session.current_index(), Some(2));
        assert_eq!(h.session.position_ms(), 4_200);
        assert!(!h.session.state().borrow().is_playing());
        // A session that already has a queue is left alone
        assert!(!h.manager.restore().await.unwrap());
    }
}
