// In-process media session: live queue mirror plus a modelled transport clock
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};

use super::controller::PlaybackController;
use super::item::{PlayableItem, PlaybackState, SessionEvent};
use crate::error::Result;
use crate::queue::state::{NowPlayingChange, QueueList};

/// `prev` restarts the current item instead of going back once past this offset
const RESTART_THRESHOLD_MS: u64 = 3_000;

const EVENT_CAPACITY: usize = 64;

#[derive(Default)]
struct SessionInner {
    connected: bool,
    queue: QueueList<PlayableItem>,
    is_playing: bool,
    position_ms: u64,
}

impl SessionInner {
    fn snapshot(&self) -> PlaybackState {
        match self.queue.current() {
            Some(item) => PlaybackState::Playing {
                item: item.clone(),
                is_playing: self.is_playing,
                duration_ms: item.duration_ms,
                elapsed_ms: self.position_ms,
            },
            None => PlaybackState::NotPlaying,
        }
    }

    fn start(&mut self, index: usize) -> Result<()> {
        self.queue.play(index)?;
        self.position_ms = 0;
        self.is_playing = true;
        Ok(())
    }

    fn now_playing_event(&self) -> SessionEvent {
        SessionEvent::NowPlayingChanged {
            index: self.queue.now_playing(),
            position_ms: self.position_ms,
        }
    }
}

/// Default [`PlaybackController`]: keeps the live queue in memory and advances
/// through it as [`advance_clock`](Self::advance_clock) reports elapsed time.
///
/// Hosts with a real audio backend drive the clock from their output stream.
pub struct LocalMediaSession {
    inner: Mutex<SessionInner>,
    state_tx: watch::Sender<PlaybackState>,
    events_tx: broadcast::Sender<SessionEvent>,
}

impl Default for LocalMediaSession {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalMediaSession {
    /// A session that starts disconnected
    pub fn new() -> Self {
        let (state_tx, _) = watch::channel(PlaybackState::NotPlaying);
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Mutex::new(SessionInner::default()),
            state_tx,
            events_tx,
        }
    }

    /// A session that is already bound
    pub fn connected() -> Self {
        let session = Self::new();
        session.connect();
        session
    }

    pub fn connect(&self) {
        self.inner.lock().connected = true;
        log::info!("[Session] Connected");
    }

    /// Unbind the session; the live queue is dropped
    pub fn disconnect(&self) {
        let mut inner = self.inner.lock();
        *inner = SessionInner::default();
        drop(inner);
        log::info!("[Session] Disconnected");
        self.state_tx.send_replace(PlaybackState::NotPlaying);
    }

    /// Apply `f` when connected, then publish the new state and `f`'s events
    fn command<T: Default>(
        &self,
        f: impl FnOnce(&mut SessionInner) -> Result<(T, Vec<SessionEvent>)>,
    ) -> Result<T> {
        let mut inner = self.inner.lock();
        if !inner.connected {
            log::debug!("[Session] Ignoring command while disconnected");
            return Ok(T::default());
        }
        let (value, events) = f(&mut inner)?;
        let state = inner.snapshot();
        drop(inner);

        self.state_tx.send_replace(state);
        for event in events {
            // No subscribers is fine
            let _ = self.events_tx.send(event);
        }
        Ok(value)
    }

    /// Let `elapsed_ms` of playback pass, moving to the next item at track end
    pub fn advance_clock(&self, elapsed_ms: u64) -> Result<()> {
        self.command(|inner| {
            if !inner.is_playing {
                return Ok(((), Vec::new()));
            }
            let mut events = Vec::new();
            let mut remaining = elapsed_ms;
            loop {
                let Some(duration) = inner.queue.current().and_then(|item| item.duration_ms) else {
                    inner.position_ms += remaining;
                    break;
                };
                let left = duration.saturating_sub(inner.position_ms);
                if remaining < left {
                    inner.position_ms += remaining;
                    break;
                }
                remaining -= left;

                let next = inner
                    .queue
                    .now_playing()
                    .map(|i| i + 1)
                    .filter(|&i| i < inner.queue.len());
                match next {
                    Some(next) => {
                        inner.start(next)?;
                        events.push(inner.now_playing_event());
                    }
                    None => {
                        // End of queue: stay on the last item, paused at its end
                        inner.position_ms = duration;
                        inner.is_playing = false;
                        events.push(SessionEvent::PositionChanged {
                            position_ms: duration,
                        });
                        break;
                    }
                }
            }
            Ok(((), events))
        })
    }
}

#[async_trait]
impl PlaybackController for LocalMediaSession {
    fn is_connected(&self) -> bool {
        self.inner.lock().connected
    }

    async fn play(
        &self,
        items: Vec<PlayableItem>,
        start_index: usize,
        start_position_ms: u64,
        play_when_ready: bool,
    ) -> Result<()> {
        self.command(|inner| {
            let mut queue = QueueList::new(items, None);
            if !queue.is_empty() {
                queue.play(start_index)?;
            }
            inner.queue = queue;
            inner.position_ms = if inner.queue.is_empty() { 0 } else { start_position_ms };
            inner.is_playing = play_when_ready && !inner.queue.is_empty();
            log::debug!(
                "[Session] Playing {} items from {}",
                inner.queue.len(),
                start_index
            );
            Ok(((), vec![SessionEvent::QueueChanged, inner.now_playing_event()]))
        })
    }

    async fn toggle_play(&self) -> Result<()> {
        self.command(|inner| {
            if inner.queue.current().is_none() {
                return Ok(((), Vec::new()));
            }
            inner.is_playing = !inner.is_playing;
            let events = if inner.is_playing {
                Vec::new()
            } else {
                vec![SessionEvent::PositionChanged {
                    position_ms: inner.position_ms,
                }]
            };
            Ok(((), events))
        })
    }

    async fn next(&self) -> Result<()> {
        self.command(|inner| {
            let next = inner
                .queue
                .now_playing()
                .map(|i| i + 1)
                .filter(|&i| i < inner.queue.len());
            match next {
                Some(next) => {
                    inner.start(next)?;
                    Ok(((), vec![inner.now_playing_event()]))
                }
                None => Ok(((), Vec::new())),
            }
        })
    }

    async fn prev(&self) -> Result<()> {
        self.command(|inner| {
            let Some(current) = inner.queue.now_playing() else {
                return Ok(((), Vec::new()));
            };
            if current == 0 || inner.position_ms > RESTART_THRESHOLD_MS {
                inner.position_ms = 0;
                return Ok(((), vec![SessionEvent::PositionChanged { position_ms: 0 }]));
            }
            inner.start(current - 1)?;
            Ok(((), vec![inner.now_playing_event()]))
        })
    }

    async fn seek_to(&self, position_ms: u64) -> Result<()> {
        self.command(|inner| {
            let Some(item) = inner.queue.current() else {
                return Ok(((), Vec::new()));
            };
            let position_ms = item.duration_ms.map_or(position_ms, |d| position_ms.min(d));
            inner.position_ms = position_ms;
            Ok(((), vec![SessionEvent::PositionChanged { position_ms }]))
        })
    }

    async fn move_item(&self, from: usize, to: usize) -> Result<()> {
        self.command(|inner| {
            inner.queue.move_item(from, to)?;
            Ok(((), vec![SessionEvent::QueueChanged]))
        })
    }

    async fn remove_items(&self, positions: Vec<usize>) -> Result<()> {
        self.command(|inner| {
            match inner.queue.remove_positions(&positions)? {
                NowPlayingChange::Kept => {}
                NowPlayingChange::Replaced => inner.position_ms = 0,
                NowPlayingChange::Cleared => {
                    inner.position_ms = 0;
                    inner.is_playing = false;
                }
            }
            Ok(((), vec![SessionEvent::QueueChanged]))
        })
    }

    async fn play_item(&self, index: usize) -> Result<()> {
        self.command(|inner| {
            inner.start(index)?;
            Ok(((), vec![inner.now_playing_event()]))
        })
    }

    async fn add_items(&self, items: Vec<PlayableItem>) -> Result<()> {
        self.command(|inner| {
            if items.is_empty() {
                return Ok(((), Vec::new()));
            }
            for item in items {
                inner.queue.push(item);
            }
            Ok(((), vec![SessionEvent::QueueChanged]))
        })
    }

    fn items(&self) -> Vec<PlayableItem> {
        self.inner.lock().queue.items().to_vec()
    }

    fn current_index(&self) -> Option<usize> {
        self.inner.lock().queue.now_playing()
    }

    fn position_ms(&self) -> u64 {
        self.inner.lock().position_ms
    }

    fn state(&self) -> watch::Receiver<PlaybackState> {
        self.state_tx.subscribe()
    }

    fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn item(id: i64, duration_ms: u64) -> PlayableItem {
        PlayableItem {
            queue_item_id: id,
            track_id: id * 10,
            file_path: format!("/m/{id}.mp3"),
            title: format!("Track {id}"),
            artist: "Artist".to_string(),
            album: "Album".to_string(),
            album_id: 1,
            duration_ms: Some(duration_ms),
        }
    }

    fn three() -> Vec<PlayableItem> {
        vec![item(1, 10_000), item(2, 10_000), item(3, 10_000)]
    }

    fn drain(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    #[tokio::test]
    async fn test_disconnected_session_ignores_commands() {
        let session = LocalMediaSession::new();
        let mut events = session.events();

        session.play(three(), 0, 0, true).await.unwrap();
        session.next().await.unwrap();

        assert!(!session.is_connected());
        assert!(session.items().is_empty());
        assert_eq!(*session.state().borrow(), PlaybackState::NotPlaying);
        assert!(drain(&mut events).is_empty());
    }

    #[tokio::test]
    async fn test_play_publishes_state_and_events() {
        let session = LocalMediaSession::connected();
        let mut events = session.events();

        session.play(three(), 1, 2_500, true).await.unwrap();

        let state = session.state().borrow().clone();
        assert!(state.is_playing());
        assert_eq!(state.item().unwrap().queue_item_id, 2);
        assert_eq!(session.position_ms(), 2_500);
        assert_eq!(
            drain(&mut events),
            vec![
                SessionEvent::QueueChanged,
                SessionEvent::NowPlayingChanged {
                    index: Some(1),
                    position_ms: 2_500
                }
            ]
        );
    }

    #[tokio::test]
    async fn test_play_rejects_bad_start_index() {
        let session = LocalMediaSession::connected();
        let err = session.play(three(), 3, 0, true).await.unwrap_err();
        assert!(matches!(err, Error::InvalidQueueIndex { index: 3, len: 3 }));
        assert!(session.items().is_empty());
    }

    #[tokio::test]
    async fn test_transport_commands() {
        let session = LocalMediaSession::connected();
        session.play(three(), 0, 0, true).await.unwrap();

        session.next().await.unwrap();
        assert_eq!(session.current_index(), Some(1));

        session.seek_to(50_000).await.unwrap();
        assert_eq!(session.position_ms(), 10_000);

        // Past the threshold prev restarts the item
        session.seek_to(5_000).await.unwrap();
        session.prev().await.unwrap();
        assert_eq!(session.current_index(), Some(1));
        assert_eq!(session.position_ms(), 0);

        session.prev().await.unwrap();
        assert_eq!(session.current_index(), Some(0));

        session.toggle_play().await.unwrap();
        assert!(!session.state().borrow().is_playing());
    }

    #[tokio::test]
    async fn test_clock_advances_through_queue() {
        let session = LocalMediaSession::connected();
        let mut events = session.events();
        session.play(three(), 0, 0, true).await.unwrap();
        drain(&mut events);

        session.advance_clock(25_000).unwrap();
        assert_eq!(session.current_index(), Some(2));
        assert_eq!(session.position_ms(), 5_000);
        assert_eq!(drain(&mut events).len(), 2);

        session.advance_clock(60_000).unwrap();
        assert_eq!(session.current_index(), Some(2));
        assert!(!session.state().borrow().is_playing());
        assert_eq!(
            drain(&mut events),
            vec![SessionEvent::PositionChanged { position_ms: 10_000 }]
        );
    }

    #[tokio::test]
    async fn test_queue_edits_follow_removal_rule() {
        let session = LocalMediaSession::connected();
        session
            .play(vec![item(1, 1), item(2, 1), item(3, 1), item(4, 1)], 1, 0, true)
            .await
            .unwrap();

        session.remove_items(vec![1, 2]).await.unwrap();
        let ids: Vec<i64> = session.items().iter().map(|i| i.queue_item_id).collect();
        assert_eq!(ids, vec![1, 4]);
        assert_eq!(session.current_index(), Some(1));

        session.add_items(vec![item(5, 1)]).await.unwrap();
        session.move_item(2, 0).await.unwrap();
        assert_eq!(session.items()[0].queue_item_id, 5);
        assert_eq!(session.current_index(), Some(2));

        session.remove_items(vec![0, 1, 2]).await.unwrap();
        assert_eq!(*session.state().borrow(), PlaybackState::NotPlaying);
    }

    #[tokio::test]
    async fn test_disconnect_drops_queue() {
        let session = LocalMediaSession::connected();
        session.play(three(), 0, 0, true).await.unwrap();
        session.disconnect();
        assert!(session.items().is_empty());
        assert_eq!(*session.state().borrow(), PlaybackState::NotPlaying);
    }
}
