// Mirrors the media session's live queue into the persisted queue
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};

use super::controller::PlaybackController;
use super::item::SessionEvent;
use crate::db::models::QueueEntry;
use crate::error::Result;
use crate::queue::QueueRepository;

/// Background task applying session events to the [`QueueRepository`].
///
/// Events are applied one at a time in the order the session published them.
/// A lagged receiver or a persisted queue that no longer lines up with the
/// session falls back to rewriting the whole queue from the session.
/// [`shutdown`](Self::shutdown) applies every event already published before
/// stopping; dropping the handle stops the task at once.
pub struct QueueSync {
    task: Option<JoinHandle<()>>,
    stop: Option<oneshot::Sender<()>>,
}

impl QueueSync {
    /// Start mirroring. With `position_interval` set, the offset of a playing item
    /// is also recorded on that period.
    pub fn spawn(
        controller: Arc<dyn PlaybackController>,
        queue: QueueRepository,
        position_interval: Option<Duration>,
    ) -> Self {
        // Subscribe before spawning so nothing published after this call is missed
        let mut events = controller.events();
        let mut ticker = position_interval
            .filter(|period| !period.is_zero())
            .map(|period| {
                let mut ticker = tokio::time::interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                ticker
            });
        let (stop, mut stopped) = oneshot::channel();

        let task = tokio::spawn(async move {
            let controller = controller.as_ref();
            let mut last_recorded: Option<u64> = None;
            loop {
                tokio::select! {
                    event = events.recv() => match event {
                        Ok(event) => {
                            handle(controller, &queue, event).await;
                            last_recorded = None;
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            lagged(controller, &queue, skipped).await;
                        }
                        Err(RecvError::Closed) => {
                            log::debug!("[QueueSync] Session closed");
                            return;
                        }
                    },
                    _ = &mut stopped => {
                        drain(controller, &queue, &mut events).await;
                        log::debug!("[QueueSync] Stopped");
                        return;
                    }
                    _ = tick(&mut ticker) => {
                        if !controller.state().borrow().is_playing() {
                            continue;
                        }
                        let position_ms = controller.position_ms();
                        if last_recorded == Some(position_ms) {
                            continue;
                        }
                        match queue.set_last_recorded_position(position_ms).await {
                            Ok(()) => last_recorded = Some(position_ms),
                            Err(e) => log::warn!("[QueueSync] Failed to record position: {}", e),
                        }
                    }
                }
            }
        });

        Self {
            task: Some(task),
            stop: Some(stop),
        }
    }

    /// Apply the events still waiting in the channel, then stop the task
    pub async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            // Err means the task already ended on its own
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                log::error!("[QueueSync] Task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for QueueSync {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn handle(
    controller: &dyn PlaybackController,
    queue: &QueueRepository,
    event: SessionEvent,
) {
    if let Err(e) = apply(controller, queue, event).await {
        log::warn!("[QueueSync] Failed to apply {:?}: {}", event, e);
    }
}

async fn lagged(controller: &dyn PlaybackController, queue: &QueueRepository, skipped: u64) {
    log::warn!("[QueueSync] Missed {} session events, resyncing", skipped);
    if let Err(e) = resync(controller, queue).await {
        log::error!("[QueueSync] Resync failed: {}", e);
    }
}

async fn drain(
    controller: &dyn PlaybackController,
    queue: &QueueRepository,
    events: &mut broadcast::Receiver<SessionEvent>,
) {
    loop {
        match events.try_recv() {
            Ok(event) => handle(controller, queue, event).await,
            Err(TryRecvError::Lagged(skipped)) => lagged(controller, queue, skipped).await,
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return,
        }
    }
}

async fn apply(
    controller: &dyn PlaybackController,
    queue: &QueueRepository,
    event: SessionEvent,
) -> Result<()> {
    match event {
        SessionEvent::QueueChanged => resync(controller, queue).await,
        SessionEvent::NowPlayingChanged {
            index: Some(index), ..
        } => {
            // A later event describes where the session is now
            if controller.current_index() != Some(index) {
                log::trace!("[QueueSync] Skipping stale now-playing change to {}", index);
                return Ok(());
            }
            // The live offset is never older than the one the event carried
            let position_ms = controller.position_ms();
            if let Err(e) = queue.record_now_playing(index, position_ms).await {
                log::debug!("[QueueSync] Persisted queue out of step ({}), resyncing", e);
                return resync(controller, queue).await;
            }
            Ok(())
        }
        SessionEvent::NowPlayingChanged { index: None, .. } => resync(controller, queue).await,
        SessionEvent::PositionChanged { position_ms } => {
            queue.set_last_recorded_position(position_ms).await
        }
    }
}

/// Rewrite the persisted queue from the session, keeping the recorded media group
async fn resync(controller: &dyn PlaybackController, queue: &QueueRepository) -> Result<()> {
    let entries: Vec<QueueEntry> = controller
        .items()
        .iter()
        .map(|item| QueueEntry::new(item.track_id, item.queue_item_id))
        .collect();
    let index = controller.current_index().filter(|&i| i < entries.len());
    queue
        .replace_entries_keep_group(index, controller.position_ms(), entries)
        .await
}
