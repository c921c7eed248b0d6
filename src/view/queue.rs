// Now playing screen: persisted queue joined with live transport state
use serde::Serialize;
use tokio::sync::watch;

use super::{TaskScope, ViewState};
use crate::db::models::{MediaGroup, QueuedTrack};
use crate::error::Result;
use crate::playback::item::PlaybackState;
use crate::playback::manager::PlaybackManager;
use crate::queue::{QueueRepository, QueueState};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueScreen {
    pub now_playing: QueuedTrack,
    pub upcoming: Vec<QueuedTrack>,
    pub is_playing: bool,
    /// Live offset when the session is on this item, else the recorded one
    pub elapsed_ms: u64,
    pub media_group: Option<MediaGroup>,
}

fn combine(queue: &Option<QueueState>, playback: &PlaybackState) -> ViewState<QueueScreen> {
    match queue {
        None => ViewState::Loading,
        Some(QueueState::Empty) => ViewState::Empty,
        Some(QueueState::Playing {
            now_playing,
            upcoming,
            last_recorded_position_ms,
            media_group,
        }) => {
            let live = match playback {
                PlaybackState::Playing {
                    item,
                    is_playing,
                    elapsed_ms,
                    ..
                } if item.queue_item_id == now_playing.queue_item_id => {
                    Some((*is_playing, *elapsed_ms))
                }
                _ => None,
            };
            let (is_playing, elapsed_ms) = live.unwrap_or((false, *last_recorded_position_ms));
            ViewState::Data(QueueScreen {
                now_playing: now_playing.clone(),
                upcoming: upcoming.clone(),
                is_playing,
                elapsed_ms,
                media_group: *media_group,
            })
        }
    }
}

/// State and actions of the now playing screen.
///
/// Queue positions passed to the actions are those of [`QueuedTrack::position`].
pub struct QueueViewModel {
    manager: PlaybackManager,
    state: watch::Receiver<ViewState<QueueScreen>>,
    _tasks: TaskScope,
}

impl QueueViewModel {
    pub fn new(queue: &QueueRepository, manager: PlaybackManager) -> Self {
        let live = queue.get_queue();
        let mut queue_rx = live.receiver();
        let mut playback_rx = manager.get_playback_state();
        let (tx, state) = watch::channel(ViewState::Loading);

        let mut tasks = TaskScope::new();
        tasks.spawn(async move {
            // The subscription lives as long as this task
            let _live = live;
            loop {
                let screen = combine(
                    &queue_rx.borrow_and_update(),
                    &playback_rx.borrow_and_update(),
                );
                tx.send_if_modified(|current| {
                    if *current == screen {
                        return false;
                    }
                    *current = screen;
                    true
                });

                tokio::select! {
                    changed = queue_rx.changed() => if changed.is_err() { return },
                    changed = playback_rx.changed() => if changed.is_err() { return },
                    _ = tx.closed() => return,
                }
            }
        });

        Self {
            manager,
            state,
            _tasks: tasks,
        }
    }

    pub fn state(&self) -> watch::Receiver<ViewState<QueueScreen>> {
        self.state.clone()
    }

    pub fn current(&self) -> ViewState<QueueScreen> {
        self.state.borrow().clone()
    }

    pub async fn play_item(&self, position: usize) -> Result<()> {
        self.manager.play_queue_item(position).await
    }

    pub async fn move_item(&self, from: usize, to: usize) -> Result<()> {
        self.manager.move_queue_item(from, to).await
    }

    pub async fn remove_items(&self, positions: Vec<usize>) -> Result<()> {
        self.manager.remove_items_from_queue(positions).await
    }

    pub async fn toggle_play(&self) -> Result<()> {
        self.manager.toggle_play().await
    }

    pub async fn next(&self) -> Result<()> {
        self.manager.next().await
    }

    pub async fn prev(&self) -> Result<()> {
        self.manager.prev().await
    }
}
