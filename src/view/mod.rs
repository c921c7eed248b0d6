// Screen-facing projections of the reactive repositories
use serde::Serialize;
use std::future::Future;
use tokio::task::JoinSet;

pub mod queue;
pub mod tracks;

pub use queue::{QueueScreen, QueueViewModel};
pub use tracks::TrackListViewModel;

/// What a screen renders
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub enum ViewState<T> {
    /// The first result has not arrived yet
    #[default]
    Loading,
    Empty,
    Data(T),
}

impl<T> ViewState<T> {
    pub fn data(&self) -> Option<&T> {
        match self {
            ViewState::Data(data) => Some(data),
            ViewState::Loading | ViewState::Empty => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, ViewState::Loading)
    }
}

impl<T> ViewState<Vec<T>> {
    /// `None` is still loading; an empty list renders as [`ViewState::Empty`]
    pub fn from_list(list: Option<Vec<T>>) -> Self {
        match list {
            None => ViewState::Loading,
            Some(list) if list.is_empty() => ViewState::Empty,
            Some(list) => ViewState::Data(list),
        }
    }
}

/// Tasks owned by one consumer. Dropping the scope (or calling
/// [`cancel`](Self::cancel)) aborts everything it spawned.
#[derive(Default)]
pub struct TaskScope {
    tasks: JoinSet<()>,
}

impl TaskScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn<F>(&mut self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks.spawn(task);
    }

    pub fn cancel(&mut self) {
        self.tasks.abort_all();
    }

    /// Number of tasks not yet reaped
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
