// Track list screen for one media group
use tokio::sync::watch;

use super::{TaskScope, ViewState};
use crate::db::models::{MediaGroup, Track};
use crate::error::Result;
use crate::library::repository::sort_scope;
use crate::library::LibraryRepository;
use crate::playback::manager::PlaybackManager;
use crate::settings::preferences::{SortOption, SortPreference, SortPreferences};

pub struct TrackListViewModel {
    group: MediaGroup,
    manager: PlaybackManager,
    prefs: SortPreferences,
    state: watch::Receiver<ViewState<Vec<Track>>>,
    _tasks: TaskScope,
}

impl TrackListViewModel {
    pub fn new(
        library: &LibraryRepository,
        prefs: SortPreferences,
        manager: PlaybackManager,
        group: MediaGroup,
    ) -> Self {
        let live = library.tracks(group);
        let mut tracks_rx = live.receiver();
        let (tx, state) = watch::channel(ViewState::Loading);

        let mut tasks = TaskScope::new();
        tasks.spawn(async move {
            let _live = live;
            loop {
                let view = ViewState::from_list(tracks_rx.borrow_and_update().clone());
                tx.send_replace(view);
                tokio::select! {
                    changed = tracks_rx.changed() => if changed.is_err() { return },
                    _ = tx.closed() => return,
                }
            }
        });

        Self {
            group,
            manager,
            prefs,
            state,
            _tasks: tasks,
        }
    }

    pub fn group(&self) -> MediaGroup {
        self.group
    }

    pub fn state(&self) -> watch::Receiver<ViewState<Vec<Track>>> {
        self.state.clone()
    }

    pub fn current(&self) -> ViewState<Vec<Track>> {
        self.state.borrow().clone()
    }

    /// Current ordering, `None` for groups with a fixed order (albums, artists)
    pub fn sort_preference(&self) -> Option<SortPreference> {
        sort_scope(self.group).map(|scope| self.prefs.get(scope))
    }

    /// Replace the queue with this list, starting at `index`
    pub async fn play(&self, index: usize) -> Result<()> {
        self.manager.play_media(self.group, index).await
    }

    pub async fn shuffle(&self) -> Result<()> {
        self.manager.shuffle_media(self.group).await
    }

    /// Sort by `option`, keeping the direction. Returns false when the list
    /// cannot be sorted that way.
    pub async fn set_sort_option(&self, option: SortOption) -> Result<bool> {
        let Some(scope) = sort_scope(self.group) else {
            return Ok(false);
        };
        if !scope.supports(option) {
            log::debug!("{:?} cannot be sorted by {:?}", scope, option);
            return Ok(false);
        }
        self.prefs
            .update(scope, |current| SortPreference::new(option, current.order))
            .await?;
        Ok(true)
    }

    pub async fn toggle_order(&self) -> Result<Option<SortPreference>> {
        match sort_scope(self.group) {
            Some(scope) => Ok(Some(self.prefs.toggle_order(scope).await?)),
            None => Ok(None),
        }
    }
}
