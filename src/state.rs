// Application state management
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::db::connection::DatabaseConnection;
use crate::error::Result;
use crate::library::{scan_library, IndexingProgress, IndexingResult, LibraryRepository};
use crate::playback::{PlaybackController, PlaybackManager, QueueSync};
use crate::queue::QueueRepository;
use crate::settings::{AppSettings, SortPreferences};
use crate::view::{QueueViewModel, TrackListViewModel};
use crate::MediaGroup;

/// Every long-lived service, built once and handed to consumers by reference.
///
/// Call [`shutdown`](Self::shutdown) before exiting so the last session events
/// reach the database; dropping the state stops the queue sync at once.
pub struct AppState {
    pub app_dir: PathBuf,
    pub settings: AppSettings,
    pub db: DatabaseConnection,
    pub preferences: SortPreferences,
    pub library: LibraryRepository,
    pub queue: QueueRepository,
    pub playback: PlaybackManager,
    queue_sync: QueueSync,
}

impl AppState {
    /// Open (or create) everything under `app_dir` and bind `controller`.
    ///
    /// Must be called inside a tokio runtime.
    pub async fn initialize(
        app_dir: impl AsRef<Path>,
        controller: Arc<dyn PlaybackController>,
    ) -> Result<Self> {
        let app_dir = app_dir.as_ref().to_path_buf();
        let settings = AppSettings::load(&app_dir)?;

        let db = DatabaseConnection::new(settings.database_path(&app_dir))?;
        let preferences = SortPreferences::load(&app_dir);
        let library = LibraryRepository::new(db.clone(), preferences.clone());
        let queue = QueueRepository::new(db.clone())?;
        let playback = PlaybackManager::new(controller.clone(), library.clone(), queue.clone());

        let interval = Duration::from_millis(settings.playback.persist_position_interval_ms);
        let queue_sync = QueueSync::spawn(controller, queue.clone(), Some(interval));

        if settings.playback.resume_on_start && playback.restore().await? {
            log::info!("Resumed previous queue");
        }

        Ok(Self {
            app_dir,
            settings,
            db,
            preferences,
            library,
            queue,
            playback,
            queue_sync,
        })
    }

    /// Persist every pending session event, then stop the queue sync
    pub async fn shutdown(self) {
        self.queue_sync.shutdown().await;
        log::info!("Queue sync stopped");
    }

    /// Sync the library with the configured music directories
    pub async fn scan_library<F>(&self, progress: F) -> Result<IndexingResult>
    where
        F: Fn(IndexingProgress) + Send + Sync + 'static,
    {
        scan_library(&self.db, self.settings.library.clone(), progress).await
    }

    pub fn queue_view(&self) -> QueueViewModel {
        QueueViewModel::new(&self.queue, self.playback.clone())
    }

    pub fn track_list_view(&self, group: MediaGroup) -> TrackListViewModel {
        TrackListViewModel::new(
            &self.library,
            self.preferences.clone(),
            self.playback.clone(),
            group,
        )
    }
}
