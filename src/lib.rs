// Cadenza - local music library, playback queue and now-playing core
// Module declarations
pub mod db;
pub mod error;
pub mod library;
pub mod metadata;
pub mod playback;
pub mod queue;
pub mod settings;
pub mod state;
pub mod view;

pub use db::models::{
    Album, Artist, ArtistCredit, Genre, MediaGroup, NowPlayingInfo, Playlist, QueueEntry,
    QueuedTrack, Track,
};
pub use error::{Error, Result};
pub use state::AppState;

/// Initialise the `env_logger` backend.
///
/// `RUST_LOG` wins when set; otherwise `default_level` (usually
/// `AppSettings::log_level`) is used. Safe to call more than once.
pub fn init_logging(default_level: &str) {
    let env = env_logger::Env::default().default_filter_or(default_level);
    if env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .try_init()
        .is_err()
    {
        log::debug!("Logger already initialised");
    }
}
