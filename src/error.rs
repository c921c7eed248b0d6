// Crate-wide error type
use thiserror::Error;

/// Errors surfaced by the library, queue and playback layers
#[derive(Debug, Error)]
pub enum Error {
    /// A track, album, artist, genre or playlist id did not resolve
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: i64 },

    /// A queue position outside the current queue was passed in
    #[error("queue index {index} out of range for queue of length {len}")]
    InvalidQueueIndex { index: usize, len: usize },

    #[error("playlist '{0}' already exists")]
    DuplicatePlaylist(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The media session rejected a command
    #[error("playback error: {0}")]
    Playback(String),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl Error {
    pub(crate) fn not_found(kind: &'static str, id: i64) -> Self {
        Error::NotFound { kind, id }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}

// Scanning and migration code speaks anyhow, like the metadata layer
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<rusqlite::Error>() {
            Ok(db) => Error::Database(db),
            Err(other) => match other.downcast::<std::io::Error>() {
                Ok(io) => Error::Io(io),
                Err(other) => Error::Io(std::io::Error::other(other.to_string())),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
