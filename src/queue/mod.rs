// Queue management module
// This module handles the persisted play queue and now-playing pointer

pub mod repository;
pub mod state;

pub use repository::{QueueRepository, QueueSnapshot, QueueState};
pub use state::{NowPlayingChange, QueueList};
