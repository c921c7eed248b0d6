pub mod controller;
pub mod item;
pub mod manager;
pub mod session;
pub mod sync;

pub use controller::PlaybackController;
pub use item::{PlayableItem, PlaybackState, SessionEvent};
pub use manager::PlaybackManager;
pub use session::LocalMediaSession;
pub use sync::QueueSync;
