// Settings module
// Application configuration and per-list sort preferences

pub mod preferences;
pub mod settings;

pub use preferences::{
    SortOption, SortOrder, SortPreference, SortPreferenceMap, SortPreferences, SortScope,
};
pub use settings::AppSettings;
