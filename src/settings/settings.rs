// Settings management and persistence
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Library location and scan behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LibrarySettings {
    pub music_dirs: Vec<PathBuf>,
    pub follow_links: bool,
    /// Files shorter than this are left out of the library (0 keeps everything)
    pub min_duration_ms: u64,
}

impl Default for LibrarySettings {
    fn default() -> Self {
        Self {
            music_dirs: Vec::new(),
            follow_links: true,
            min_duration_ms: 0,
        }
    }
}

/// Playback settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackSettings {
    /// Load the persisted queue into the session at startup
    pub resume_on_start: bool,
    pub persist_position_interval_ms: u64,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            resume_on_start: true,
            persist_position_interval_ms: 5_000,
        }
    }
}

/// Main application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub version: i32, // Settings schema version for future migrations
    pub log_level: String,
    /// Relative paths resolve against the app directory
    pub database_file: PathBuf,
    pub library: LibrarySettings,
    pub playback: PlaybackSettings,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            version: 1,
            log_level: "info".to_string(),
            database_file: PathBuf::from("library.db"),
            library: LibrarySettings::default(),
            playback: PlaybackSettings::default(),
        }
    }
}

impl AppSettings {
    /// Get the settings file path
    pub fn get_settings_path(app_dir: &Path) -> PathBuf {
        app_dir.join("settings.json")
    }

    pub fn database_path(&self, app_dir: &Path) -> PathBuf {
        if self.database_file.is_absolute() {
            self.database_file.clone()
        } else {
            app_dir.join(&self.database_file)
        }
    }

    /// Load settings from file, or return defaults if file doesn't exist
    pub fn load(app_dir: &Path) -> Result<Self> {
        let path = Self::get_settings_path(app_dir);

        if !path.exists() {
            log::info!("[Settings] No settings file found, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)?;
        let settings: AppSettings = serde_json::from_str(&content)?;

        log::info!("[Settings] Loaded settings from {:?}", path);
        Ok(settings)
    }

    /// Save settings to file
    pub fn save(&self, app_dir: &Path) -> Result<()> {
        // Ensure directory exists
        fs::create_dir_all(app_dir)?;

        let path = Self::get_settings_path(app_dir);
        let content = serde_json::to_string_pretty(self)?;
        fs::write(&path, content)?;

        log::debug!("[Settings] Saved settings to {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = AppSettings::load(dir.path()).unwrap();
        assert_eq!(settings, AppSettings::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = AppSettings::default();
        settings.library.music_dirs.push(PathBuf::from("/music"));
        settings.playback.resume_on_start = false;
        settings.save(dir.path()).unwrap();

        assert_eq!(AppSettings::load(dir.path()).unwrap(), settings);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            AppSettings::get_settings_path(dir.path()),
            r#"{"log_level":"debug","library":{"follow_links":false}}"#,
        )
        .unwrap();

        let settings = AppSettings::load(dir.path()).unwrap();
        assert_eq!(settings.log_level, "debug");
        assert!(!settings.library.follow_links);
        assert_eq!(settings.playback, PlaybackSettings::default());
        assert_eq!(settings.database_path(dir.path()), dir.path().join("library.db"));
    }
}
