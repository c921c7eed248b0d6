// Sort preferences per list scope, persisted as JSON and published to live queries
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

use crate::error::Result;

/// A list whose order the user can choose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortScope {
    AllTracks,
    Genre(i64),
    Playlist(i64),
    Albums,
    Artists,
    Genres,
    Playlists,
}

impl SortScope {
    /// Key in the preferences file, e.g. `genre:7`
    pub fn key(&self) -> String {
        match self {
            SortScope::AllTracks => "all_tracks".to_string(),
            SortScope::Genre(id) => format!("genre:{id}"),
            SortScope::Playlist(id) => format!("playlist:{id}"),
            SortScope::Albums => "albums".to_string(),
            SortScope::Artists => "artists".to_string(),
            SortScope::Genres => "genres".to_string(),
            SortScope::Playlists => "playlists".to_string(),
        }
    }

    fn default_option(&self) -> SortOption {
        match self {
            SortScope::Playlist(_) => SortOption::Custom,
            _ => SortOption::Name,
        }
    }

    /// Whether `option` orders anything in this scope
    pub fn supports(&self, option: SortOption) -> bool {
        use SortOption::*;
        match self {
            SortScope::AllTracks | SortScope::Genre(_) => {
                matches!(option, Name | ArtistName | AlbumName | Year | DateAdded)
            }
            SortScope::Playlist(_) => {
                matches!(option, Custom | Name | ArtistName | AlbumName | Year | DateAdded)
            }
            SortScope::Albums => matches!(option, Name | ArtistName | Year | TrackCount),
            SortScope::Artists | SortScope::Genres => matches!(option, Name | TrackCount),
            SortScope::Playlists => matches!(option, Name | DateAdded | TrackCount),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOption {
    Name,
    ArtistName,
    AlbumName,
    Year,
    DateAdded,
    TrackCount,
    /// Playlist order as arranged by the user
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

impl SortOrder {
    pub fn toggled(self) -> Self {
        match self {
            SortOrder::Ascending => SortOrder::Descending,
            SortOrder::Descending => SortOrder::Ascending,
        }
    }

    pub(crate) fn sql(self) -> &'static str {
        match self {
            SortOrder::Ascending => "ASC",
            SortOrder::Descending => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortPreference {
    pub option: SortOption,
    #[serde(default)]
    pub order: SortOrder,
}

impl SortPreference {
    pub fn new(option: SortOption, order: SortOrder) -> Self {
        Self { option, order }
    }
}

/// Every stored preference; unset scopes read as their default
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SortPreferenceMap(BTreeMap<String, SortPreference>);

impl SortPreferenceMap {
    /// Effective preference for `scope`; options the scope cannot sort by fall back
    /// to its default while keeping the direction
    pub fn get(&self, scope: SortScope) -> SortPreference {
        match self.0.get(&scope.key()) {
            Some(pref) if scope.supports(pref.option) => *pref,
            Some(pref) => SortPreference::new(scope.default_option(), pref.order),
            None => SortPreference::new(scope.default_option(), SortOrder::Ascending),
        }
    }

    fn insert(&mut self, scope: SortScope, pref: SortPreference) {
        self.0.insert(scope.key(), pref);
    }
}

/// File-backed preference store.
///
/// Reads are push-based through [`observe`](Self::observe); writes persist the
/// whole map before publishing it.
#[derive(Clone)]
pub struct SortPreferences {
    path: Option<PathBuf>,
    tx: Arc<watch::Sender<SortPreferenceMap>>,
    write_lock: Arc<Mutex<()>>,
}

impl SortPreferences {
    pub fn get_preferences_path(app_dir: &Path) -> PathBuf {
        app_dir.join("sort_preferences.json")
    }

    /// Load from the app directory; a missing or unreadable file yields defaults
    pub fn load(app_dir: &Path) -> Self {
        let path = Self::get_preferences_path(app_dir);
        let map = match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(map) => map,
                Err(e) => {
                    log::warn!("[Preferences] Ignoring unreadable {:?}: {}", path, e);
                    SortPreferenceMap::default()
                }
            },
            Err(_) => SortPreferenceMap::default(),
        };
        Self::with_map(Some(path), map)
    }

    /// Preferences that are never written to disk
    pub fn in_memory() -> Self {
        Self::with_map(None, SortPreferenceMap::default())
    }

    fn with_map(path: Option<PathBuf>, map: SortPreferenceMap) -> Self {
        let (tx, _) = watch::channel(map);
        Self {
            path,
            tx: Arc::new(tx),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn observe(&self) -> watch::Receiver<SortPreferenceMap> {
        self.tx.subscribe()
    }

    pub fn get(&self, scope: SortScope) -> SortPreference {
        self.tx.borrow().get(scope)
    }

    /// Store the preference for `scope` wholesale
    pub async fn set(&self, scope: SortScope, pref: SortPreference) -> Result<()> {
        self.update(scope, |_| pref).await.map(|_| ())
    }

    /// Flip ascending/descending for `scope`, keeping the option
    pub async fn toggle_order(&self, scope: SortScope) -> Result<SortPreference> {
        self.update(scope, |current| {
            SortPreference::new(current.option, current.order.toggled())
        })
        .await
    }

    /// Replace the preference for `scope` with `f(current)`.
    ///
    /// Updates are serialized: `f` always sees the result of the previous one.
    pub async fn update(
        &self,
        scope: SortScope,
        f: impl FnOnce(SortPreference) -> SortPreference,
    ) -> Result<SortPreference> {
        let _guard = self.write_lock.lock().await;
        let mut map = self.tx.borrow().clone();
        let pref = f(map.get(scope));
        map.insert(scope, pref);

        if let Some(path) = self.path.clone() {
            let content = serde_json::to_string_pretty(&map)?;
            tokio::task::spawn_blocking(move || -> Result<()> {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(&path, content)?;
                Ok(())
            })
            .await??;
        }

        log::debug!("[Preferences] {} -> {:?}", scope.key(), pref);
        self.tx.send_replace(map);
        Ok(pref)
    }
}
