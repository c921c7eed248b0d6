use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// List of supported audio file extensions
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "mp3", "flac", "ogg", "wav", "m4a", "aac", "opus", "wma",
];

pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
}

/// Scanner for finding audio files in a directory tree
pub struct DirectoryScanner;

impl DirectoryScanner {
    /// Scan a directory recursively and return all audio file paths
    pub fn scan<P: AsRef<Path>>(directory: P, follow_links: bool) -> Vec<PathBuf> {
        WalkDir::new(directory)
            .follow_links(follow_links)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    log::warn!("[Scanner] Skipping unreadable entry: {}", e);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file() || entry.path().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| is_supported(path))
            .collect()
    }

    /// Scan every root, dropping files reachable from more than one of them
    pub fn scan_all(directories: &[PathBuf], follow_links: bool) -> Vec<PathBuf> {
        let mut files = BTreeSet::new();
        for directory in directories {
            if !directory.is_dir() {
                log::warn!("[Scanner] Music directory {:?} does not exist", directory);
                continue;
            }
            let found = Self::scan(directory, follow_links);
            log::debug!("[Scanner] {} audio files under {:?}", found.len(), directory);
            files.extend(found);
        }
        files.into_iter().collect()
    }
}
