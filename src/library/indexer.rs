use rayon::prelude::*;
use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use super::scanner::DirectoryScanner;
use crate::db::connection::{DatabaseConnection, Table};
use crate::db::operations::{DbOperations, IndexedFile};
use crate::error::Result;
use crate::metadata::extractor::{MetadataExtractor, ScannedTrack};
use crate::queue::repository::prune_missing;
use crate::settings::settings::LibrarySettings;

/// Tables a library sync rewrites
const LIBRARY_TABLES: &[Table] = &[
    Table::Tracks,
    Table::Artists,
    Table::Albums,
    Table::Genres,
    Table::Playlists,
    Table::Queue,
    Table::NowPlaying,
];

/// Result of an indexing operation
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct IndexingResult {
    pub total_files: usize,
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
    pub updated: usize,
    pub removed: usize,
    pub errors: Vec<String>,
}

/// Progress update for indexing
#[derive(Debug, Clone, serde::Serialize)]
pub struct IndexingProgress {
    pub current: usize,
    pub total: usize,
    pub current_file: String,
}

/// What to do with one discovered file
enum FileOutcome {
    Unchanged,
    /// Content is identical; only the stored mtime moves
    Touched { track_id: i64, date_modified: i64 },
    Extracted { track: ScannedTrack, file_hash: String },
    TooShort,
    Failed(String),
}

/// Library indexer for adding tracks to database
pub struct LibraryIndexer;

impl LibraryIndexer {
    /// Bring the database in line with the music directories.
    ///
    /// Tags are read in parallel; every write happens in a single transaction so
    /// readers see the library either before or after the sync.
    pub fn sync_library<F>(
        db: &DatabaseConnection,
        settings: &LibrarySettings,
        progress_callback: F,
    ) -> Result<IndexingResult>
    where
        F: Fn(IndexingProgress) + Sync,
    {
        let paths = DirectoryScanner::scan_all(&settings.music_dirs, settings.follow_links);
        let indexed = db.with_conn(|conn| DbOperations::indexed_files(conn))?;
        log::info!(
            "[Indexer] Syncing {} files against {} indexed tracks",
            paths.len(),
            indexed.len()
        );

        let total = paths.len();
        let done = AtomicUsize::new(0);
        let outcomes: Vec<(&PathBuf, FileOutcome)> = paths
            .par_iter()
            .map(|path| {
                let current = done.fetch_add(1, Ordering::Relaxed) + 1;
                progress_callback(IndexingProgress {
                    current,
                    total,
                    current_file: path
                        .file_name()
                        .and_then(|n| n.to_str())
                        .unwrap_or("unknown")
                        .to_string(),
                });
                let known = indexed.get(&*path.to_string_lossy());
                (path, Self::inspect_file(path, known, settings.min_duration_ms))
            })
            .collect();

        let found: HashSet<String> = paths
            .iter()
            .map(|p| p.to_string_lossy().to_string())
            .collect();

        let mut result = IndexingResult {
            total_files: total,
            ..Default::default()
        };
        let mut stale: Vec<i64> = indexed
            .iter()
            .filter(|(path, _)| !found.contains(path.as_str()))
            .filter(|(path, _)| !Self::still_in_library(Path::new(path), &settings.music_dirs))
            .map(|(_, file)| file.track_id)
            .collect();

        db.with_conn(|conn| {
            let tx = conn.transaction()?;

            for (path, outcome) in &outcomes {
                match outcome {
                    FileOutcome::Unchanged => {
                        result.successful += 1;
                        result.skipped += 1;
                    }
                    FileOutcome::Touched { track_id, date_modified } => {
                        tx.execute(
                            "UPDATE tracks SET date_modified = ?1 WHERE id = ?2",
                            rusqlite::params![date_modified, track_id],
                        )?;
                        result.successful += 1;
                        result.skipped += 1;
                    }
                    FileOutcome::Extracted { track, file_hash } => {
                        match DbOperations::upsert_scanned_track(&tx, track, file_hash) {
                            Ok(_) => {
                                result.successful += 1;
                                result.updated += 1;
                            }
                            Err(e) => {
                                log::warn!("[Indexer] Failed to index {}: {}", path.display(), e);
                                result.failed += 1;
                                result.errors.push(format!("{}: {}", path.display(), e));
                            }
                        }
                    }
                    FileOutcome::TooShort => {
                        result.skipped += 1;
                        if let Some(known) = indexed.get(&*path.to_string_lossy()) {
                            stale.push(known.track_id);
                        }
                    }
                    FileOutcome::Failed(error) => {
                        log::warn!("[Indexer] Failed to index {}: {}", path.display(), error);
                        result.failed += 1;
                        result.errors.push(format!("{}: {}", path.display(), error));
                    }
                }
            }

            result.removed = DbOperations::delete_tracks(&tx, &stale)?;
            if result.removed > 0 {
                let playlists: Vec<i64> = tx
                    .prepare("SELECT id FROM playlists")?
                    .query_map([], |row| row.get(0))?
                    .collect::<rusqlite::Result<_>>()?;
                for playlist_id in playlists {
                    DbOperations::renumber_playlist(&tx, playlist_id)?;
                }
            }
            DbOperations::remove_orphans(&tx)?;
            // Queue positions the UI holds stay valid: no commit shows deleted
            // tracks still queued
            if result.removed > 0 {
                prune_missing(&tx)?;
            }

            tx.commit()?;
            Ok(())
        })?;
        db.notify(LIBRARY_TABLES);

        log::info!(
            "[Indexer] Sync done: {} updated, {} skipped, {} removed, {} failed",
            result.updated,
            result.skipped,
            result.removed,
            result.failed
        );
        Ok(result)
    }

    fn inspect_file(path: &Path, known: Option<&IndexedFile>, min_duration_ms: u64) -> FileOutcome {
        match Self::try_inspect_file(path, known, min_duration_ms) {
            Ok(outcome) => outcome,
            Err(e) => FileOutcome::Failed(e.to_string()),
        }
    }

    fn try_inspect_file(
        path: &Path,
        known: Option<&IndexedFile>,
        min_duration_ms: u64,
    ) -> anyhow::Result<FileOutcome> {
        let modified = MetadataExtractor::modified_secs(path)?;

        if let Some(known) = known {
            // Skip if file wasn't modified since it was indexed
            if modified <= known.date_modified {
                return Ok(FileOutcome::Unchanged);
            }
        }

        let file_hash = Self::calculate_file_hash(path)?;
        if let Some(known) = known {
            if known.file_hash.as_deref() == Some(file_hash.as_str()) {
                return Ok(FileOutcome::Touched {
                    track_id: known.track_id,
                    date_modified: modified,
                });
            }
        }

        let track = MetadataExtractor::extract_from_file(path)?;
        if min_duration_ms > 0 {
            let too_short = track
                .duration_ms
                .is_some_and(|ms| (ms.max(0) as u64) < min_duration_ms);
            if too_short {
                return Ok(FileOutcome::TooShort);
            }
        }

        Ok(FileOutcome::Extracted { track, file_hash })
    }

    /// Calculate file hash using BLAKE3 (fast and secure)
    fn calculate_file_hash(path: &Path) -> anyhow::Result<String> {
        let mut file = File::open(path)?;
        let mut hasher = blake3::Hasher::new();
        let mut buffer = [0; 8192];

        loop {
            let bytes_read = file.read(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }

        Ok(hasher.finalize().to_hex().to_string())
    }

    /// An indexed file missed by this walk survives only if it still exists under a root
    fn still_in_library(path: &Path, roots: &[PathBuf]) -> bool {
        path.is_file() && roots.iter().any(|root| path.starts_with(root))
    }
}

/// Run a library sync on the blocking pool
pub async fn scan_library<F>(
    db: &DatabaseConnection,
    settings: LibrarySettings,
    progress_callback: F,
) -> Result<IndexingResult>
where
    F: Fn(IndexingProgress) + Send + Sync + 'static,
{
    let sync_db = db.clone();
    tokio::task::spawn_blocking(move || {
        LibraryIndexer::sync_library(&sync_db, &settings, progress_callback)
    })
    .await?
}
