// Persisted play queue and now-playing pointer
use rusqlite::Connection;
use serde::Serialize;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use super::state::{NowPlayingChange, QueueList};
use crate::db::connection::{DatabaseConnection, Table};
use crate::db::live::LiveQuery;
use crate::db::models::{MediaGroup, NowPlayingInfo, QueueEntry, QueuedTrack};
use crate::db::operations::DbOperations;
use crate::error::{Error, Result};

/// Tables every queue write touches
const QUEUE_TABLES: &[Table] = &[Table::Queue, Table::NowPlaying];

/// Tables the resolved queue view depends on
const QUEUE_VIEW_TABLES: &[Table] = &[
    Table::Queue,
    Table::NowPlaying,
    Table::Tracks,
    Table::Albums,
    Table::Artists,
];

/// The queue as the UI sees it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum QueueState {
    Empty,
    Playing {
        now_playing: QueuedTrack,
        /// Everything after `now_playing`, in order
        upcoming: Vec<QueuedTrack>,
        last_recorded_position_ms: u64,
        media_group: Option<MediaGroup>,
    },
}

impl QueueState {
    pub fn is_empty(&self) -> bool {
        matches!(self, QueueState::Empty)
    }

    pub fn now_playing(&self) -> Option<&QueuedTrack> {
        match self {
            QueueState::Empty => None,
            QueueState::Playing { now_playing, .. } => Some(now_playing),
        }
    }
}

/// The whole persisted queue, including items before the playing one
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueSnapshot {
    pub tracks: Vec<QueuedTrack>,
    pub now_playing: NowPlayingInfo,
}

impl QueueSnapshot {
    pub fn entries(&self) -> Vec<QueueEntry> {
        self.tracks.iter().map(QueueEntry::from).collect()
    }
}

/// Single authority over the persisted queue.
///
/// Every mutation reads, edits and rewrites the queue under the connection lock, so
/// concurrent callers are applied in call order and readers never see a half-written
/// queue.
#[derive(Clone)]
pub struct QueueRepository {
    db: DatabaseConnection,
    last_item_id: Arc<AtomicI64>,
}

impl QueueRepository {
    pub fn new(db: DatabaseConnection) -> Result<Self> {
        let last_item_id = db.with_conn(|conn| DbOperations::max_queue_item_id(conn))?;
        Ok(Self {
            db,
            last_item_id: Arc::new(AtomicI64::new(last_item_id)),
        })
    }

    /// Continuously-updating view of now playing plus upcoming items
    pub fn get_queue(&self) -> LiveQuery<QueueState> {
        self.db.observe(QUEUE_VIEW_TABLES, load_state)
    }

    pub async fn queue_snapshot(&self) -> Result<QueueSnapshot> {
        self.db
            .read(|conn| {
                Ok(QueueSnapshot {
                    tracks: DbOperations::queued_tracks(conn)?,
                    now_playing: DbOperations::load_now_playing(conn)?,
                })
            })
            .await
    }

    /// Fresh queue item ids, unique for the lifetime of the database
    pub fn allocate_item_ids(&self, count: usize) -> Vec<i64> {
        let first = self.last_item_id.fetch_add(count as i64, Ordering::SeqCst) + 1;
        (first..first + count as i64).collect()
    }

    /// Replace the queue and now-playing record in one transaction
    pub async fn save_queue(&self, info: NowPlayingInfo, entries: Vec<QueueEntry>) -> Result<()> {
        self.check_entries(info.position_in_queue, &entries)?;

        log::debug!(
            "Saving queue of {} items, now playing {:?}",
            entries.len(),
            info.position_in_queue
        );
        self.db
            .run(QUEUE_TABLES, move |conn| {
                DbOperations::replace_queue(conn, &info, &entries)
            })
            .await
    }

    /// Replace the queue with `entries` playing `position` at `position_ms`, keeping
    /// the media group on record.
    ///
    /// The group is read and written back under one lock, so a queue saved
    /// concurrently by [`save_queue`](Self::save_queue) keeps its group. Without a
    /// position the whole now-playing record is reset.
    pub async fn replace_entries_keep_group(
        &self,
        position: Option<usize>,
        position_ms: u64,
        entries: Vec<QueueEntry>,
    ) -> Result<()> {
        self.check_entries(position, &entries)?;

        self.db
            .run(QUEUE_TABLES, move |conn| {
                let info = match position {
                    Some(index) => {
                        let recorded = DbOperations::load_now_playing(conn)?;
                        let mut info = NowPlayingInfo::playing(index).with_position_ms(position_ms);
                        info.media_group = recorded.media_group;
                        info
                    }
                    None => NowPlayingInfo::default(),
                };
                DbOperations::replace_queue(conn, &info, &entries)
            })
            .await
    }

    fn check_entries(&self, position: Option<usize>, entries: &[QueueEntry]) -> Result<()> {
        if let Some(index) = position {
            if index >= entries.len() {
                return Err(Error::InvalidQueueIndex {
                    index,
                    len: entries.len(),
                });
            }
        }
        if let Some(max) = entries.iter().map(|e| e.queue_item_id).max() {
            self.last_item_id.fetch_max(max, Ordering::SeqCst);
        }
        Ok(())
    }

    /// Move the item at `from` to `to` (list semantics)
    pub async fn move_queue_item(&self, from: usize, to: usize) -> Result<()> {
        self.db
            .run(QUEUE_TABLES, move |conn| {
                mutate(conn, |list, _| list.move_item(from, to))
            })
            .await
    }

    /// Append `track_id` after the last queued item; nothing starts playing
    pub async fn add_to_queue(&self, track_id: i64) -> Result<QueuedTrack> {
        let item_id = self.allocate_item_ids(1)[0];
        self.db
            .run(QUEUE_TABLES, move |conn| {
                let track = DbOperations::get_track(conn, track_id)?
                    .ok_or_else(|| Error::not_found("track", track_id))?;
                let position = mutate(conn, |list, _| {
                    Ok(list.push(QueueEntry::new(track_id, item_id)))
                })?;
                Ok(QueuedTrack {
                    track,
                    position,
                    queue_item_id: item_id,
                })
            })
            .await
    }

    /// Point now-playing at `index` and reset the recorded offset
    pub async fn play_queue_item(&self, index: usize) -> Result<()> {
        self.db
            .run(QUEUE_TABLES, move |conn| {
                mutate(conn, |list, info| {
                    list.play(index)?;
                    info.last_recorded_position_ms = 0;
                    Ok(())
                })
            })
            .await
    }

    /// Point now-playing at `index` with the transport already `position_ms` into it
    pub async fn record_now_playing(&self, index: usize, position_ms: u64) -> Result<()> {
        self.db
            .run(QUEUE_TABLES, move |conn| {
                mutate(conn, |list, info| {
                    list.play(index)?;
                    info.last_recorded_position_ms = position_ms;
                    Ok(())
                })
            })
            .await
    }

    /// Remove the items at `positions`, keeping now-playing on the same item if it
    /// survives
    pub async fn remove_items_from_queue(
        &self,
        positions: Vec<usize>,
    ) -> Result<NowPlayingChange> {
        self.db
            .run(QUEUE_TABLES, move |conn| {
                mutate(conn, |list, info| remove_positions(list, info, &positions))
            })
            .await
    }

    /// Remember the transport offset of the playing item; ignored when nothing plays
    pub async fn set_last_recorded_position(&self, position_ms: u64) -> Result<()> {
        self.db
            .run(&[Table::NowPlaying], move |conn| {
                let mut info = DbOperations::load_now_playing(conn)?;
                if info.position_in_queue.is_none() {
                    return Ok(());
                }
                info.last_recorded_position_ms = position_ms;
                DbOperations::write_now_playing(conn, &info)
            })
            .await
    }

    pub async fn clear_queue(&self) -> Result<()> {
        self.db
            .run(QUEUE_TABLES, |conn| {
                DbOperations::replace_queue(conn, &NowPlayingInfo::default(), &[])
            })
            .await
    }

    /// Drop queue items whose track left the library, using the removal rule
    pub async fn prune_missing_tracks(&self) -> Result<usize> {
        self.db
            .run(QUEUE_TABLES, |conn| {
                let tx = conn.transaction()?;
                let pruned = prune_missing(&tx)?;
                tx.commit()?;
                Ok(pruned)
            })
            .await
    }
}

/// Remove queue rows whose track no longer exists.
///
/// Runs inside the caller's transaction, so a library sync can delete tracks and
/// prune the queue in one commit.
pub(crate) fn prune_missing(conn: &Connection) -> Result<usize> {
    let missing: Vec<usize> = {
        let mut stmt = conn.prepare(
            "SELECT q.queue_position FROM queue q
             LEFT JOIN tracks t ON t.id = q.track_id
             WHERE t.id IS NULL
             ORDER BY q.queue_position",
        )?;
        let rows = stmt
            .query_map([], |row| row.get::<_, i64>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        // Stored positions are contiguous, so they double as list indices
        rows.into_iter().map(|p| p as usize).collect()
    };
    if missing.is_empty() {
        return Ok(0);
    }

    log::info!("Pruning {} queue items with missing tracks", missing.len());
    edit(conn, |list, info| remove_positions(list, info, &missing))?;
    Ok(missing.len())
}

/// Load the queue, apply `f`, and write it back with the adjusted now-playing
/// record, in one transaction
fn mutate<T>(
    conn: &mut Connection,
    f: impl FnOnce(&mut QueueList<QueueEntry>, &mut NowPlayingInfo) -> Result<T>,
) -> Result<T> {
    let tx = conn.transaction()?;
    let value = edit(&tx, f)?;
    tx.commit()?;
    Ok(value)
}

fn edit<T>(
    conn: &Connection,
    f: impl FnOnce(&mut QueueList<QueueEntry>, &mut NowPlayingInfo) -> Result<T>,
) -> Result<T> {
    let entries = DbOperations::queue_entries(conn)?;
    let mut info = DbOperations::load_now_playing(conn)?;
    let mut list = QueueList::new(entries, info.position_in_queue);

    let value = f(&mut list, &mut info)?;

    info.position_in_queue = list.now_playing();
    DbOperations::write_queue(conn, &info, list.items())?;
    Ok(value)
}

fn remove_positions(
    list: &mut QueueList<QueueEntry>,
    info: &mut NowPlayingInfo,
    positions: &[usize],
) -> Result<NowPlayingChange> {
    let change = list.remove_positions(positions)?;
    match change {
        NowPlayingChange::Kept => {}
        NowPlayingChange::Replaced => info.last_recorded_position_ms = 0,
        NowPlayingChange::Cleared => *info = NowPlayingInfo::default(),
    }
    Ok(change)
}

/// Split the persisted queue at the now-playing pointer
fn load_state(conn: &Connection) -> Result<QueueState> {
    let info = DbOperations::load_now_playing(conn)?;
    let Some(position) = info.position_in_queue else {
        return Ok(QueueState::Empty);
    };

    let entries = DbOperations::queue_entries(conn)?;
    let Some(playing) = entries.get(position) else {
        log::warn!(
            "Now-playing position {} is past the end of a {}-item queue",
            position,
            entries.len()
        );
        return Ok(QueueState::Empty);
    };

    // Match on item id: rows whose track vanished are skipped by the resolved view
    let mut tracks = DbOperations::queued_tracks(conn)?;
    let Some(index) = tracks
        .iter()
        .position(|t| t.queue_item_id == playing.queue_item_id)
    else {
        return Ok(QueueState::Empty);
    };

    let upcoming = tracks.split_off(index + 1);
    let now_playing = tracks
        .pop()
        .ok_or_else(|| Error::not_found("queue item", playing.queue_item_id))?;

    Ok(QueueState::Playing {
        now_playing,
        upcoming,
        last_recorded_position_ms: info.last_recorded_position_ms,
        media_group: info.media_group,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::operations::test_support::{scanned, seed};

    struct Fixture {
        db: DatabaseConnection,
        repo: QueueRepository,
        ids: Vec<i64>,
    }

    /// Library of tracks A, B, C, D
    fn fixture() -> Fixture {
        let db = DatabaseConnection::open_in_memory().unwrap();
        let ids = db
            .with_conn(|conn| {
                Ok(seed(
                    conn,
                    &[
                        scanned("/m/a.mp3", "A", &["X"], "Album"),
                        scanned("/m/b.mp3", "B", &["X"], "Album"),
                        scanned("/m/c.mp3", "C", &["X"], "Album"),
                        scanned("/m/d.mp3", "D", &["X"], "Album"),
                    ],
                ))
            })
            .unwrap();
        let repo = QueueRepository::new(db.clone()).unwrap();
        Fixture { db, repo, ids }
    }

    impl Fixture {
        async fn save_abcd(&self, now_playing: Option<usize>) {
            let item_ids = self.repo.allocate_item_ids(self.ids.len());
            let entries = self
                .ids
                .iter()
                .zip(item_ids)
                .map(|(&track, item)| QueueEntry::new(track, item))
                .collect();
            let info = NowPlayingInfo {
                position_in_queue: now_playing,
                last_recorded_position_ms: 1_000,
                media_group: Some(MediaGroup::AllTracks),
            };
            self.repo.save_queue(info, entries).await.unwrap();
        }

        async fn names(&self) -> Vec<String> {
            let snapshot = self.repo.queue_snapshot().await.unwrap();
            snapshot.tracks.iter().map(|t| t.track.name.clone()).collect()
        }

        async fn playing(&self) -> Option<String> {
            let state = self.repo.get_queue().wait_for(|_| true).await.unwrap();
            state.now_playing().map(|t| t.track.name.clone())
        }
    }

    #[tokio::test]
    async fn test_save_then_get_round_trip() {
        let f = fixture();
        f.save_abcd(Some(1)).await;

        let state = f.repo.get_queue().wait_for(|_| true).await.unwrap();
        match state {
            QueueState::Playing {
                now_playing,
                upcoming,
                last_recorded_position_ms,
                media_group,
            } => {
                assert_eq!(now_playing.track.name, "B");
                assert_eq!(now_playing.position, 1);
                let rest: Vec<_> = upcoming.iter().map(|t| t.track.name.as_str()).collect();
                assert_eq!(rest, vec!["C", "D"]);
                assert_eq!(last_recorded_position_ms, 1_000);
                assert_eq!(media_group, Some(MediaGroup::AllTracks));
            }
            QueueState::Empty => panic!("expected a playing queue"),
        }
    }

    #[tokio::test]
    async fn test_nothing_playing_is_empty_regardless_of_rows() {
        let f = fixture();
        f.save_abcd(None).await;
        assert!(f.repo.get_queue().wait_for(|_| true).await.unwrap().is_empty());
        assert_eq!(f.names().await.len(), 4);
    }

    #[tokio::test]
    async fn test_save_rejects_dangling_pointer() {
        let f = fixture();
        let err = f
            .repo
            .save_queue(NowPlayingInfo::playing(2), vec![QueueEntry::new(f.ids[0], 1)])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidQueueIndex { index: 2, len: 1 }));
    }

    #[tokio::test]
    async fn test_move_scenario() {
        let f = fixture();
        f.save_abcd(Some(0)).await;

        f.repo.move_queue_item(2, 1).await.unwrap();

        assert_eq!(f.names().await, vec!["A", "C", "B", "D"]);
        let snapshot = f.repo.queue_snapshot().await.unwrap();
        let positions: Vec<_> = snapshot.tracks.iter().map(|t| t.position).collect();
        assert_eq!(positions, vec![0, 1, 2, 3]);
        assert_eq!(snapshot.now_playing.position_in_queue, Some(0));
        assert_eq!(f.playing().await.as_deref(), Some("A"));
    }

    #[tokio::test]
    async fn test_move_invalid_index_does_not_mutate() {
        let f = fixture();
        f.save_abcd(Some(0)).await;
        assert!(f.repo.move_queue_item(0, 9).await.is_err());
        assert_eq!(f.names().await, vec!["A", "B", "C", "D"]);
    }

    #[tokio::test]
    async fn test_remove_playing_item_scenario() {
        let f = fixture();
        f.save_abcd(Some(1)).await;

        let change = f.repo.remove_items_from_queue(vec![1, 2]).await.unwrap();

        assert_eq!(change, NowPlayingChange::Replaced);
        assert_eq!(f.names().await, vec!["A", "D"]);
        let snapshot = f.repo.queue_snapshot().await.unwrap();
        assert_eq!(snapshot.now_playing.position_in_queue, Some(1));
        assert_eq!(snapshot.now_playing.last_recorded_position_ms, 0);
        assert_eq!(f.playing().await.as_deref(), Some("D"));
    }

    #[tokio::test]
    async fn test_remove_before_playing_keeps_offset() {
        let f = fixture();
        f.save_abcd(Some(3)).await;

        f.repo.remove_items_from_queue(vec![0]).await.unwrap();

        let snapshot = f.repo.queue_snapshot().await.unwrap();
        assert_eq!(snapshot.now_playing.position_in_queue, Some(2));
        assert_eq!(snapshot.now_playing.last_recorded_position_ms, 1_000);
        assert_eq!(f.playing().await.as_deref(), Some("D"));
    }

    #[tokio::test]
    async fn test_remove_all_goes_empty() {
        let f = fixture();
        f.save_abcd(Some(2)).await;
        let change = f.repo.remove_items_from_queue(vec![0, 1, 2, 3]).await.unwrap();
        assert_eq!(change, NowPlayingChange::Cleared);
        assert!(f.repo.get_queue().wait_for(|_| true).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_add_to_queue_appends() {
        let f = fixture();
        let item_ids = f.repo.allocate_item_ids(2);
        f.repo
            .save_queue(
                NowPlayingInfo::playing(0),
                vec![
                    QueueEntry::new(f.ids[0], item_ids[0]),
                    QueueEntry::new(f.ids[1], item_ids[1]),
                ],
            )
            .await
            .unwrap();

        let added = f.repo.add_to_queue(f.ids[3]).await.unwrap();

        assert_eq!(added.position, 2);
        assert!(added.queue_item_id > item_ids[1]);
        assert_eq!(f.names().await, vec!["A", "B", "D"]);
        assert_eq!(f.playing().await.as_deref(), Some("A"));
    }

    #[tokio::test]
    async fn test_add_unknown_track_fails_without_mutation() {
        let f = fixture();
        f.save_abcd(Some(0)).await;
        let err = f.repo.add_to_queue(9_999).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(f.names().await.len(), 4);
    }

    #[tokio::test]
    async fn test_add_to_empty_queue_does_not_start_playing() {
        let f = fixture();
        f.repo.add_to_queue(f.ids[0]).await.unwrap();
        assert_eq!(f.names().await, vec!["A"]);
        assert!(f.playing().await.is_none());
    }

    #[tokio::test]
    async fn test_play_queue_item_is_idempotent() {
        let f = fixture();
        f.save_abcd(Some(0)).await;

        for _ in 0..2 {
            f.repo.play_queue_item(2).await.unwrap();
            let snapshot = f.repo.queue_snapshot().await.unwrap();
            assert_eq!(snapshot.now_playing.position_in_queue, Some(2));
            assert_eq!(snapshot.now_playing.last_recorded_position_ms, 0);
            assert_eq!(snapshot.now_playing.media_group, Some(MediaGroup::AllTracks));
            assert_eq!(f.playing().await.as_deref(), Some("C"));
            f.repo.set_last_recorded_position(7_000).await.unwrap();
        }
        assert!(f.repo.play_queue_item(4).await.is_err());
    }

    #[tokio::test]
    async fn test_recorded_position_ignored_when_nothing_plays() {
        let f = fixture();
        f.repo.set_last_recorded_position(5_000).await.unwrap();
        let snapshot = f.repo.queue_snapshot().await.unwrap();
        assert_eq!(snapshot.now_playing, NowPlayingInfo::default());
    }

    #[tokio::test]
    async fn test_prune_missing_tracks() {
        let f = fixture();
        f.save_abcd(Some(1)).await;
        f.db.with_conn(|conn| DbOperations::delete_tracks(conn, &[f.ids[1]]))
            .unwrap();

        assert_eq!(f.repo.prune_missing_tracks().await.unwrap(), 1);
        assert_eq!(f.names().await, vec!["A", "C", "D"]);
        assert_eq!(f.playing().await.as_deref(), Some("C"));
        assert_eq!(f.repo.prune_missing_tracks().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_get_queue_follows_writes() {
        let f = fixture();
        let mut live = f.repo.get_queue();
        assert!(live.wait_for(|_| true).await.unwrap().is_empty());

        f.save_abcd(Some(3)).await;
        let state = live.wait_for(|s| !s.is_empty()).await.unwrap();
        assert_eq!(state.now_playing().unwrap().track.name, "D");

        f.repo.clear_queue().await.unwrap();
        assert!(live.wait_for(|s| s.is_empty()).await.unwrap().is_empty());
    }

    #[test]
    fn test_item_ids_continue_after_restart() {
        let f = fixture();
        f.db.with_conn(|conn| {
            DbOperations::replace_queue(
                conn,
                &NowPlayingInfo::default(),
                &[QueueEntry::new(f.ids[0], 41)],
            )
        })
        .unwrap();
        let reopened = QueueRepository::new(f.db.clone()).unwrap();
        assert_eq!(reopened.allocate_item_ids(2), vec![42, 43]);
    }

    #[tokio::test]
    async fn test_replace_entries_keeps_recorded_group() {
        let f = fixture();
        f.save_abcd(Some(0)).await;

        // A newer queue saved its own group after the caller read the old items
        let newer = f.repo.allocate_item_ids(1)[0];
        f.repo
            .save_queue(
                NowPlayingInfo::playing(0).with_media_group(MediaGroup::Album(7)),
                vec![QueueEntry::new(f.ids[3], newer)],
            )
            .await
            .unwrap();

        let stale = f.repo.allocate_item_ids(2);
        f.repo
            .replace_entries_keep_group(
                Some(1),
                2_000,
                vec![
                    QueueEntry::new(f.ids[0], stale[0]),
                    QueueEntry::new(f.ids[1], stale[1]),
                ],
            )
            .await
            .unwrap();

        let snapshot = f.repo.queue_snapshot().await.unwrap();
        assert_eq!(snapshot.now_playing.media_group, Some(MediaGroup::Album(7)));
        assert_eq!(snapshot.now_playing.position_in_queue, Some(1));
        assert_eq!(snapshot.now_playing.last_recorded_position_ms, 2_000);
        assert_eq!(f.names().await, vec!["A", "B"]);

        f.repo.replace_entries_keep_group(None, 0, Vec::new()).await.unwrap();
        let snapshot = f.repo.queue_snapshot().await.unwrap();
        assert_eq!(snapshot.now_playing, NowPlayingInfo::default());

        let err = f
            .repo
            .replace_entries_keep_group(Some(3), 0, vec![QueueEntry::new(f.ids[0], 99)])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidQueueIndex { index: 3, len: 1 }));
    }

    #[tokio::test]
    async fn test_record_now_playing_keeps_live_offset() {
        let f = fixture();
        f.save_abcd(Some(0)).await;

        f.repo.record_now_playing(2, 2_500).await.unwrap();

        let snapshot = f.repo.queue_snapshot().await.unwrap();
        assert_eq!(snapshot.now_playing.position_in_queue, Some(2));
        assert_eq!(snapshot.now_playing.last_recorded_position_ms, 2_500);
        assert_eq!(snapshot.now_playing.media_group, Some(MediaGroup::AllTracks));
        assert!(f.repo.record_now_playing(9, 0).await.is_err());
        assert_eq!(f.playing().await.as_deref(), Some("C"));
    }
}
