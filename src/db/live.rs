// Push-based query subscriptions over the library database
use rusqlite::Connection;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::connection::{DatabaseConnection, Table};
use crate::error::Result;

/// A continuously-updating query result.
///
/// The query re-runs on the blocking pool whenever one of its tables is written
/// or its parameter channel publishes. `None` means the first result has not
/// arrived yet. Dropping the handle cancels the background task.
pub struct LiveQuery<T> {
    rx: watch::Receiver<Option<T>>,
    task: JoinHandle<()>,
}

impl<T: Clone + Send + Sync + 'static> LiveQuery<T> {
    /// Latest computed value, `None` while still loading
    pub fn current(&self) -> Option<T> {
        self.rx.borrow().clone()
    }

    /// Wait for the next value not seen through this handle yet.
    ///
    /// Returns `None` once the producer is gone.
    pub async fn next(&mut self) -> Option<T> {
        loop {
            self.rx.changed().await.ok()?;
            if let Some(value) = self.rx.borrow_and_update().clone() {
                return Some(value);
            }
        }
    }

    /// Wait until a value satisfies `pred`, including the current one
    pub async fn wait_for(&mut self, mut pred: impl FnMut(&T) -> bool) -> Option<T> {
        let guard = self
            .rx
            .wait_for(|value| value.as_ref().is_some_and(&mut pred))
            .await
            .ok()?;
        guard.clone()
    }

    /// Raw receiver, for combining several live values in one `select!`
    pub fn receiver(&self) -> watch::Receiver<Option<T>> {
        self.rx.clone()
    }
}

impl<T> Drop for LiveQuery<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl DatabaseConnection {
    /// Observe a query that depends only on table contents
    pub fn observe<T, F>(&self, tables: &'static [Table], query: F) -> LiveQuery<T>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn(&Connection) -> Result<T> + Send + Sync + 'static,
    {
        let (_unused, params) = watch::channel(());
        self.observe_with(tables, params, move |conn, _| query(conn))
    }

    /// Observe a query that also depends on a published parameter (e.g. sort preferences)
    pub fn observe_with<P, T, F>(
        &self,
        tables: &'static [Table],
        mut params: watch::Receiver<P>,
        query: F,
    ) -> LiveQuery<T>
    where
        P: Clone + Send + Sync + 'static,
        T: Clone + Send + Sync + 'static,
        F: Fn(&Connection, &P) -> Result<T> + Send + Sync + 'static,
    {
        let (tx, rx) = watch::channel(None);
        let db = self.clone();
        let query = Arc::new(query);
        let mut changes = self.subscribe_changes();

        let task = tokio::spawn(async move {
            let mut params_open = true;
            loop {
                let seen = changes.borrow_and_update().select(tables);
                let param = params.borrow_and_update().clone();

                let run_db = db.clone();
                let run_query = Arc::clone(&query);
                let result = tokio::task::spawn_blocking(move || {
                    run_db.with_conn(|conn| run_query(conn, &param))
                })
                .await;

                match result {
                    Ok(Ok(value)) => {
                        if tx.send(Some(value)).is_err() {
                            return;
                        }
                    }
                    // Keep the last good value; the next change retries
                    Ok(Err(e)) => log::warn!("Live query failed: {}", e),
                    Err(e) => {
                        log::error!("Live query task aborted: {}", e);
                        return;
                    }
                }

                // Park until something this query reads has changed
                loop {
                    tokio::select! {
                        changed = changes.changed() => {
                            if changed.is_err() {
                                return;
                            }
                            if changes.borrow().select(tables) != seen {
                                break;
                            }
                        }
                        changed = params.changed(), if params_open => {
                            if changed.is_err() {
                                params_open = false;
                                continue;
                            }
                            break;
                        }
                        _ = tx.closed() => return,
                    }
                }
            }
        });

        LiveQuery { rx, task }
    }
}
