//! Local SQLite store for daily stats.
//!
//! `rusqlite::Connection` is not `Sync`, so one thread owns it and drains a
//! queue of jobs. Async callers hand over a closure and await its result on a
//! oneshot. Jobs run strictly in the order they were sent.

use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use log::{error, info, warn};
use rusqlite::Connection;
use tokio::sync::oneshot;

mod helpers;
mod migrations;
mod repositories;

use migrations::run_migrations;

pub use repositories::daily_stats::stats_key;

type Job = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum Message {
    Run(Job),
    Stop,
}

struct Worker {
    jobs: mpsc::Sender<Message>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Worker {
    fn drop(&mut self) {
        let handle = match self.thread.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(handle) = handle else {
            return;
        };

        // The thread may already be gone if opening the store failed.
        let _ = self.jobs.send(Message::Stop);
        if handle.join().is_err() {
            error!("stats store thread panicked");
        }
    }
}

/// Handle to the store thread. Clones share the same thread, which stops
/// once the last clone is dropped.
#[derive(Clone)]
pub struct Database {
    worker: Arc<Worker>,
}

impl Database {
    /// Opens (or creates) the store at `path` and brings its schema up to
    /// date before returning.
    pub fn new(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let (jobs_tx, jobs_rx) = mpsc::channel::<Message>();
        let (opened_tx, opened_rx) = mpsc::channel::<Result<()>>();
        let thread_path = path.clone();

        let handle = thread::Builder::new()
            .name("posturewatch-db".into())
            .spawn(move || {
                let mut conn = match open_store(&thread_path) {
                    Ok(conn) => {
                        let _ = opened_tx.send(Ok(()));
                        conn
                    }
                    Err(err) => {
                        let _ = opened_tx.send(Err(err));
                        return;
                    }
                };
                drain(&mut conn, &jobs_rx);
                info!("stats store thread stopped");
            })
            .context("failed to spawn stats store thread")?;

        opened_rx
            .recv()
            .context("stats store thread exited while opening")??;
        info!("stats store ready at {}", path.display());

        Ok(Self {
            worker: Arc::new(Worker {
                jobs: jobs_tx,
                thread: Mutex::new(Some(handle)),
            }),
        })
    }

    /// Runs `task` on the store thread and returns its result.
    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job: Job = Box::new(move |conn| {
            // The caller may have been cancelled; the work is done either way.
            let _ = reply_tx.send(task(conn));
        });

        self.worker
            .jobs
            .send(Message::Run(job))
            .map_err(|_| anyhow!("stats store thread is not running"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("stats store thread dropped the job"))?
    }
}

fn open_store(path: &Path) -> Result<Connection> {
    let mut conn = Connection::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
        warn!("WAL journal unavailable, using default: {err}");
    }
    run_migrations(&mut conn).context("failed to migrate stats store")?;
    Ok(conn)
}

fn drain(conn: &mut Connection, jobs: &mpsc::Receiver<Message>) {
    while let Ok(message) = jobs.recv() {
        match message {
            Message::Run(job) => job(conn),
            Message::Stop => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn failing_job_does_not_stop_the_thread() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("posturewatch.sqlite3")).unwrap();

        let err = db
            .execute(|conn| {
                conn.execute("INSERT INTO missing_table VALUES (1)", [])?;
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("missing_table"));

        let version: i32 = db
            .execute(|conn| Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?))
            .await
            .unwrap();
        assert_eq!(version, 1);
    }

    #[tokio::test]
    async fn clones_share_one_store() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("posturewatch.sqlite3")).unwrap();
        let other = db.clone();
        drop(db);

        let tables: i64 = other
            .execute(|conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE name = 'kv_store'",
                    [],
                    |row| row.get(0),
                )?)
            })
            .await
            .unwrap();
        assert_eq!(tables, 1);
    }
}
