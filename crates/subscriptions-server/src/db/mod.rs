mod migrations;
pub mod query;
pub mod subscriptions;
pub mod users;

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, InterruptHandle, OpenFlags};

use crate::error::{AppError, AppResult};

pub type DbPool = Pool<SqliteConnectionManager>;

/// Connection pool plus the deadline applied to every unit of work.
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
    query_timeout: Duration,
}

impl Database {
    pub fn new(pool: DbPool, query_timeout: Duration) -> Self {
        Self {
            pool,
            query_timeout,
        }
    }

    #[cfg(test)]
    pub fn memory() -> Self {
        Self::new(memory_pool(), Duration::from_secs(5))
    }

    pub async fn run<T, F>(&self, work: F) -> AppResult<T>
    where
        F: FnOnce(&mut Connection) -> AppResult<T> + Send + 'static,
        T: Send + 'static,
    {
        run_with_deadline(&self.pool, self.query_timeout, work).await
    }
}

pub fn create_pool(sqlite_path: &str, max_size: u32) -> anyhow::Result<DbPool> {
    // Ensure parent directory exists
    if let Some(parent) = Path::new(sqlite_path).parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create database directory {}", parent.display()))?;
    }

    let manager = SqliteConnectionManager::file(sqlite_path)
        .with_flags(
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_FULL_MUTEX,
        )
        .with_init(|conn| {
            conn.execute_batch(
                "PRAGMA busy_timeout = 5000;
                 PRAGMA journal_mode = WAL;
                 PRAGMA foreign_keys = ON;",
            )?;
            query::register_functions(conn)
        });

    let pool = Pool::builder()
        .max_size(max_size)
        .build(manager)
        .context("Failed to create database pool")?;

    let conn = pool.get().context("Failed to get connection for migrations")?;
    migrations::run(&conn).context("Failed to run migrations")?;

    Ok(pool)
}

/// Single-connection in-memory pool; every test gets its own database.
#[cfg(test)]
pub fn memory_pool() -> DbPool {
    let manager = SqliteConnectionManager::memory()
        .with_init(|conn| {
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
            query::register_functions(conn)
        });
    let pool = Pool::builder().max_size(1).build(manager).unwrap();
    migrations::run(&pool.get().unwrap()).unwrap();
    pool
}

/// Timestamp format shared by every `created_at`/`updated_at` column. Sorts
/// lexicographically in chronological order.
pub fn now() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// True when `err` is a constraint failure with the given extended result
/// code (e.g. `rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE`).
pub fn violates(err: &rusqlite::Error, extended_code: i32) -> bool {
    matches!(err, rusqlite::Error::SqliteFailure(e, _) if e.extended_code == extended_code)
}

/// Shared between the caller and the blocking task running its work.
#[derive(Default)]
struct Cancellation {
    cancelled: AtomicBool,
    handle: Mutex<Option<InterruptHandle>>,
}

impl Cancellation {
    fn publish(&self, handle: Option<InterruptHandle>) {
        if let Ok(mut current) = self.handle.lock() {
            *current = handle;
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Cancels the work unless disarmed once it has finished: work that has not
/// started yet is skipped, a statement in flight is interrupted.
struct CancelOnDrop {
    cancellation: Arc<Cancellation>,
    armed: bool,
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        // Set before looking at the handle; the task checks it after publishing
        self.cancellation.cancelled.store(true, Ordering::SeqCst);
        if let Ok(slot) = self.cancellation.handle.lock() {
            if let Some(handle) = slot.as_ref() {
                tracing::warn!("Interrupting in-flight database statement");
                handle.interrupt();
            }
        }
    }
}

/// Runs blocking database work on tokio's blocking pool under `deadline`.
///
/// When the deadline passes, or the calling future is dropped because the
/// client went away, the statement in flight is interrupted and the
/// connection goes back to the pool. Work still waiting for a connection at
/// that point never runs. Each unit of work holds exactly one connection, so
/// callers must not nest another run inside `work`.
pub async fn run_with_deadline<T, F>(pool: &DbPool, deadline: Duration, work: F) -> AppResult<T>
where
    F: FnOnce(&mut Connection) -> AppResult<T> + Send + 'static,
    T: Send + 'static,
{
    let pool = pool.clone();
    let cancellation = Arc::new(Cancellation::default());
    let mut guard = CancelOnDrop {
        cancellation: cancellation.clone(),
        armed: true,
    };

    let task = tokio::task::spawn_blocking(move || {
        let mut conn = pool.get()?;
        cancellation.publish(Some(conn.get_interrupt_handle()));
        let result = if cancellation.is_cancelled() {
            tracing::warn!("Skipping database work cancelled while waiting for a connection");
            Err(AppError::Timeout)
        } else {
            work(&mut conn)
        };
        // Clear before the connection returns to the pool
        cancellation.publish(None);
        result
    });

    match tokio::time::timeout(deadline, task).await {
        Ok(joined) => {
            guard.armed = false;
            joined.map_err(|e| AppError::Internal(format!("Database task failed: {e}")))?
        }
        Err(_) => Err(AppError::Timeout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_returns_work_result() {
        let pool = memory_pool();
        let count: i64 = run_with_deadline(&pool, Duration::from_secs(1), |conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?)
        })
        .await
        .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn run_interrupts_statements_past_deadline() {
        let pool = memory_pool();
        let result: AppResult<i64> = run_with_deadline(&pool, Duration::from_millis(50), |conn| {
            // Unbounded recursive CTE; only an interrupt stops it
            Ok(conn.query_row(
                "WITH RECURSIVE n(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM n) SELECT MAX(x) FROM n",
                [],
                |row| row.get(0),
            )?)
        })
        .await;
        assert!(matches!(result, Err(AppError::Timeout)));

        // The interrupted connection is usable again
        let count: i64 = run_with_deadline(&pool, Duration::from_secs(5), |conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM subscriptions", [], |row| row.get(0))?)
        })
        .await
        .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn work_cancelled_while_queued_never_runs() {
        let pool = memory_pool();

        // Hold the only connection well past the second caller's deadline
        let holder = tokio::spawn({
            let pool = pool.clone();
            async move {
                run_with_deadline(&pool, Duration::from_secs(5), |_conn| {
                    std::thread::sleep(Duration::from_millis(300));
                    Ok(())
                })
                .await
            }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        let result: AppResult<()> = run_with_deadline(&pool, Duration::from_millis(50), |conn| {
            conn.execute(
                "INSERT INTO users (id, name, email, created_at, updated_at)
                 VALUES ('late', 'Late', 'late@example.com', 'now', 'now')",
                [],
            )?;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(AppError::Timeout)));

        holder.await.unwrap().unwrap();
        // Give the queued task time to pick up the released connection
        tokio::time::sleep(Duration::from_millis(100)).await;

        let count: i64 = run_with_deadline(&pool, Duration::from_secs(5), |conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?)
        })
        .await
        .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn timestamps_sort_chronologically() {
        let earlier = now();
        std::thread::sleep(Duration::from_millis(2));
        assert!(now() > earlier);
    }
}
