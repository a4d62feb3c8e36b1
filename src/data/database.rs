//! SQLite database connection and transactions
//!
//! All database access goes through this module. Entity queries live in the
//! sibling modules as free functions over `&mut SqliteConnection` so that
//! services can run several of them inside one `BEGIN IMMEDIATE` transaction.

use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite, SqliteConnection};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::error::AppError;

/// Database connection pool wrapper.
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// Open (or create) the SQLite file at `path` and run migrations
    pub async fn connect(path: &Path) -> Result<Self, AppError> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| AppError::Database(sqlx::Error::Io(e)))?;
            }
        }

        let connection_string = format!("sqlite:{}?mode=rwc", path.display());
        let options = SqliteConnectOptions::from_str(&connection_string)?
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await.map_err(|e| {
            tracing::error!(error = %e, "Migration failed");
            AppError::from(e)
        })?;

        tracing::info!(path = %path.display(), "Database ready");

        Ok(Self { pool })
    }

    /// Borrow a pooled connection for plain reads and single-statement writes
    pub async fn acquire(&self) -> Result<PoolConnection<Sqlite>, AppError> {
        Ok(self.pool.acquire().await?)
    }

    /// Start a write transaction that takes the database write lock up front
    ///
    /// Read-modify-write sequences run inside one of these so concurrent
    /// toggles on the same row set are serialised by SQLite.
    pub async fn begin_immediate(&self) -> Result<ImmediateTx, AppError> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;
        Ok(ImmediateTx { conn: Some(conn) })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

/// An open `BEGIN IMMEDIATE` transaction
///
/// Usage:
/// ```ignore
/// let mut tx = db.begin_immediate().await?;
/// let conn = tx.conn();
/// let result: Result<T, AppError> = async { /* queries on conn */ }.await;
/// tx.finish(result).await
/// ```
///
/// If the guard is dropped without `finish`, the connection is detached from
/// the pool and closed so the open transaction dies with it.
pub struct ImmediateTx {
    conn: Option<PoolConnection<Sqlite>>,
}

impl ImmediateTx {
    pub fn conn(&mut self) -> &mut SqliteConnection {
        self.conn
            .as_deref_mut()
            .expect("connection is present until finish")
    }

    /// Commit on `Ok`, roll back on `Err`, and pass the result through
    pub async fn finish<T>(mut self, result: Result<T, AppError>) -> Result<T, AppError> {
        let Some(mut conn) = self.conn.take() else {
            return result;
        };

        match result {
            Ok(value) => {
                sqlx::query("COMMIT").execute(&mut *conn).await?;
                Ok(value)
            }
            Err(error) => {
                if let Err(rollback_error) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
                    tracing::warn!(
                        error = %rollback_error,
                        "Rollback failed; discarding connection"
                    );
                    drop(conn.detach());
                }
                Err(error)
            }
        }
    }
}

impl Drop for ImmediateTx {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            tracing::warn!("Transaction dropped without finish; discarding connection");
            drop(conn.detach());
        }
    }
}
