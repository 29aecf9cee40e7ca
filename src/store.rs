//! SQLite-backed payload store.
//!
//! Each persisted event kind has its own append-only table with the layout
//! `(id, repository, sender, payload, created_at, delivery_id)` and indexes on
//! `repository`, `sender` and `(repository, sender)`.
//!
//! Table names are never built from request data: [`EventKind`] is a closed
//! set and every statement is a static string chosen by matching on it.
//!
//! Writes go through a single connection behind a mutex. Reads against a file
//! database open their own read-only connection, so counting never waits on
//! the writer lock. All rusqlite calls run under `spawn_blocking`; once a
//! write has been handed to the blocking pool it completes or fails as a unit
//! even if the request that started it is dropped.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OpenFlags, params};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Event types that are persisted, one table each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    PullRequest,
    PullRequestReview,
    PullRequestReviewComment,
}

impl EventKind {
    /// Every persisted kind, in reporting order.
    pub const ALL: [EventKind; 3] = [
        EventKind::PullRequest,
        EventKind::PullRequestReview,
        EventKind::PullRequestReviewComment,
    ];

    /// The event type label, which is also the table name.
    pub fn label(self) -> &'static str {
        match self {
            EventKind::PullRequest => "pull_request",
            EventKind::PullRequestReview => "pull_request_review",
            EventKind::PullRequestReviewComment => "pull_request_review_comment",
        }
    }

    fn insert_sql(self) -> &'static str {
        match self {
            EventKind::PullRequest => {
                "INSERT INTO pull_request (repository, sender, payload, created_at, delivery_id)
                 VALUES (?1, ?2, ?3, ?4, ?5)"
            }
            EventKind::PullRequestReview => {
                "INSERT INTO pull_request_review
                     (repository, sender, payload, created_at, delivery_id)
                 VALUES (?1, ?2, ?3, ?4, ?5)"
            }
            EventKind::PullRequestReviewComment => {
                "INSERT INTO pull_request_review_comment
                     (repository, sender, payload, created_at, delivery_id)
                 VALUES (?1, ?2, ?3, ?4, ?5)"
            }
        }
    }

    fn count_sql(self) -> &'static str {
        match self {
            EventKind::PullRequest => "SELECT COUNT(*) FROM pull_request WHERE repository = ?1",
            EventKind::PullRequestReview => {
                "SELECT COUNT(*) FROM pull_request_review WHERE repository = ?1"
            }
            EventKind::PullRequestReviewComment => {
                "SELECT COUNT(*) FROM pull_request_review_comment WHERE repository = ?1"
            }
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS pull_request (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    repository VARCHAR(255) NOT NULL,
    sender VARCHAR(255) NOT NULL,
    payload TEXT NOT NULL,
    created_at DATETIME NOT NULL,
    delivery_id TEXT
);
CREATE INDEX IF NOT EXISTS pull_request_repository ON pull_request (repository);
CREATE INDEX IF NOT EXISTS pull_request_sender ON pull_request (sender);
CREATE INDEX IF NOT EXISTS pull_request_repository_sender ON pull_request (repository, sender);

CREATE TABLE IF NOT EXISTS pull_request_review (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    repository VARCHAR(255) NOT NULL,
    sender VARCHAR(255) NOT NULL,
    payload TEXT NOT NULL,
    created_at DATETIME NOT NULL,
    delivery_id TEXT
);
CREATE INDEX IF NOT EXISTS pull_request_review_repository ON pull_request_review (repository);
CREATE INDEX IF NOT EXISTS pull_request_review_sender ON pull_request_review (sender);
CREATE INDEX IF NOT EXISTS pull_request_review_repository_sender
    ON pull_request_review (repository, sender);

CREATE TABLE IF NOT EXISTS pull_request_review_comment (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    repository VARCHAR(255) NOT NULL,
    sender VARCHAR(255) NOT NULL,
    payload TEXT NOT NULL,
    created_at DATETIME NOT NULL,
    delivery_id TEXT
);
CREATE INDEX IF NOT EXISTS pull_request_review_comment_repository
    ON pull_request_review_comment (repository);
CREATE INDEX IF NOT EXISTS pull_request_review_comment_sender
    ON pull_request_review_comment (sender);
CREATE INDEX IF NOT EXISTS pull_request_review_comment_repository_sender
    ON pull_request_review_comment (repository, sender);
"#;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage error during {operation}: {source}")]
    Sqlite {
        operation: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    #[error("storage error during {operation}: {message}")]
    Unavailable {
        operation: &'static str,
        message: String,
    },
}

impl StoreError {
    fn sqlite(operation: &'static str) -> impl FnOnce(rusqlite::Error) -> Self {
        move |source| StoreError::Sqlite { operation, source }
    }

    fn unavailable(operation: &'static str, message: impl ToString) -> Self {
        StoreError::Unavailable {
            operation,
            message: message.to_string(),
        }
    }
}

/// One row to append.
#[derive(Debug, Clone)]
pub struct NewPayload {
    pub repository: String,
    pub sender: String,
    /// Raw JSON text, stored verbatim.
    pub payload: String,
    pub created_at: DateTime<Utc>,
    pub delivery_id: Option<String>,
}

/// A persisted row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredPayload {
    pub id: i64,
    pub repository: String,
    pub sender: String,
    pub payload: String,
    pub created_at: String,
    pub delivery_id: Option<String>,
}

#[derive(Clone)]
pub struct PayloadStore {
    writer: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl PayloadStore {
    /// Opens (creating if needed) a database file and provisions the tables.
    ///
    /// `:memory:` and `file::memory:` URIs yield an in-memory store.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if is_in_memory(path) {
            return Self::open_in_memory();
        }
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::unavailable("create database directory", e))?;
            }
        }

        let conn = Connection::open(path).map_err(StoreError::sqlite("open database"))?;
        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
            .map_err(StoreError::sqlite("set journal_mode"))?;
        if !journal_mode.eq_ignore_ascii_case("wal") {
            warn!(%journal_mode, "SQLite did not enable WAL; reads will contend with writes");
        }
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(StoreError::sqlite("configure busy_timeout"))?;
        conn.execute_batch(SCHEMA)
            .map_err(StoreError::sqlite("provision schema"))?;

        Ok(Self {
            writer: Arc::new(Mutex::new(conn)),
            path: Some(path.to_path_buf()),
        })
    }

    /// An in-memory store; reads and writes share the one connection.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(StoreError::sqlite("open database"))?;
        conn.execute_batch(SCHEMA)
            .map_err(StoreError::sqlite("provision schema"))?;
        Ok(Self {
            writer: Arc::new(Mutex::new(conn)),
            path: None,
        })
    }

    /// Appends one row to the table for `kind`. Returns the new row id.
    pub async fn save(&self, kind: EventKind, row: NewPayload) -> Result<i64, StoreError> {
        let writer = self.writer.clone();
        tokio::task::spawn_blocking(move || {
            let conn = writer
                .lock()
                .map_err(|e| StoreError::unavailable("save", e))?;
            conn.execute(
                kind.insert_sql(),
                params![
                    row.repository,
                    row.sender,
                    row.payload,
                    row.created_at.to_rfc3339_opts(SecondsFormat::Secs, true),
                    row.delivery_id,
                ],
            )
            .map_err(StoreError::sqlite("save"))?;
            let id = conn.last_insert_rowid();
            debug!(table = kind.label(), id, "payload saved");
            Ok(id)
        })
        .await
        .map_err(|e| StoreError::unavailable("save", e))?
    }

    /// Number of rows in `kind`'s table whose repository equals `repository`
    /// exactly (case-sensitive).
    pub async fn count(&self, repository: &str, kind: EventKind) -> Result<u64, StoreError> {
        let repository = repository.to_string();
        let writer = self.writer.clone();
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let count: i64 = match path {
                Some(path) => {
                    let conn = Connection::open_with_flags(
                        path,
                        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
                    )
                    .map_err(StoreError::sqlite("open reader"))?;
                    conn.busy_timeout(Duration::from_secs(5))
                        .map_err(StoreError::sqlite("configure reader"))?;
                    conn.query_row(kind.count_sql(), params![repository], |row| row.get(0))
                        .map_err(StoreError::sqlite("count"))?
                }
                None => {
                    let conn = writer
                        .lock()
                        .map_err(|e| StoreError::unavailable("count", e))?;
                    conn.query_row(kind.count_sql(), params![repository], |row| row.get(0))
                        .map_err(StoreError::sqlite("count"))?
                }
            };
            Ok(count.max(0) as u64)
        })
        .await
        .map_err(|e| StoreError::unavailable("count", e))?
    }

    /// All rows of `kind` for `repository`, oldest first.
    pub async fn list(
        &self,
        repository: &str,
        kind: EventKind,
    ) -> Result<Vec<StoredPayload>, StoreError> {
        let repository = repository.to_string();
        let writer = self.writer.clone();
        tokio::task::spawn_blocking(move || {
            let conn = writer
                .lock()
                .map_err(|e| StoreError::unavailable("list", e))?;
            let sql = match kind {
                EventKind::PullRequest => {
                    "SELECT id, repository, sender, payload, created_at, delivery_id
                     FROM pull_request WHERE repository = ?1 ORDER BY id"
                }
                EventKind::PullRequestReview => {
                    "SELECT id, repository, sender, payload, created_at, delivery_id
                     FROM pull_request_review WHERE repository = ?1 ORDER BY id"
                }
                EventKind::PullRequestReviewComment => {
                    "SELECT id, repository, sender, payload, created_at, delivery_id
                     FROM pull_request_review_comment WHERE repository = ?1 ORDER BY id"
                }
            };
            let mut stmt = conn.prepare(sql).map_err(StoreError::sqlite("list"))?;
            let rows = stmt
                .query_map(params![repository], |row| {
                    Ok(StoredPayload {
                        id: row.get(0)?,
                        repository: row.get(1)?,
                        sender: row.get(2)?,
                        payload: row.get(3)?,
                        created_at: row.get(4)?,
                        delivery_id: row.get(5)?,
                    })
                })
                .map_err(StoreError::sqlite("list"))?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row.map_err(StoreError::sqlite("list"))?);
            }
            Ok(out)
        })
        .await
        .map_err(|e| StoreError::unavailable("list", e))?
    }
}

/// SQLite's in-memory names; each connection to one of these sees a new,
/// empty database, so they must never be reopened per read.
fn is_in_memory(path: &Path) -> bool {
    match path.to_str() {
        Some(name) => {
            name == ":memory:"
                || name.starts_with("file::memory:")
                || (name.starts_with("file:") && name.contains("mode=memory"))
        }
        None => false,
    }
}
