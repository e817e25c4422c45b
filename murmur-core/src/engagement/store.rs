//! Engagement state persistence
//!
//! Engagement records must survive process restarts. Storage is keyed by
//! scope and holds exactly the fields of [`EngagementRecord`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;

use super::record::{EngagementRecord, TenseOrigin};
use crate::error::{MurmurError, Result};

/// Durable storage for per-scope engagement records
#[async_trait]
pub trait EngagementStore: Send + Sync {
    /// Load a scope's record, `None` when the scope has never been saved
    async fn load(&self, scope: &str) -> Result<Option<EngagementRecord>>;

    /// Persist a scope's record, replacing any previous one
    async fn save(&self, scope: &str, record: &EngagementRecord) -> Result<()>;

    /// All persisted scopes
    async fn scopes(&self) -> Result<Vec<String>>;
}

/// Process-local engagement store
#[derive(Debug, Clone, Default)]
pub struct InMemoryEngagementStore {
    records: Arc<RwLock<HashMap<String, EngagementRecord>>>,
}

impl InMemoryEngagementStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EngagementStore for InMemoryEngagementStore {
    async fn load(&self, scope: &str) -> Result<Option<EngagementRecord>> {
        Ok(self.records.read().await.get(scope).cloned())
    }

    async fn save(&self, scope: &str, record: &EngagementRecord) -> Result<()> {
        self.records
            .write()
            .await
            .insert(scope.to_string(), record.clone());
        Ok(())
    }

    async fn scopes(&self) -> Result<Vec<String>> {
        let mut scopes: Vec<String> = self.records.read().await.keys().cloned().collect();
        scopes.sort();
        Ok(scopes)
    }
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS engagement_state (
    scope        TEXT PRIMARY KEY,
    heartbeat    REAL NOT NULL,
    is_tense     INTEGER NOT NULL,
    tense_expiry TEXT,
    origin       TEXT,
    focus        TEXT NOT NULL DEFAULT '',
    updated_at   TEXT NOT NULL
);
";

/// SQLite-backed engagement store.
///
/// Blocking database work runs on the tokio blocking pool.
#[derive(Clone)]
pub struct SqliteEngagementStore {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for SqliteEngagementStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteEngagementStore").finish_non_exhaustive()
    }
}

impl SqliteEngagementStore {
    /// Open (or create) a database file, creating parent directories
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                MurmurError::Persistence(format!(
                    "Failed to create store directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let conn = Connection::open(path)?;
        tracing::debug!(path = %path.display(), "Opened engagement store");
        Self::with_connection(conn)
    }

    /// In-memory database, mainly for tests
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| MurmurError::Persistence("Engagement store lock poisoned".into()))?;
            f(&conn)
        })
        .await
        .map_err(|e| MurmurError::Persistence(format!("Store task failed: {}", e)))?
    }
}

fn parse_time(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| MurmurError::Persistence(format!("Invalid timestamp '{}': {}", value, e)))
}

type Row = (f64, i64, Option<String>, Option<String>, String, String);

fn row_to_record(row: Row) -> Result<EngagementRecord> {
    let (heartbeat, is_tense, tense_expiry, origin, focus, updated_at) = row;
    let is_tense = is_tense != 0;

    Ok(EngagementRecord {
        heartbeat,
        is_tense,
        tense_expiry: match tense_expiry {
            Some(value) if is_tense => Some(parse_time(&value)?),
            _ => None,
        },
        origin: origin.as_deref().and_then(TenseOrigin::parse),
        focus,
        updated_at: parse_time(&updated_at)?,
    })
}

#[async_trait]
impl EngagementStore for SqliteEngagementStore {
    async fn load(&self, scope: &str) -> Result<Option<EngagementRecord>> {
        let scope = scope.to_string();
        self.with_conn(move |conn| {
            let row: Option<Row> = conn
                .query_row(
                    "SELECT heartbeat, is_tense, tense_expiry, origin, focus, updated_at
                     FROM engagement_state WHERE scope = ?1",
                    params![scope],
                    |row| {
                        Ok((
                            row.get(0)?,
                            row.get(1)?,
                            row.get(2)?,
                            row.get(3)?,
                            row.get(4)?,
                            row.get(5)?,
                        ))
                    },
                )
                .optional()?;
            row.map(row_to_record).transpose()
        })
        .await
    }

    async fn save(&self, scope: &str, record: &EngagementRecord) -> Result<()> {
        let scope = scope.to_string();
        let record = record.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO engagement_state
                 (scope, heartbeat, is_tense, tense_expiry, origin, focus, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    scope,
                    record.heartbeat,
                    record.is_tense as i64,
                    record.tense_expiry.map(|t| t.to_rfc3339()),
                    record.origin.map(|o| o.as_str()),
                    record.focus,
                    record.updated_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn scopes(&self) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT scope FROM engagement_state ORDER BY scope")?;
            let scopes = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(scopes)
        })
        .await
    }
}
