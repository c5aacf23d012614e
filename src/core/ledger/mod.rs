pub mod types;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use std::ops::Range;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

pub use types::{CheckInEvent, CheckInStatus, SubjectFilter};

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("ledger storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("ledger directory error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unknown status '{0}' stored in ledger")]
    InvalidStatus(String),

    #[error("timestamp {0} is out of range")]
    InvalidTimestamp(i64),
}

/// Append-only store of check-in events.
#[async_trait]
pub trait CheckInStore: Send + Sync {
    async fn append(
        &self,
        subject: &str,
        status: CheckInStatus,
        at: DateTime<Utc>,
    ) -> Result<CheckInEvent, LedgerError>;

    /// Events in `range` (start inclusive, end exclusive), ordered by timestamp
    /// then insertion order.
    async fn query(
        &self,
        subject: SubjectFilter<'_>,
        range: Range<DateTime<Utc>>,
    ) -> Result<Vec<CheckInEvent>, LedgerError>;
}

/// SQLite-backed ledger. Timestamps are stored as UTC unix milliseconds.
pub struct Ledger {
    db: Arc<Mutex<Connection>>,
}

impl Ledger {
    pub async fn open<P: AsRef<Path>>(db_path: P) -> Result<Self, LedgerError> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent)?;
        }
        let db = Connection::open(db_path)?;
        Self::with_connection(db)
    }

    pub fn open_in_memory() -> Result<Self, LedgerError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(db: Connection) -> Result<Self, LedgerError> {
        db.execute(
            "CREATE TABLE IF NOT EXISTS checkins (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                subject TEXT NOT NULL,
                status TEXT NOT NULL,
                recorded_at INTEGER NOT NULL
            )",
            [],
        )?;
        db.execute(
            "CREATE INDEX IF NOT EXISTS idx_checkins_subject_recorded ON checkins(subject, recorded_at)",
            [],
        )?;
        db.execute(
            "CREATE INDEX IF NOT EXISTS idx_checkins_recorded ON checkins(recorded_at)",
            [],
        )?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }

    #[cfg(test)]
    pub fn get_db(&self) -> Arc<Mutex<Connection>> {
        self.db.clone()
    }
}

fn row_to_event(
    seq: i64,
    subject: String,
    status: String,
    millis: i64,
) -> Result<CheckInEvent, LedgerError> {
    let status = status
        .parse::<CheckInStatus>()
        .map_err(LedgerError::InvalidStatus)?;
    let at = DateTime::<Utc>::from_timestamp_millis(millis)
        .ok_or(LedgerError::InvalidTimestamp(millis))?;
    Ok(CheckInEvent {
        seq,
        subject,
        status,
        at,
    })
}

#[async_trait]
impl CheckInStore for Ledger {
    async fn append(
        &self,
        subject: &str,
        status: CheckInStatus,
        at: DateTime<Utc>,
    ) -> Result<CheckInEvent, LedgerError> {
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO checkins (subject, status, recorded_at) VALUES (?1, ?2, ?3)",
            params![subject, status.as_str(), at.timestamp_millis()],
        )?;
        let seq = db.last_insert_rowid();
        info!("Recorded check-in: {} - {} at {}", subject, status, at);
        Ok(CheckInEvent {
            seq,
            subject: subject.to_string(),
            status,
            at,
        })
    }

    async fn query(
        &self,
        subject: SubjectFilter<'_>,
        range: Range<DateTime<Utc>>,
    ) -> Result<Vec<CheckInEvent>, LedgerError> {
        let start = range.start.timestamp_millis();
        let end = range.end.timestamp_millis();
        let db = self.db.lock().await;

        let raw: Vec<(i64, String, String, i64)> = match subject {
            SubjectFilter::All => {
                let mut stmt = db.prepare(
                    "SELECT id, subject, status, recorded_at FROM checkins
                     WHERE recorded_at >= ?1 AND recorded_at < ?2
                     ORDER BY recorded_at ASC, id ASC",
                )?;
                let rows = stmt.query_map(params![start, end], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
                })?;
                rows.collect::<Result<_, _>>()?
            }
            SubjectFilter::Only(subject) => {
                let mut stmt = db.prepare(
                    "SELECT id, subject, status, recorded_at FROM checkins
                     WHERE subject = ?1 AND recorded_at >= ?2 AND recorded_at < ?3
                     ORDER BY recorded_at ASC, id ASC",
                )?;
                let rows = stmt.query_map(params![subject, start, end], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
                })?;
                rows.collect::<Result<_, _>>()?
            }
        };

        raw.into_iter()
            .map(|(seq, subject, status, millis)| row_to_event(seq, subject, status, millis))
            .collect()
    }
}
