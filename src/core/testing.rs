//! In-process fakes shared by unit tests.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::ops::Range;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::{Mutex, Notify};
use uuid::Uuid;

use crate::core::ledger::{
    CheckInEvent, CheckInStatus, CheckInStore, Ledger, LedgerError, SubjectFilter,
};
use crate::core::messenger::{ChatMessenger, MessageRef, StatusChange};
use crate::core::worktime::DailySummary;

/// Messenger that records every call instead of talking to Slack.
#[derive(Default)]
pub struct RecordingMessenger {
    pub posted: Mutex<Vec<(String, Uuid)>>,
    pub closed: Mutex<Vec<Uuid>>,
    pub status_changes: Mutex<Vec<StatusChange>>,
    pub reports: Mutex<Vec<(String, NaiveDate, usize)>>,
    pub close_attempts: AtomicUsize,
    pub fail_posts: AtomicBool,
    pub fail_closes: AtomicBool,
    /// When set, reminder posts are recorded and then held until notified.
    pub post_gate: Mutex<Option<Arc<Notify>>>,
}

impl RecordingMessenger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl ChatMessenger for RecordingMessenger {
    async fn post_reminder(
        &self,
        channel: &str,
        prompt_id: Uuid,
        _sent_at: DateTime<Utc>,
    ) -> Result<MessageRef> {
        if self.fail_posts.load(Ordering::SeqCst) {
            return Err(anyhow!("channel_not_found"));
        }
        let ts = {
            let mut posted = self.posted.lock().await;
            posted.push((channel.to_string(), prompt_id));
            format!("1700000000.{:06}", posted.len())
        };
        let gate = self.post_gate.lock().await.clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        Ok(MessageRef {
            channel: channel.to_string(),
            ts,
        })
    }

    async fn close_reminder(
        &self,
        _message: &MessageRef,
        prompt_id: Uuid,
        _closed_at: DateTime<Utc>,
    ) -> Result<()> {
        self.close_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_closes.load(Ordering::SeqCst) {
            return Err(anyhow!("message_not_found"));
        }
        self.closed.lock().await.push(prompt_id);
        Ok(())
    }

    async fn post_status_change(&self, change: &StatusChange) -> Result<()> {
        self.status_changes.lock().await.push(change.clone());
        Ok(())
    }

    async fn post_report(
        &self,
        channel: &str,
        date: NaiveDate,
        summaries: &[DailySummary],
    ) -> Result<()> {
        self.reports
            .lock()
            .await
            .push((channel.to_string(), date, summaries.len()));
        Ok(())
    }
}

/// In-memory ledger whose appends can be made to fail on demand.
pub struct FlakyStore {
    pub inner: Ledger,
    pub fail_appends: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Ledger::open_in_memory().expect("in-memory ledger"),
            fail_appends: AtomicBool::new(false),
        })
    }

    pub async fn all_events(&self) -> Vec<CheckInEvent> {
        let range = DateTime::<Utc>::MIN_UTC..DateTime::<Utc>::MAX_UTC;
        self.inner
            .query(SubjectFilter::All, range)
            .await
            .expect("query ledger")
    }
}

#[async_trait]
impl CheckInStore for FlakyStore {
    async fn append(
        &self,
        subject: &str,
        status: CheckInStatus,
        at: DateTime<Utc>,
    ) -> Result<CheckInEvent, LedgerError> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(LedgerError::Storage(rusqlite::Error::InvalidQuery));
        }
        self.inner.append(subject, status, at).await
    }

    async fn query(
        &self,
        subject: SubjectFilter<'_>,
        range: Range<DateTime<Utc>>,
    ) -> Result<Vec<CheckInEvent>, LedgerError> {
        self.inner.query(subject, range).await
    }
}
