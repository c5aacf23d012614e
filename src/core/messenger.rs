use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::core::ledger::CheckInStatus;
use crate::core::worktime::DailySummary;

/// Where a posted reminder lives, so it can be edited when it expires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRef {
    pub channel: String,
    pub ts: String,
}

/// Notification emitted for every accepted check-in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusChange {
    pub channel: String,
    pub subject: String,
    pub status: CheckInStatus,
    pub at: DateTime<Utc>,
}

/// Outbound side of the chat platform.
#[async_trait]
pub trait ChatMessenger: Send + Sync {
    /// Post the interactive reminder whose buttons carry `prompt_id`.
    async fn post_reminder(
        &self,
        channel: &str,
        prompt_id: Uuid,
        sent_at: DateTime<Utc>,
    ) -> Result<MessageRef>;

    /// Replace the reminder with a copy that has no buttons.
    async fn close_reminder(
        &self,
        message: &MessageRef,
        prompt_id: Uuid,
        closed_at: DateTime<Utc>,
    ) -> Result<()>;

    async fn post_status_change(&self, change: &StatusChange) -> Result<()>;

    async fn post_report(
        &self,
        channel: &str,
        date: NaiveDate,
        summaries: &[DailySummary],
    ) -> Result<()>;
}
