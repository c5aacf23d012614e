//! Lifecycle of interactive check-in reminders.
//!
//! Each dispatched reminder is a [`ReminderPrompt`] that starts Active and
//! becomes Expired exactly once: when its timer fires, when a response shows
//! up at or after its expiry instant, or when a newer reminder has been posted
//! to the same channel. Expired is terminal. Membership in the responded-set is
//! checked and set under the prompt's own lock before the ledger is touched,
//! and rolled back if the ledger append fails.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::core::ledger::{CheckInStatus, CheckInStore, LedgerError};
use crate::core::messenger::{ChatMessenger, MessageRef, StatusChange};

/// Attempts made to strip the buttons from an expired reminder.
const CLOSE_ATTEMPTS: u32 = 3;
const DEFAULT_CLOSE_BACKOFF: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptStatus {
    Active,
    Expired,
}

#[derive(Debug)]
pub struct ReminderPrompt {
    pub id: Uuid,
    pub channel: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    responded: HashSet<String>,
    status: PromptStatus,
    message: Option<MessageRef>,
    closing: bool,
    timer: Option<AbortHandle>,
}

impl ReminderPrompt {
    fn new(id: Uuid, channel: &str, created_at: DateTime<Utc>, timeout: Duration) -> Self {
        let timeout = chrono::Duration::from_std(timeout).unwrap_or(chrono::Duration::zero());
        Self {
            id,
            channel: channel.to_string(),
            created_at,
            expires_at: created_at + timeout,
            responded: HashSet::new(),
            status: PromptStatus::Active,
            message: None,
            closing: false,
            timer: None,
        }
    }

    /// The lazy check must agree with the timer, which fires at `expires_at`.
    fn is_expired_at(&self, at: DateTime<Utc>) -> bool {
        self.status == PromptStatus::Expired || at >= self.expires_at
    }
}

/// Result of a button click against a prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseOutcome {
    Accepted(StatusChange),
    AlreadyResponded,
    Expired,
}

#[derive(Debug, thiserror::Error)]
pub enum ReminderError {
    #[error("check-in for {subject} could not be recorded: {source}")]
    Ledger {
        subject: String,
        #[source]
        source: LedgerError,
    },

    #[error("failed to post reminder to {channel}: {reason}")]
    Dispatch { channel: String, reason: String },
}

#[derive(Default)]
struct Registry {
    prompts: HashMap<Uuid, Arc<Mutex<ReminderPrompt>>>,
    active_by_channel: HashMap<String, (Uuid, DateTime<Utc>)>,
}

/// Owner of every outstanding prompt.
#[derive(Clone)]
pub struct ReminderManager {
    registry: Arc<Mutex<Registry>>,
    ledger: Arc<dyn CheckInStore>,
    messenger: Arc<dyn ChatMessenger>,
    timeout: Duration,
    close_backoff: Duration,
}

impl ReminderManager {
    pub fn new(
        ledger: Arc<dyn CheckInStore>,
        messenger: Arc<dyn ChatMessenger>,
        timeout: Duration,
    ) -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry::default())),
            ledger,
            messenger,
            timeout,
            close_backoff: DEFAULT_CLOSE_BACKOFF,
        }
    }

    pub fn with_close_backoff(mut self, backoff: Duration) -> Self {
        self.close_backoff = backoff;
        self
    }

    /// Post a new reminder to `channel` and start its expiry timer.
    pub async fn send_reminder(&self, channel: &str) -> Result<Uuid, ReminderError> {
        self.dispatch_at(channel, Utc::now()).await
    }

    pub async fn dispatch_at(
        &self,
        channel: &str,
        now: DateTime<Utc>,
    ) -> Result<Uuid, ReminderError> {
        let id = Uuid::new_v4();
        let prompt = Arc::new(Mutex::new(ReminderPrompt::new(
            id,
            channel,
            now,
            self.timeout,
        )));

        // Known before posting so an early click never sees an unknown id. The
        // channel's current reminder stays live until this post has landed.
        self.registry.lock().await.prompts.insert(id, prompt.clone());

        let message = match self.messenger.post_reminder(channel, id, now).await {
            Ok(message) => message,
            Err(e) => {
                self.forget(id).await;
                error!("Error sending reminder to {}: {}", channel, e);
                return Err(ReminderError::Dispatch {
                    channel: channel.to_string(),
                    reason: e.to_string(),
                });
            }
        };

        let expired_in_flight = {
            let mut p = prompt.lock().await;
            p.message = Some(message.clone());
            if !p.closing {
                let manager = self.clone();
                let timeout = self.timeout;
                let timer = tokio::spawn(async move {
                    tokio::time::sleep(timeout).await;
                    manager.expire(id).await;
                });
                p.timer = Some(timer.abort_handle());
            }
            p.closing
        };
        if expired_in_flight {
            // Expired while the post was in flight; the buttons are live now.
            info!("Reminder {} expired before its post landed, closing it", id);
            self.close_with_retry(&message, id).await;
            self.forget(id).await;
            return Ok(id);
        }

        let outdated = {
            let mut reg = self.registry.lock().await;
            if !reg.prompts.contains_key(&id) {
                if let Some(timer) = prompt.lock().await.timer.take() {
                    timer.abort();
                }
                debug!("Reminder {} dropped during shutdown", id);
                return Ok(id);
            }
            match reg.active_by_channel.get(channel).copied() {
                Some((_, current_at)) if current_at > now => Some((id, prompt.clone())),
                previous => {
                    reg.active_by_channel.insert(channel.to_string(), (id, now));
                    previous
                        .and_then(|(old, _)| reg.prompts.get(&old).cloned().map(|p| (old, p)))
                }
            }
        };

        match outdated {
            Some((old_id, old_prompt)) if old_id != id => {
                info!("Reminder {} superseded by {} in {}", old_id, id, channel);
                self.retire(old_id, old_prompt).await;
            }
            Some((_, own)) => {
                info!("Reminder {} landed after a newer one in {}", id, channel);
                self.retire(id, own).await;
                return Ok(id);
            }
            None => {}
        }

        info!(
            "Check-in reminder {} sent to {} (expires in {}s)",
            id,
            channel,
            self.timeout.as_secs()
        );
        Ok(id)
    }

    /// Mark a replaced prompt expired, cancel its timer and close it in the background.
    async fn retire(&self, prompt_id: Uuid, prompt: Arc<Mutex<ReminderPrompt>>) {
        {
            let mut p = prompt.lock().await;
            p.status = PromptStatus::Expired;
            if let Some(timer) = p.timer.take() {
                timer.abort();
            }
        }
        let manager = self.clone();
        tokio::spawn(async move {
            manager.expire(prompt_id).await;
        });
    }

    /// Apply one button click. Unknown prompts are treated as expired.
    pub async fn respond(
        &self,
        prompt_id: Uuid,
        subject: &str,
        status: CheckInStatus,
        arrival: DateTime<Utc>,
    ) -> Result<ResponseOutcome, ReminderError> {
        let prompt = self.registry.lock().await.prompts.get(&prompt_id).cloned();
        let Some(prompt) = prompt else {
            debug!("Response from {} to unknown reminder {}", subject, prompt_id);
            return Ok(ResponseOutcome::Expired);
        };

        let channel = {
            let mut p = prompt.lock().await;
            if p.is_expired_at(arrival) {
                p.status = PromptStatus::Expired;
                return Ok(ResponseOutcome::Expired);
            }
            if !p.responded.insert(subject.to_string()) {
                return Ok(ResponseOutcome::AlreadyResponded);
            }
            p.channel.clone()
        };

        match self.ledger.append(subject, status, arrival).await {
            Ok(event) => Ok(ResponseOutcome::Accepted(StatusChange {
                channel,
                subject: event.subject,
                status: event.status,
                at: event.at,
            })),
            Err(source) => {
                prompt.lock().await.responded.remove(subject);
                error!(
                    "Error recording check-in for {} on reminder {}: {}",
                    subject, prompt_id, source
                );
                Err(ReminderError::Ledger {
                    subject: subject.to_string(),
                    source,
                })
            }
        }
    }

    /// Expire a prompt, strip its buttons, then release it. No-op for prompts
    /// that are unknown or already being closed.
    pub async fn expire(&self, prompt_id: Uuid) {
        let prompt = self.registry.lock().await.prompts.get(&prompt_id).cloned();
        let Some(prompt) = prompt else {
            debug!("Expiry for unknown reminder {} ignored", prompt_id);
            return;
        };

        let (message, sent_at, responses) = {
            let mut p = prompt.lock().await;
            if p.closing {
                return;
            }
            p.closing = true;
            p.status = PromptStatus::Expired;
            (p.message.clone(), p.created_at, p.responded.len())
        };

        if let Some(message) = message {
            self.close_with_retry(&message, prompt_id).await;
        }
        self.forget(prompt_id).await;
        info!(
            "Check-in reminder {} (sent {}) expired with {} response(s)",
            prompt_id, sent_at, responses
        );
    }

    async fn close_with_retry(&self, message: &MessageRef, prompt_id: Uuid) -> bool {
        for attempt in 1..=CLOSE_ATTEMPTS {
            match self
                .messenger
                .close_reminder(message, prompt_id, Utc::now())
                .await
            {
                Ok(()) => return true,
                Err(e) => {
                    warn!(
                        "Closing reminder {} failed (attempt {}/{}): {}",
                        prompt_id, attempt, CLOSE_ATTEMPTS, e
                    );
                    if attempt < CLOSE_ATTEMPTS {
                        tokio::time::sleep(self.close_backoff * attempt).await;
                    }
                }
            }
        }
        error!(
            "Giving up on closing reminder {} after {} attempts",
            prompt_id, CLOSE_ATTEMPTS
        );
        false
    }

    async fn forget(&self, prompt_id: Uuid) {
        let mut reg = self.registry.lock().await;
        reg.prompts.remove(&prompt_id);
        reg.active_by_channel.retain(|_, (id, _)| *id != prompt_id);
    }

    pub async fn active_count(&self) -> usize {
        self.registry.lock().await.prompts.len()
    }

    /// Abort every pending expiry timer and drop all prompts.
    pub async fn shutdown(&self) {
        let prompts: Vec<_> = {
            let mut reg = self.registry.lock().await;
            reg.active_by_channel.clear();
            reg.prompts.drain().map(|(_, p)| p).collect()
        };
        let count = prompts.len();
        for prompt in prompts {
            if let Some(timer) = prompt.lock().await.timer.take() {
                timer.abort();
            }
        }
        info!("Reminder manager shut down ({} prompt(s) dropped)", count);
    }

    #[cfg(test)]
    pub(crate) async fn prompt_snapshot(&self, prompt_id: Uuid) -> Option<(PromptStatus, usize)> {
        let prompt = self.registry.lock().await.prompts.get(&prompt_id).cloned()?;
        let p = prompt.lock().await;
        Some((p.status, p.responded.len()))
    }

    #[cfg(test)]
    pub(crate) async fn timer_handle(&self, prompt_id: Uuid) -> Option<AbortHandle> {
        let prompt = self.registry.lock().await.prompts.get(&prompt_id).cloned()?;
        prompt.lock().await.timer.clone()
    }

    #[cfg(test)]
    pub(crate) async fn has_responded(&self, prompt_id: Uuid, subject: &str) -> bool {
        let prompt = self.registry.lock().await.prompts.get(&prompt_id).cloned();
        match prompt {
            Some(p) => p.lock().await.responded.contains(subject),
            None => false,
        }
    }
}
