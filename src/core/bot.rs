use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::core::config::BotConfig;
use crate::core::ledger::{CheckInStatus, CheckInStore, LedgerError, SubjectFilter};
use crate::core::lifecycle::LifecycleComponent;
use crate::core::messenger::ChatMessenger;
use crate::core::reminder::{ReminderError, ReminderManager, ResponseOutcome};
use crate::core::worktime::{DailySummary, summarize_day};
use crate::core::zone::ReferenceZone;

/// The check-in service shared by the scheduler and the Slack handlers.
pub struct CheckInBot {
    ledger: Arc<dyn CheckInStore>,
    messenger: Arc<dyn ChatMessenger>,
    reminders: ReminderManager,
    zone: ReferenceZone,
    channel: RwLock<Option<String>>,
    priority: Vec<String>,
}

impl CheckInBot {
    pub fn new(
        config: &BotConfig,
        zone: ReferenceZone,
        ledger: Arc<dyn CheckInStore>,
        messenger: Arc<dyn ChatMessenger>,
    ) -> Self {
        let reminders =
            ReminderManager::new(ledger.clone(), messenger.clone(), config.reminder_timeout());
        Self {
            ledger,
            messenger,
            reminders,
            zone,
            channel: RwLock::new(config.slack.channel.clone()),
            priority: config.report.tracked_subjects.clone(),
        }
    }

    pub fn zone(&self) -> ReferenceZone {
        self.zone
    }

    pub fn reminders(&self) -> &ReminderManager {
        &self.reminders
    }

    pub async fn channel(&self) -> Option<String> {
        self.channel.read().await.clone()
    }

    pub async fn set_channel(&self, channel: &str) {
        *self.channel.write().await = Some(channel.to_string());
        info!("Destination channel set to {}", channel);
    }

    /// Dispatch a reminder to the destination channel, if one is configured.
    pub async fn send_reminder(&self) -> Option<Uuid> {
        let Some(channel) = self.channel().await else {
            warn!("Channel ID not set. Skipping reminder.");
            return None;
        };
        match self.reminders.send_reminder(&channel).await {
            Ok(id) => Some(id),
            Err(e) => {
                error!("Reminder dispatch failed: {}", e);
                None
            }
        }
    }

    /// Validate a click and, when accepted, announce the status change.
    /// A failed announcement does not undo the recorded check-in.
    pub async fn handle_response(
        &self,
        prompt_id: Uuid,
        subject: &str,
        status: CheckInStatus,
        arrival: DateTime<Utc>,
    ) -> Result<ResponseOutcome, ReminderError> {
        let outcome = self
            .reminders
            .respond(prompt_id, subject, status, arrival)
            .await?;
        if let ResponseOutcome::Accepted(change) = &outcome
            && let Err(e) = self.messenger.post_status_change(change).await
        {
            warn!(
                "Check-in for {} recorded but the channel notice failed: {}",
                subject, e
            );
        }
        Ok(outcome)
    }

    /// Summaries for `date` in the reference zone, optionally for one subject.
    pub async fn daily_report(
        &self,
        subject: Option<&str>,
        date: NaiveDate,
    ) -> Result<Vec<DailySummary>, LedgerError> {
        let events = self
            .ledger
            .query(SubjectFilter::from(subject), self.zone.day_bounds(date))
            .await?;
        Ok(summarize_day(date, &events, &self.priority))
    }

    pub fn today(&self) -> NaiveDate {
        self.zone.today(Utc::now())
    }

    /// Post today's report to the destination channel. Returns whether it was sent.
    pub async fn broadcast_daily_report(&self) -> bool {
        let Some(channel) = self.channel().await else {
            warn!("Channel ID not set. Skipping daily report.");
            return false;
        };
        let date = self.today();
        let summaries = match self.daily_report(None, date).await {
            Ok(s) => s,
            Err(e) => {
                error!("Error generating report for {}: {}", date, e);
                return false;
            }
        };
        match self.messenger.post_report(&channel, date, &summaries).await {
            Ok(()) => {
                info!("Daily report for {} sent to {}", date, channel);
                true
            }
            Err(e) => {
                error!("Error sending daily report: {}", e);
                false
            }
        }
    }

    pub async fn shutdown(&self) {
        self.reminders.shutdown().await;
    }
}

/// Ties the bot to the process lifecycle so pending reminder timers stop on exit.
pub struct BotComponent(pub Arc<CheckInBot>);

#[async_trait::async_trait]
impl LifecycleComponent for BotComponent {
    async fn on_start(&mut self) -> anyhow::Result<()> {
        match self.0.channel().await {
            Some(channel) => info!("Check-in bot ready, posting to {}", channel),
            None => warn!("Check-in bot ready without a channel; use /set-channel"),
        }
        Ok(())
    }

    async fn on_shutdown(&mut self) -> anyhow::Result<()> {
        self.0.shutdown().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testing::{FlakyStore, RecordingMessenger};
    use chrono::{Duration, TimeZone};
    use std::sync::atomic::Ordering;

    fn bot_with(config: BotConfig) -> (CheckInBot, Arc<FlakyStore>, Arc<RecordingMessenger>) {
        let store = FlakyStore::new();
        let messenger = RecordingMessenger::new();
        let zone = config.zone().unwrap();
        let bot = CheckInBot::new(&config, zone, store.clone(), messenger.clone());
        (bot, store, messenger)
    }

    fn config_with_channel() -> BotConfig {
        let mut config = BotConfig::default();
        config.slack.channel = Some("C1".to_string());
        config
    }

    #[tokio::test]
    async fn reminder_is_skipped_without_channel() {
        let (bot, _, messenger) = bot_with(BotConfig::default());
        assert!(bot.send_reminder().await.is_none());
        assert!(messenger.posted.lock().await.is_empty());
    }

    #[tokio::test]
    async fn set_channel_enables_dispatch() {
        let (bot, _, messenger) = bot_with(BotConfig::default());
        bot.set_channel("C7").await;
        let id = bot.send_reminder().await.unwrap();
        assert_eq!(*messenger.posted.lock().await, vec![("C7".to_string(), id)]);
        bot.shutdown().await;
    }

    #[tokio::test]
    async fn accepted_response_is_announced() {
        let (bot, store, messenger) = bot_with(config_with_channel());
        let id = bot.send_reminder().await.unwrap();
        let outcome = bot
            .handle_response(id, "U1", CheckInStatus::Working, Utc::now())
            .await
            .unwrap();
        assert!(matches!(outcome, ResponseOutcome::Accepted(_)));
        let changes = messenger.status_changes.lock().await;
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].subject, "U1");
        assert_eq!(store.all_events().await.len(), 1);
        bot.shutdown().await;
    }

    #[tokio::test]
    async fn rejected_response_is_not_announced() {
        let (bot, _, messenger) = bot_with(config_with_channel());
        let id = bot.send_reminder().await.unwrap();
        bot.handle_response(id, "U1", CheckInStatus::Away, Utc::now())
            .await
            .unwrap();
        let again = bot
            .handle_response(id, "U1", CheckInStatus::Away, Utc::now())
            .await
            .unwrap();
        assert_eq!(again, ResponseOutcome::AlreadyResponded);
        assert_eq!(messenger.status_changes.lock().await.len(), 1);
        bot.shutdown().await;
    }

    #[tokio::test]
    async fn daily_report_only_uses_the_reference_day() {
        let mut config = config_with_channel();
        config.timezone = "Asia/Tokyo".to_string();
        let (bot, store, _) = bot_with(config);

        // 2026-05-12 in Tokyo runs from 05-11T15:00Z to 05-12T15:00Z.
        let day_start = Utc.with_ymd_and_hms(2026, 5, 11, 15, 0, 0).unwrap();
        store
            .append("U1", CheckInStatus::Working, day_start - Duration::minutes(30))
            .await
            .unwrap();
        store
            .append("U1", CheckInStatus::Working, day_start + Duration::hours(1))
            .await
            .unwrap();
        store
            .append("U1", CheckInStatus::Break, day_start + Duration::hours(3))
            .await
            .unwrap();

        let date = NaiveDate::from_ymd_opt(2026, 5, 12).unwrap();
        let summaries = bot.daily_report(None, date).await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].working_minutes, 120);
        assert_eq!(summaries[0].history.len(), 2);
    }

    #[tokio::test]
    async fn daily_report_filters_by_subject() {
        let (bot, store, _) = bot_with(config_with_channel());
        let t = Utc.with_ymd_and_hms(2026, 5, 12, 9, 0, 0).unwrap();
        store.append("U1", CheckInStatus::Working, t).await.unwrap();
        store.append("U2", CheckInStatus::Working, t).await.unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 5, 12).unwrap();
        let only = bot.daily_report(Some("U2"), date).await.unwrap();
        assert_eq!(only.len(), 1);
        assert_eq!(only[0].subject, "U2");
    }

    #[tokio::test]
    async fn broadcast_requires_channel() {
        let (bot, _, messenger) = bot_with(BotConfig::default());
        assert!(!bot.broadcast_daily_report().await);
        assert!(messenger.reports.lock().await.is_empty());

        bot.set_channel("C3").await;
        assert!(bot.broadcast_daily_report().await);
        let reports = messenger.reports.lock().await;
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].0, "C3");
    }

    #[tokio::test]
    async fn component_shutdown_drops_prompts() {
        let (bot, _, _) = bot_with(config_with_channel());
        let bot = Arc::new(bot);
        bot.send_reminder().await.unwrap();
        let mut component = BotComponent(bot.clone());
        component.on_start().await.unwrap();
        component.on_shutdown().await.unwrap();
        assert_eq!(bot.reminders().active_count().await, 0);
    }

    #[tokio::test]
    async fn failed_dispatch_is_logged_not_propagated() {
        let (bot, _, messenger) = bot_with(config_with_channel());
        messenger.fail_posts.store(true, Ordering::SeqCst);
        assert!(bot.send_reminder().await.is_none());
        assert_eq!(bot.reminders().active_count().await, 0);
    }
}
