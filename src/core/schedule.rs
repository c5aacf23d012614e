//! Cron schedules for reminders and the daily report.
//!
//! Expressions use the six-field form (seconds first) accepted by
//! `tokio_cron_scheduler`, evaluated in the reference zone.

use anyhow::Result;
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

use crate::core::bot::CheckInBot;
use crate::core::config::{ReminderConfig, ReportConfig};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    pub cron: String,
    pub description: String,
}

/// Minute-based intervals win over hour-based ones. Out-of-range values fall
/// back to hourly at minute 0.
pub fn reminder_schedule(config: &ReminderConfig) -> CronSchedule {
    if let Some(minutes) = config.interval_minutes.filter(|m| *m > 0) {
        return if minutes == 1 {
            CronSchedule {
                cron: "0 * * * * *".to_string(),
                description: "every minute".to_string(),
            }
        } else {
            CronSchedule {
                cron: format!("0 */{} * * * *", minutes),
                description: format!("every {} minutes", minutes),
            }
        };
    }

    let minute = if config.minute > 59 {
        warn!("Invalid reminder minute ({}), using 0", config.minute);
        0
    } else {
        config.minute
    };
    let hours = if config.interval_hours.is_finite() && config.interval_hours > 0.0 {
        config.interval_hours
    } else {
        warn!(
            "Invalid reminder interval ({} hours), using 1",
            config.interval_hours
        );
        1.0
    };

    if hours == 1.0 {
        CronSchedule {
            cron: format!("0 {} * * * *", minute),
            description: format!("every hour at minute {}", minute),
        }
    } else if hours < 1.0 {
        let minutes = (hours * 60.0).floor() as u32;
        if minutes == 0 {
            CronSchedule {
                cron: "0 0 * * * *".to_string(),
                description: "every hour at minute 0".to_string(),
            }
        } else {
            CronSchedule {
                cron: format!("0 */{} * * * *", minutes),
                description: format!("every {} minutes", minutes),
            }
        }
    } else {
        let hours = hours.floor() as u32;
        CronSchedule {
            cron: format!("0 {} */{} * * *", minute, hours),
            description: format!("every {} hours at minute {}", hours, minute),
        }
    }
}

pub fn report_schedule(config: &ReportConfig) -> CronSchedule {
    let hour = if config.hour > 23 {
        warn!("Invalid report hour ({}), using 18", config.hour);
        18
    } else {
        config.hour
    };
    let minute = if config.minute > 59 {
        warn!("Invalid report minute ({}), using 0", config.minute);
        0
    } else {
        config.minute
    };
    CronSchedule {
        cron: format!("0 {} {} * * *", minute, hour),
        description: format!("daily at {:02}:{:02}", hour, minute),
    }
}

/// Register the reminder and daily report jobs. A job that fails to build is
/// logged and skipped so the other one still runs.
pub async fn register_jobs(
    scheduler: &JobScheduler,
    bot: Arc<CheckInBot>,
    reminder: &CronSchedule,
    report: &CronSchedule,
) -> Result<()> {
    let tz = bot.zone().tz();

    let reminder_bot = bot.clone();
    match Job::new_async_tz(reminder.cron.as_str(), tz, move |_uuid, mut _l| {
        let bot = reminder_bot.clone();
        Box::pin(async move {
            bot.send_reminder().await;
        })
    }) {
        Ok(job) => {
            scheduler.add(job).await?;
            info!(
                "Reminders scheduled {} ({}) in {}",
                reminder.description, reminder.cron, tz
            );
        }
        Err(e) => error!("Failed to create reminder job '{}': {}", reminder.cron, e),
    }

    let report_bot = bot;
    match Job::new_async_tz(report.cron.as_str(), tz, move |_uuid, mut _l| {
        let bot = report_bot.clone();
        Box::pin(async move {
            bot.broadcast_daily_report().await;
        })
    }) {
        Ok(job) => {
            scheduler.add(job).await?;
            info!(
                "Daily report scheduled {} ({}) in {}",
                report.description, report.cron, tz
            );
        }
        Err(e) => error!("Failed to create daily report job '{}': {}", report.cron, e),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reminder(minutes: Option<u32>, hours: f64, minute: u32) -> ReminderConfig {
        ReminderConfig {
            interval_minutes: minutes,
            interval_hours: hours,
            minute,
            ..ReminderConfig::default()
        }
    }

    #[test]
    fn minute_intervals_take_priority() {
        assert_eq!(reminder_schedule(&reminder(Some(1), 3.0, 15)).cron, "0 * * * * *");
        assert_eq!(
            reminder_schedule(&reminder(Some(20), 3.0, 15)).cron,
            "0 */20 * * * *"
        );
    }

    #[test]
    fn zero_minutes_falls_back_to_hours() {
        assert_eq!(reminder_schedule(&reminder(Some(0), 1.0, 5)).cron, "0 5 * * * *");
    }

    #[test]
    fn hourly_at_configured_minute() {
        let schedule = reminder_schedule(&reminder(None, 1.0, 30));
        assert_eq!(schedule.cron, "0 30 * * * *");
        assert_eq!(schedule.description, "every hour at minute 30");
    }

    #[test]
    fn fractional_hours_become_minutes() {
        assert_eq!(reminder_schedule(&reminder(None, 0.5, 0)).cron, "0 */30 * * * *");
        assert_eq!(reminder_schedule(&reminder(None, 0.001, 0)).cron, "0 0 * * * *");
    }

    #[test]
    fn multi_hour_intervals() {
        assert_eq!(reminder_schedule(&reminder(None, 2.0, 10)).cron, "0 10 */2 * * *");
    }

    #[test]
    fn out_of_range_values_fall_back() {
        assert_eq!(reminder_schedule(&reminder(None, 1.0, 75)).cron, "0 0 * * * *");
        assert_eq!(reminder_schedule(&reminder(None, -2.0, 0)).cron, "0 0 * * * *");
        assert_eq!(reminder_schedule(&reminder(None, f64::NAN, 0)).cron, "0 0 * * * *");
    }

    #[test]
    fn report_runs_daily() {
        let config = ReportConfig {
            hour: 17,
            minute: 45,
            ..ReportConfig::default()
        };
        let schedule = report_schedule(&config);
        assert_eq!(schedule.cron, "0 45 17 * * *");
        assert_eq!(schedule.description, "daily at 17:45");

        let invalid = ReportConfig {
            hour: 30,
            minute: 0,
            ..ReportConfig::default()
        };
        assert_eq!(report_schedule(&invalid).cron, "0 0 18 * * *");
    }

    #[tokio::test]
    async fn jobs_register_on_a_scheduler() {
        use crate::core::config::BotConfig;
        use crate::core::testing::{FlakyStore, RecordingMessenger};

        let config = BotConfig::default();
        let bot = Arc::new(CheckInBot::new(
            &config,
            config.zone().unwrap(),
            FlakyStore::new(),
            RecordingMessenger::new(),
        ));
        let scheduler = JobScheduler::new().await.unwrap();
        register_jobs(
            &scheduler,
            bot,
            &reminder_schedule(&config.reminder),
            &report_schedule(&config.report),
        )
        .await
        .unwrap();
    }
}
