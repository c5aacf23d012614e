use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::ServeArgs;
use crate::core::bot::{BotComponent, CheckInBot};
use crate::core::config::BotConfig;
use crate::core::ledger::Ledger;
use crate::core::lifecycle::LifecycleManager;
use crate::core::schedule::{self, register_jobs};
use crate::core::terminal::{print_goodbye, print_status, print_success};
use crate::interfaces::slack::{SlackMessenger, SlackServer, SlackState};
use crate::logging::init_logging;

pub async fn run_server(args: ServeArgs) -> Result<()> {
    let mut config = BotConfig::load(&args.config)?;
    if let Some(port) = args.port {
        config.server.port = port;
    }
    init_logging(&config.log.level, config.log.file.as_deref())?;
    let zone = config.zone()?;

    info!("Starting shiftbot (timezone {})...", zone.tz());
    if config.slack.bot_token.is_empty() {
        warn!("SLACK_BOT_TOKEN is not set; Slack API calls will fail.");
    }

    let ledger = Ledger::open(&config.storage.db_path)
        .await
        .with_context(|| format!("opening ledger at {}", config.storage.db_path.display()))?;
    info!("Ledger opened at {}", config.storage.db_path.display());

    let slack = Arc::new(SlackMessenger::new(
        &config.slack.bot_token,
        zone,
        config.report.history_limit,
    ));
    let bot = Arc::new(CheckInBot::new(
        &config,
        zone,
        Arc::new(ledger),
        slack.clone(),
    ));

    let mut lifecycle = LifecycleManager::new().await?;
    lifecycle.attach(Arc::new(Mutex::new(BotComponent(bot.clone()))));
    lifecycle.attach(Arc::new(Mutex::new(SlackServer::new(
        &config.server.host,
        config.server.port,
        SlackState {
            bot: bot.clone(),
            slack,
            signing_secret: config.slack.signing_secret.clone(),
        },
    ))));

    let reminder = schedule::reminder_schedule(&config.reminder);
    let report = schedule::report_schedule(&config.report);
    register_jobs(&lifecycle.scheduler, bot.clone(), &reminder, &report).await?;

    lifecycle.start().await?;
    info!("shiftbot lifecycle state: {:?}", lifecycle.state());

    print_success("shiftbot is running. Press Ctrl+C to stop.");
    print_status(
        "Reminders",
        &format!(
            "{} (closes after {} min)",
            reminder.description, config.reminder.timeout_minutes
        ),
    );
    print_status("Daily report", &report.description);
    print_status(
        "Webhooks",
        &format!("http://{}:{}/slack/events", config.server.host, config.server.port),
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutting down shiftbot...");
    lifecycle.shutdown().await?;
    print_goodbye();

    Ok(())
}
