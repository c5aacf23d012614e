use anyhow::{Context, Result};
use chrono::Utc;

use super::ReportArgs;
use crate::core::config::BotConfig;
use crate::core::ledger::{CheckInStore, Ledger, SubjectFilter};
use crate::core::terminal::{print_report, print_warn};
use crate::core::worktime::summarize_day;

/// Summarize one day straight from the ledger file, without Slack.
pub async fn run_report(args: ReportArgs) -> Result<()> {
    let config = BotConfig::load(&args.config)?;
    let zone = config.zone()?;
    let db_path = &config.storage.db_path;
    if !db_path.exists() {
        print_warn(&format!("No ledger at {}", db_path.display()));
        return Ok(());
    }

    let ledger = Ledger::open(db_path)
        .await
        .with_context(|| format!("opening ledger at {}", db_path.display()))?;
    let date = args.date.unwrap_or_else(|| zone.today(Utc::now()));
    let events = ledger
        .query(
            SubjectFilter::from(args.subject.as_deref()),
            zone.day_bounds(date),
        )
        .await?;
    let summaries = summarize_day(date, &events, &config.report.tracked_subjects);
    print_report(date, &summaries, zone, config.report.history_limit);
    Ok(())
}
