//! Working-time reconstruction from the check-in stream.
//!
//! A subject is credited while in the Working status, between consecutive
//! check-ins. A Working check-in while already working closes the running
//! interval and opens a new one at the same instant, so re-confirmations never
//! lose time. Nothing is credited after the last check-in of the day.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::HashMap;

use crate::core::ledger::{CheckInEvent, CheckInStatus};

/// Whole minutes for one closed interval, rounding half up (30 s rounds up).
fn interval_minutes(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    let secs = (end - start).num_seconds().max(0);
    (secs + 30) / 60
}

/// Total working minutes for one subject's chronologically sorted events.
pub fn working_minutes(events: &[CheckInEvent]) -> i64 {
    let mut open_start: Option<DateTime<Utc>> = None;
    let mut total = 0i64;

    for event in events {
        if let Some(start) = open_start.take() {
            total += interval_minutes(start, event.at);
        }
        if event.status == CheckInStatus::Working {
            open_start = Some(event.at);
        }
    }

    // A trailing open interval closes at its own start and earns nothing.
    total.max(0)
}

/// Derived per-subject totals for one reference-zone day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailySummary {
    pub subject: String,
    pub date: NaiveDate,
    pub working_minutes: i64,
    pub working_count: usize,
    pub break_count: usize,
    pub away_count: usize,
    pub history: Vec<CheckInEvent>,
}

impl DailySummary {
    pub fn display_time(&self) -> String {
        format_minutes(self.working_minutes)
    }
}

/// `"7h 05m"` style rendering used by every report surface.
pub fn format_minutes(minutes: i64) -> String {
    let minutes = minutes.max(0);
    format!("{}h {:02}m", minutes / 60, minutes % 60)
}

/// Group a day's events by subject and reconstruct each subject's total.
///
/// Subjects without events do not appear. Subjects listed in `priority` come
/// first in list order, the rest by descending working time then id.
pub fn summarize_day(
    date: NaiveDate,
    events: &[CheckInEvent],
    priority: &[String],
) -> Vec<DailySummary> {
    let mut by_subject: HashMap<&str, Vec<CheckInEvent>> = HashMap::new();
    for event in events {
        by_subject
            .entry(event.subject.as_str())
            .or_default()
            .push(event.clone());
    }

    let mut summaries: Vec<DailySummary> = by_subject
        .into_iter()
        .map(|(subject, mut history)| {
            history.sort_by_key(|e| (e.at, e.seq));
            let count = |status: CheckInStatus| {
                history.iter().filter(|e| e.status == status).count()
            };
            DailySummary {
                subject: subject.to_string(),
                date,
                working_minutes: working_minutes(&history),
                working_count: count(CheckInStatus::Working),
                break_count: count(CheckInStatus::Break),
                away_count: count(CheckInStatus::Away),
                history,
            }
        })
        .collect();

    let rank = |subject: &str| priority.iter().position(|p| p == subject);
    summaries.sort_by(|a, b| match (rank(&a.subject), rank(&b.subject)) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => b
            .working_minutes
            .cmp(&a.working_minutes)
            .then_with(|| a.subject.cmp(&b.subject)),
    });
    summaries
}

/// Ordered `(subject, display time)` pairs for a report.
pub fn report_lines(summaries: &[DailySummary]) -> Vec<(String, String)> {
    summaries
        .iter()
        .map(|s| (s.subject.clone(), s.display_time()))
        .collect()
}
