//! Block Kit payloads for reminders and reports.

use chrono::NaiveDate;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::core::ledger::CheckInStatus;
use crate::core::worktime::DailySummary;
use crate::core::zone::ReferenceZone;

pub const ACTION_PREFIX: &str = "checkin_";
pub const REMINDER_TEXT: &str = "Check-In Reminder";

pub fn action_id(status: CheckInStatus) -> String {
    format!("{}{}", ACTION_PREFIX, status.as_str())
}

/// Inverse of [`action_id`]; `None` for actions this bot does not own.
pub fn parse_action_id(action_id: &str) -> Option<CheckInStatus> {
    action_id.strip_prefix(ACTION_PREFIX)?.parse().ok()
}

pub fn status_emoji(status: CheckInStatus) -> &'static str {
    match status {
        CheckInStatus::Working => "✅",
        CheckInStatus::Break => "⏸️",
        CheckInStatus::Away => "🏠",
    }
}

fn button_label(status: CheckInStatus) -> String {
    match status {
        CheckInStatus::Working => format!("{} I'm Working", status_emoji(status)),
        CheckInStatus::Break => format!("{} On Break", status_emoji(status)),
        CheckInStatus::Away => format!("{} Away", status_emoji(status)),
    }
}

/// The interactive reminder. Every button carries the prompt id as its value.
pub fn reminder_blocks(prompt_id: Uuid, sent_at: &str) -> Value {
    let buttons: Vec<Value> = CheckInStatus::ALL
        .iter()
        .map(|status| {
            let mut button = json!({
                "type": "button",
                "text": { "type": "plain_text", "text": button_label(*status) },
                "action_id": action_id(*status),
                "value": prompt_id.to_string(),
            });
            match status {
                CheckInStatus::Working => button["style"] = json!("primary"),
                CheckInStatus::Away => button["style"] = json!("danger"),
                CheckInStatus::Break => {}
            }
            button
        })
        .collect();

    json!([
        {
            "type": "header",
            "text": { "type": "plain_text", "text": format!("⏰ {}", REMINDER_TEXT) }
        },
        {
            "type": "section",
            "text": {
                "type": "mrkdwn",
                "text": format!(
                    "*Time:* {}\n\nPlease confirm your working status by clicking the button below:",
                    sent_at
                )
            }
        },
        {
            "type": "actions",
            "block_id": format!("checkin_{}", prompt_id.simple()),
            "elements": buttons
        }
    ])
}

/// Replacement for an expired reminder, without buttons.
pub fn closed_reminder_blocks(sent_at: &str, closed_at: &str) -> Value {
    json!([
        {
            "type": "header",
            "text": { "type": "plain_text", "text": format!("⏰ {}", REMINDER_TEXT) }
        },
        {
            "type": "context",
            "elements": [{
                "type": "mrkdwn",
                "text": format!("Sent at {}. Check-in closed at {}.", sent_at, closed_at)
            }]
        }
    ])
}

pub fn status_change_text(name: &str, status: CheckInStatus) -> String {
    format!(
        "{} Check-in recorded: {} - {}",
        status_emoji(status),
        name,
        status.label()
    )
}

pub fn help_blocks() -> Value {
    json!([{
        "type": "section",
        "text": {
            "type": "mrkdwn",
            "text": "*🤖 Time Tracking Bot Commands:*\n\n\
                     • `@bot report` - Show daily report\n\
                     • `@bot help` - Show this help message\n\
                     • `/daily-report [YYYY-MM-DD]` - Show a daily report\n\
                     • `/set-channel` - Post reminders and reports here\n\
                     • Click buttons in reminders to check in"
        }
    }])
}

/// A subject's summary with the display name already resolved.
pub struct NamedSummary<'a> {
    pub name: String,
    pub summary: &'a DailySummary,
}

/// Slack rejects messages carrying more blocks than this.
pub const MAX_BLOCKS: usize = 50;

/// Header, then one section (stats plus history capped at `history_limit`) and
/// a divider per subject. Subjects that would push the message past
/// [`MAX_BLOCKS`] are summarized in a closing note.
pub fn report_blocks(
    date: NaiveDate,
    entries: &[NamedSummary<'_>],
    zone: ReferenceZone,
    history_limit: usize,
) -> Value {
    if entries.is_empty() {
        return json!([{
            "type": "section",
            "text": {
                "type": "mrkdwn",
                "text": format!("*📊 Daily Report - {}*\n\nNo check-ins recorded for this day.", date)
            }
        }]);
    }

    let mut blocks = vec![
        json!({
            "type": "header",
            "text": { "type": "plain_text", "text": format!("📊 Daily Report - {}", date) }
        }),
        json!({ "type": "divider" }),
    ];

    // Two blocks per subject; reserve one for the note when not all fit.
    let room = MAX_BLOCKS - blocks.len();
    let shown = if entries.len() * 2 <= room {
        entries.len()
    } else {
        (room - 1) / 2
    };

    for entry in &entries[..shown] {
        let s = entry.summary;
        let mut text = format!(
            "*👤 {}*\n• Working Check-ins: {}\n• Break Check-ins: {}\n• Away Check-ins: {}\n• *Total Working Time: {}*",
            entry.name, s.working_count, s.break_count, s.away_count, s.display_time()
        );
        if !s.history.is_empty() {
            let mut lines: Vec<String> = s
                .history
                .iter()
                .take(history_limit)
                .map(|e| format!("• {} - {}", zone.format_time(e.at), e.status.label()))
                .collect();
            if s.history.len() > history_limit {
                lines.push(format!("... and {} more", s.history.len() - history_limit));
            }
            text.push_str(&format!("\n\n*Check-in History:*\n{}", lines.join("\n")));
        }
        blocks.push(json!({
            "type": "section",
            "text": { "type": "mrkdwn", "text": text }
        }));
        blocks.push(json!({ "type": "divider" }));
    }

    let hidden = entries.len() - shown;
    if hidden > 0 {
        blocks.push(json!({
            "type": "context",
            "elements": [{
                "type": "mrkdwn",
                "text": format!(
                    "... and {} more subject(s). Run `shiftbot report --date {}` for the full report.",
                    hidden, date
                )
            }]
        }));
    }

    Value::Array(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ledger::CheckInEvent;
    use chrono::{Duration, TimeZone, Utc};

    fn summary(events: usize) -> DailySummary {
        let start = Utc.with_ymd_and_hms(2026, 5, 12, 9, 0, 0).unwrap();
        let history = (0..events)
            .map(|i| CheckInEvent {
                seq: i as i64 + 1,
                subject: "U1".to_string(),
                status: CheckInStatus::Working,
                at: start + Duration::minutes(i as i64 * 30),
            })
            .collect::<Vec<_>>();
        DailySummary {
            subject: "U1".to_string(),
            date: NaiveDate::from_ymd_opt(2026, 5, 12).unwrap(),
            working_minutes: 125,
            working_count: events,
            break_count: 0,
            away_count: 0,
            history,
        }
    }

    #[test]
    fn action_ids_round_trip_through_status() {
        for status in CheckInStatus::ALL {
            assert_eq!(parse_action_id(&action_id(status)), Some(status));
        }
        assert_eq!(parse_action_id("checkin_lunch"), None);
        assert_eq!(parse_action_id("approve_working"), None);
    }

    #[test]
    fn reminder_buttons_carry_prompt_id() {
        let id = Uuid::new_v4();
        let blocks = reminder_blocks(id, "09:00:00");
        let elements = blocks[2]["elements"].as_array().unwrap();
        assert_eq!(elements.len(), 3);
        for element in elements {
            assert_eq!(element["value"], id.to_string());
        }
        assert_eq!(elements[0]["action_id"], "checkin_working");
        assert_eq!(elements[2]["action_id"], "checkin_away");
    }

    #[test]
    fn closed_reminder_has_no_actions() {
        let blocks = closed_reminder_blocks("09:00:00", "09:10:00");
        assert!(
            blocks
                .as_array()
                .unwrap()
                .iter()
                .all(|b| b["type"] != "actions")
        );
    }

    #[test]
    fn empty_report_says_so() {
        let date = NaiveDate::from_ymd_opt(2026, 5, 12).unwrap();
        let blocks = report_blocks(date, &[], ReferenceZone::default(), 10);
        let text = blocks[0]["text"]["text"].as_str().unwrap();
        assert!(text.contains("No check-ins recorded for this day."));
        assert!(text.contains("2026-05-12"));
    }

    #[test]
    fn report_truncates_history() {
        let s = summary(13);
        let entries = [NamedSummary {
            name: "Ada".to_string(),
            summary: &s,
        }];
        let blocks = report_blocks(s.date, &entries, ReferenceZone::default(), 10);
        assert_eq!(blocks.as_array().unwrap().len(), 4);
        let text = blocks[2]["text"]["text"].as_str().unwrap();
        assert!(text.starts_with("*👤 Ada*"));
        assert!(text.contains("Total Working Time: 2h 05m"));

        let history = text.split_once("\n\n").unwrap().1;
        assert!(history.starts_with("*Check-in History:*\n• 09:00:00 - Working"));
        assert!(history.ends_with("... and 3 more"));
        assert_eq!(history.lines().count(), 12);
    }

    #[test]
    fn large_teams_stay_within_the_block_limit() {
        fn named(s: &DailySummary, n: usize) -> Vec<NamedSummary<'_>> {
            (0..n)
                .map(|i| NamedSummary {
                    name: format!("User {}", i),
                    summary: s,
                })
                .collect()
        }
        let s = summary(2);

        let exact = report_blocks(s.date, &named(&s, 24), ReferenceZone::default(), 10);
        let exact = exact.as_array().unwrap();
        assert_eq!(exact.len(), MAX_BLOCKS);
        assert!(exact.iter().all(|b| b["type"] != "context"));

        let crowded = report_blocks(s.date, &named(&s, 30), ReferenceZone::default(), 10);
        let crowded = crowded.as_array().unwrap();
        assert!(crowded.len() <= MAX_BLOCKS);
        let note = crowded.last().unwrap()["elements"][0]["text"].as_str().unwrap();
        assert!(note.contains("7 more subject(s)"));
        assert!(
            crowded
                .iter()
                .any(|b| b["text"]["text"].as_str().is_some_and(|t| t.contains("User 22")))
        );
    }

    #[test]
    fn status_change_text_uses_label() {
        assert_eq!(
            status_change_text("Ada", CheckInStatus::Break),
            "⏸️ Check-in recorded: Ada - Break"
        );
    }
}
