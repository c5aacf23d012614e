use chrono::NaiveDate;
use console::{Emoji, style};

use crate::core::worktime::{DailySummary, report_lines};
use crate::core::zone::ReferenceZone;

pub static SUCCESS_ICON: Emoji<'_, '_> = Emoji("✅ ", "");
pub static INFO_ICON: Emoji<'_, '_> = Emoji("ℹ️  ", "");
pub static WARN_ICON: Emoji<'_, '_> = Emoji("⚠️  ", "");
pub static ERROR_ICON: Emoji<'_, '_> = Emoji("❌ ", "");
pub static CLOCK: Emoji<'_, '_> = Emoji("⏰ ", "");
pub static CHART: Emoji<'_, '_> = Emoji("📊 ", "");
pub static GEAR: Emoji<'_, '_> = Emoji("⚙️  ", "");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "");

pub fn print_success(msg: &str) {
    println!("{} {}", SUCCESS_ICON, style(msg).green());
}

pub fn print_info(msg: &str) {
    println!("{} {}", INFO_ICON, style(msg).blue());
}

pub fn print_warn(msg: &str) {
    println!("{} {}", WARN_ICON, style(msg).yellow());
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", ERROR_ICON, style(msg).red().bold());
}

pub fn print_status(label: &str, msg: &str) {
    println!("  {} {}: {}", GEAR, style(label).bold().cyan(), msg);
}

pub fn print_banner() {
    println!(
        "\n{} {}  {}\n",
        CLOCK,
        style("shiftbot").bold().cyan(),
        style("hourly check-ins for Slack teams").dim()
    );
}

pub fn print_goodbye() {
    println!("\n{} {}", SPARKLE, style("See you next shift!").bold().cyan());
}

/// A titled block of `command  description` rows for the help screen.
pub struct GuideSection {
    title: String,
    rows: Vec<(String, String)>,
}

impl GuideSection {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            rows: Vec::new(),
        }
    }

    pub fn command(mut self, cmd: &str, desc: &str) -> Self {
        self.rows.push((cmd.to_string(), desc.to_string()));
        self
    }

    pub fn print(&self) {
        println!(" {}", style(&self.title).bold().underlined());
        let width = self.rows.iter().map(|(c, _)| c.len()).max().unwrap_or(0);
        for (cmd, desc) in &self.rows {
            println!(
                "   {}  {}",
                style(format!("{:width$}", cmd, width = width)).green(),
                desc
            );
        }
        println!();
    }
}

/// Styled terminal rendering of a daily report.
pub fn print_report(
    date: NaiveDate,
    summaries: &[DailySummary],
    zone: ReferenceZone,
    history_limit: usize,
) {
    println!("{} {}", CHART, style(format!("Daily Report - {}", date)).bold());
    if summaries.is_empty() {
        print_info("No check-ins recorded for this day.");
        return;
    }
    for (s, (subject, time)) in summaries.iter().zip(report_lines(summaries)) {
        println!(
            "\n  {}  {}",
            style(subject).bold().cyan(),
            style(time).green().bold()
        );
        print_status(
            "Check-ins",
            &format!(
                "working {}, break {}, away {}",
                s.working_count, s.break_count, s.away_count
            ),
        );
        for event in s.history.iter().take(history_limit) {
            println!(
                "     {}  {}",
                style(zone.format_time(event.at)).dim(),
                event.status.label()
            );
        }
        if s.history.len() > history_limit {
            println!(
                "     {}",
                style(format!("... and {} more", s.history.len() - history_limit)).dim()
            );
        }
    }
    println!();
}
