mod report;
mod serve;

use anyhow::{Result, bail};
use chrono::NaiveDate;
use console::style;
use std::path::PathBuf;

use crate::core::config::DEFAULT_CONFIG_FILE;
use crate::core::terminal::{self, GuideSection, print_error};

fn print_help() {
    terminal::print_banner();

    GuideSection::new("Core")
        .command("serve", "Run the bot: Slack webhooks, reminders and daily report")
        .command("report", "Print a daily report from the local ledger")
        .command("help", "Show this help")
        .print();

    GuideSection::new("Options")
        .command("--config PATH", "Config file (default shiftbot.toml)")
        .command("--port N", "serve: listen port, overrides config and PORT")
        .command("--date YYYY-MM-DD", "report: day to summarize (default today)")
        .command("--subject ID", "report: only this Slack user id")
        .print();

    println!(
        "\n {} {} <command> [options]\n",
        style("Usage:").bold(),
        style("shiftbot").green()
    );
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ServeArgs {
    pub config: PathBuf,
    pub port: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ReportArgs {
    pub config: PathBuf,
    pub date: Option<NaiveDate>,
    pub subject: Option<String>,
}

pub(crate) fn parse_serve_args(args: &[String], start: usize) -> Result<ServeArgs> {
    let mut parsed = ServeArgs {
        config: PathBuf::from(DEFAULT_CONFIG_FILE),
        port: None,
    };
    let mut i = start;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    parsed.config = PathBuf::from(&args[i + 1]);
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--port" | "-p" => {
                if i + 1 < args.len() {
                    match args[i + 1].parse() {
                        Ok(port) => parsed.port = Some(port),
                        Err(_) => bail!("Invalid port: {}", args[i + 1]),
                    }
                    i += 2;
                } else {
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }
    Ok(parsed)
}

pub(crate) fn parse_report_args(args: &[String], start: usize) -> Result<ReportArgs> {
    let mut parsed = ReportArgs {
        config: PathBuf::from(DEFAULT_CONFIG_FILE),
        date: None,
        subject: None,
    };
    let mut i = start;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    parsed.config = PathBuf::from(&args[i + 1]);
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--date" | "-d" => {
                if i + 1 < args.len() {
                    match NaiveDate::parse_from_str(&args[i + 1], "%Y-%m-%d") {
                        Ok(date) => parsed.date = Some(date),
                        Err(_) => bail!("Invalid date '{}', expected YYYY-MM-DD", args[i + 1]),
                    }
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--subject" | "-s" => {
                if i + 1 < args.len() {
                    parsed.subject = Some(args[i + 1].clone());
                    i += 2;
                } else {
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }
    Ok(parsed)
}

pub async fn run_main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    if args.len() > 1 {
        let cmd = args[1].as_str();
        match cmd {
            "serve" | "run" => {
                let parsed = parse_serve_args(&args, 2)?;
                serve::run_server(parsed).await
            }
            "report" => {
                let parsed = parse_report_args(&args, 2)?;
                report::run_report(parsed).await
            }
            "help" | "--help" | "-h" => {
                print_help();
                Ok(())
            }
            _ => {
                print_error(&format!("Unknown command: {}", cmd));
                print_help();
                Ok(())
            }
        }
    } else {
        print_help();
        Ok(())
    }
}
