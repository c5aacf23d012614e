use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::core::zone::ReferenceZone;

pub const DEFAULT_CONFIG_FILE: &str = "shiftbot.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("unknown timezone '{0}'")]
    Timezone(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    #[serde(default)]
    pub slack: SlackConfig,

    #[serde(default)]
    pub reminder: ReminderConfig,

    #[serde(default)]
    pub report: ReportConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub log: LogConfig,

    /// IANA name of the zone that defines a reporting day.
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SlackConfig {
    #[serde(default)]
    pub bot_token: String,

    #[serde(default)]
    pub signing_secret: String,

    /// Destination for reminders and the daily report. Can be changed at
    /// runtime with `/set-channel`.
    #[serde(default)]
    pub channel: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReminderConfig {
    /// Takes priority over `interval_hours` when set.
    #[serde(default)]
    pub interval_minutes: Option<u32>,

    #[serde(default = "default_interval_hours")]
    pub interval_hours: f64,

    #[serde(default)]
    pub minute: u32,

    #[serde(default = "default_timeout_minutes")]
    pub timeout_minutes: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportConfig {
    #[serde(default = "default_report_hour")]
    pub hour: u32,

    #[serde(default)]
    pub minute: u32,

    /// Subjects listed first in reports, in this order.
    #[serde(default)]
    pub tracked_subjects: Vec<String>,

    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub file: Option<PathBuf>,
}

fn default_timezone() -> String {
    "UTC".to_string()
}
fn default_interval_hours() -> f64 {
    1.0
}
fn default_timeout_minutes() -> u64 {
    10
}
fn default_report_hour() -> u32 {
    18
}
fn default_history_limit() -> usize {
    10
}
fn default_db_path() -> PathBuf {
    PathBuf::from("time_tracking.db")
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    3000
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            slack: SlackConfig::default(),
            reminder: ReminderConfig::default(),
            report: ReportConfig::default(),
            storage: StorageConfig::default(),
            server: ServerConfig::default(),
            log: LogConfig::default(),
            timezone: default_timezone(),
        }
    }
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            interval_minutes: None,
            interval_hours: default_interval_hours(),
            minute: 0,
            timeout_minutes: default_timeout_minutes(),
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            hour: default_report_hour(),
            minute: 0,
            tracked_subjects: Vec::new(),
            history_limit: default_history_limit(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

impl BotConfig {
    /// Read `path` if it exists (defaults otherwise), then apply the process
    /// environment on top.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.zone()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            info!("No {} found, using defaults.", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Environment overrides. Empty or unparsable values leave the current setting.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).and_then(non_empty);

        if let Some(token) = get("SLACK_BOT_TOKEN") {
            self.slack.bot_token = token;
        }
        if let Some(secret) = get("SLACK_SIGNING_SECRET") {
            self.slack.signing_secret = secret;
        }
        if let Some(channel) = get("SLACK_CHANNEL_ID") {
            self.slack.channel = Some(channel);
        }
        if let Some(ids) = get("TRACKED_USER_IDS") {
            self.report.tracked_subjects = ids
                .split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(raw) = get("REMINDER_INTERVAL_MINUTES") {
            match raw.parse::<i64>() {
                Ok(n) if n > 0 => self.reminder.interval_minutes = u32::try_from(n).ok(),
                Ok(n) => warn!(
                    "Invalid REMINDER_INTERVAL_MINUTES ({}), using hourly schedule",
                    n
                ),
                Err(_) => warn!("Invalid REMINDER_INTERVAL_MINUTES, ignoring"),
            }
        }
        if let Some(raw) = get("REMINDER_INTERVAL_HOURS") {
            match raw.parse::<f64>() {
                Ok(h) => self.reminder.interval_hours = h,
                Err(_) => warn!("Invalid REMINDER_INTERVAL_HOURS, using default 1"),
            }
        }
        if let Some(raw) = get("REMINDER_MINUTE") {
            match raw.parse::<u32>() {
                Ok(m) => self.reminder.minute = m,
                Err(_) => warn!("Invalid REMINDER_MINUTE, using default 0"),
            }
        }
        if let Some(raw) = get("REMINDER_TIMEOUT_MINUTES") {
            match raw.parse::<u64>() {
                Ok(m) => self.reminder.timeout_minutes = m,
                Err(_) => warn!("Invalid REMINDER_TIMEOUT_MINUTES, ignoring"),
            }
        }
        if let Some(path) = get("DB_PATH") {
            self.storage.db_path = PathBuf::from(path);
        }
        if let Some(raw) = get("PORT") {
            match raw.parse::<u16>() {
                Ok(port) => self.server.port = port,
                Err(_) => warn!("Invalid PORT ({}), keeping {}", raw, self.server.port),
            }
        }
        if let Some(tz) = get("TIMEZONE") {
            self.timezone = tz;
        }
        if let Some(level) = get("LOG_LEVEL") {
            self.log.level = level;
        }
        if let Some(file) = get("LOG_FILE") {
            self.log.file = Some(PathBuf::from(file));
        }
    }

    pub fn zone(&self) -> Result<ReferenceZone, ConfigError> {
        ReferenceZone::parse(&self.timezone)
            .ok_or_else(|| ConfigError::Timezone(self.timezone.clone()))
    }

    pub fn reminder_timeout(&self) -> Duration {
        Duration::from_secs(self.reminder.timeout_minutes * 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_file_missing() {
        let config = BotConfig::from_file(Path::new("/nonexistent/shiftbot.toml")).unwrap();
        assert_eq!(config.timezone, "UTC");
        assert_eq!(config.reminder.interval_minutes, None);
        assert_eq!(config.reminder.interval_hours, 1.0);
        assert_eq!(config.reminder.timeout_minutes, 10);
        assert_eq!(config.report.hour, 18);
        assert_eq!(config.report.history_limit, 10);
        assert_eq!(config.storage.db_path, PathBuf::from("time_tracking.db"));
        assert_eq!(config.server.port, 3000);
        assert!(config.slack.channel.is_none());
    }

    #[test]
    fn parse_toml_sections() {
        let content = r#"
timezone = "Europe/Rome"

[slack]
bot_token = "xoxb-1"
channel = "C42"

[reminder]
interval_minutes = 15
timeout_minutes = 5

[report]
hour = 17
minute = 30
tracked_subjects = ["U1", "U2"]
"#;
        let config: BotConfig = toml::from_str(content).unwrap();
        assert_eq!(config.slack.bot_token, "xoxb-1");
        assert_eq!(config.slack.channel.as_deref(), Some("C42"));
        assert_eq!(config.reminder.interval_minutes, Some(15));
        assert_eq!(config.reminder_timeout(), Duration::from_secs(300));
        assert_eq!(config.report.tracked_subjects, vec!["U1", "U2"]);
        assert_eq!((config.report.hour, config.report.minute), (17, 30));
        assert!(config.zone().is_ok());
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = BotConfig::default();
        config.apply_env(env(&[
            ("SLACK_CHANNEL_ID", "C9"),
            ("TRACKED_USER_IDS", "U1, U2,,U3"),
            ("REMINDER_INTERVAL_MINUTES", "5"),
            ("DB_PATH", "/tmp/checkins.db"),
            ("PORT", "8080"),
            ("TIMEZONE", "Asia/Tokyo"),
        ]));
        assert_eq!(config.slack.channel.as_deref(), Some("C9"));
        assert_eq!(config.report.tracked_subjects, vec!["U1", "U2", "U3"]);
        assert_eq!(config.reminder.interval_minutes, Some(5));
        assert_eq!(config.storage.db_path, PathBuf::from("/tmp/checkins.db"));
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.timezone, "Asia/Tokyo");
    }

    #[test]
    fn invalid_env_values_are_ignored() {
        let mut config = BotConfig::default();
        config.server.port = 3000;
        config.apply_env(env(&[
            ("REMINDER_INTERVAL_MINUTES", "0"),
            ("REMINDER_MINUTE", "soon"),
            ("PORT", "99999"),
            ("SLACK_CHANNEL_ID", "   "),
        ]));
        assert_eq!(config.reminder.interval_minutes, None);
        assert_eq!(config.reminder.minute, 0);
        assert_eq!(config.server.port, 3000);
        assert!(config.slack.channel.is_none());
    }

    #[test]
    fn unknown_timezone_is_a_config_error() {
        let config = BotConfig {
            timezone: "Nowhere/Special".to_string(),
            ..BotConfig::default()
        };
        assert!(matches!(config.zone(), Err(ConfigError::Timezone(_))));
    }

    #[test]
    fn load_reads_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        std::fs::write(&path, "[server]\nport = 4100\n").unwrap();
        let config = BotConfig::from_file(&path).unwrap();
        assert_eq!(config.server.port, 4100);
        assert_eq!(config.timezone, "UTC");
    }

    #[test]
    fn malformed_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        std::fs::write(&path, "[server\nport = ").unwrap();
        let err = BotConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains(DEFAULT_CONFIG_FILE));
    }
}
