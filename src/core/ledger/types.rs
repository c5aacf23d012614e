use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// A declared working status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckInStatus {
    Working,
    Break,
    Away,
}

impl CheckInStatus {
    pub const ALL: [CheckInStatus; 3] = [Self::Working, Self::Break, Self::Away];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Working => "working",
            Self::Break => "break",
            Self::Away => "away",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Working => "Working",
            Self::Break => "Break",
            Self::Away => "Away",
        }
    }
}

impl fmt::Display for CheckInStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckInStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "working" => Ok(Self::Working),
            "break" => Ok(Self::Break),
            "away" => Ok(Self::Away),
            other => Err(other.to_string()),
        }
    }
}

/// One row of the ledger. `seq` is the insertion order and breaks timestamp ties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckInEvent {
    pub seq: i64,
    pub subject: String,
    pub status: CheckInStatus,
    pub at: DateTime<Utc>,
}

/// Which subjects a ledger query covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubjectFilter<'a> {
    All,
    Only(&'a str),
}

impl<'a> From<Option<&'a str>> for SubjectFilter<'a> {
    fn from(subject: Option<&'a str>) -> Self {
        match subject {
            Some(s) => Self::Only(s),
            None => Self::All,
        }
    }
}
