use chrono::{DateTime, Days, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::ops::Range;

/// The single timezone that defines "a day" for reports and for display.
/// Everything stored or compared is UTC; this is the only place that converts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceZone {
    tz: Tz,
}

impl ReferenceZone {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    pub fn parse(name: &str) -> Option<Self> {
        name.trim().parse::<Tz>().ok().map(Self::new)
    }

    pub fn tz(&self) -> Tz {
        self.tz
    }

    pub fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.tz).date_naive()
    }

    /// `[start, end)` of `date` in the reference zone, expressed in UTC.
    pub fn day_bounds(&self, date: NaiveDate) -> Range<DateTime<Utc>> {
        let next = date.checked_add_days(Days::new(1)).unwrap_or(date);
        self.local_midnight(date)..self.local_midnight(next)
    }

    pub fn format_time(&self, at: DateTime<Utc>) -> String {
        at.with_timezone(&self.tz).format("%H:%M:%S").to_string()
    }

    fn local_midnight(&self, date: NaiveDate) -> DateTime<Utc> {
        let naive: NaiveDateTime = date.and_hms_opt(0, 0, 0).unwrap_or_default();
        match self.tz.from_local_datetime(&naive) {
            LocalResult::Single(dt) => dt.with_timezone(&Utc),
            LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
            // Midnight skipped by a DST jump: the day starts one hour later.
            LocalResult::None => {
                let shifted = naive + chrono::Duration::hours(1);
                self.tz
                    .from_local_datetime(&shifted)
                    .earliest()
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
            }
        }
    }
}

impl Default for ReferenceZone {
    fn default() -> Self {
        Self::new(Tz::UTC)
    }
}
