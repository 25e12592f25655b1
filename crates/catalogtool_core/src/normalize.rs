use std::fmt;

use chrono::{DateTime, Datelike, FixedOffset, Local, NaiveDate};

pub const MODERATE_DOWNLOADS_THRESHOLD: u64 = 1_000;
pub const HIGH_DOWNLOADS_THRESHOLD: u64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadTier {
    Low,
    Moderate,
    High,
}

impl DownloadTier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Moderate => "Moderate",
            Self::High => "High",
        }
    }
}

impl fmt::Display for DownloadTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Render a star count the way the directory displays it: `850+` below a
/// thousand, `12.3k` / `12k` at or above.
pub fn stars_formatted(count: u64) -> String {
    if count < 1_000 {
        return format!("{count}+");
    }
    // Round half up to tenths of a thousand.
    let tenths = count.saturating_add(50) / 100;
    let whole = tenths / 10;
    let fraction = tenths % 10;
    if fraction == 0 {
        format!("{whole}k")
    } else {
        format!("{whole}.{fraction}k")
    }
}

pub fn download_tier(weekly_downloads: u64) -> DownloadTier {
    if weekly_downloads >= HIGH_DOWNLOADS_THRESHOLD {
        DownloadTier::High
    } else if weekly_downloads >= MODERATE_DOWNLOADS_THRESHOLD {
        DownloadTier::Moderate
    } else {
        DownloadTier::Low
    }
}

/// Parse an RFC 3339 timestamp (`2025-03-14T09:30:00.000Z`), keeping its own offset.
pub fn parse_timestamp(value: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(value.trim()).ok()
}

/// `YYYY-MM` in the timestamp's own offset.
pub fn year_month(timestamp: &DateTime<FixedOffset>) -> String {
    format!("{:04}-{:02}", timestamp.year(), timestamp.month())
}

/// `March 4, 2026`: full month name, day without leading zero.
pub fn format_long_date(date: NaiveDate) -> String {
    date.format("%B %-d, %Y").to_string()
}

pub fn today() -> String {
    format_long_date(Local::now().date_naive())
}
