//! Utility functions for date parsing, string manipulation, and file system
//! checks.
//!
//! The date parser here covers the free-text forms search pages actually
//! emit ("3 hours ago", "yesterday", a handful of absolute formats). It is
//! deliberately clock-injected so the relative forms are testable.

use crate::error::Result;
use chrono::{DateTime, Duration, Local, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs as stdfs;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};

static RELATIVE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(\d+)\s*(minute|min|hour|hr|day|week|month)s?\s+ago$").unwrap()
});

/// Absolute date formats accepted from scraped pages and stored rows.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%b %d, %Y",
    "%B %d, %Y",
    "%d %b %Y",
    "%d %B %Y",
    "%m/%d/%Y",
];

/// Parse a human-readable publication date against a reference day.
///
/// Handles relative phrases ("3 hours ago", "2 days ago", "yesterday"),
/// the absolute formats in [`DATE_FORMATS`], and full RFC 3339 / RFC 2822
/// timestamps. Sub-day phrases resolve to the reference day itself.
///
/// # Returns
///
/// `Some(date)` if the text resolves to a calendar date, `None` otherwise.
/// Callers treat `None` as a hard extraction failure for that record.
pub fn parse_human_date(text: &str, today: NaiveDate) -> Option<NaiveDate> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    match text.to_lowercase().as_str() {
        "today" | "just now" | "now" => return Some(today),
        "yesterday" => return Some(today - Duration::days(1)),
        _ => {}
    }

    if let Some(caps) = RELATIVE_RE.captures(text) {
        let n: i64 = caps[1].parse().ok()?;
        let days = match caps[2].to_lowercase().as_str() {
            "minute" | "min" | "hour" | "hr" => 0,
            "day" => n,
            "week" => n * 7,
            // Close enough for news recency; exact month arithmetic is not
            // what a "2 months ago" badge is telling us anyway.
            "month" => n * 30,
            _ => return None,
        };
        return Some(today - Duration::days(days));
    }

    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(text, fmt) {
            return Some(d);
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.date_naive());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Some(dt.date_naive());
    }

    None
}

/// Parse a human-readable publication date against the local calendar day.
pub fn parse_human_date_now(text: &str) -> Option<NaiveDate> {
    parse_human_date(text, Local::now().date_naive())
}

/// Collapse runs of whitespace into single spaces and trim the ends.
///
/// Visible text pulled out of HTML arrives with layout whitespace baked in;
/// every extracted text field goes through this before it is compared or
/// persisted.
pub fn normalize_ws(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Convert a topic or title to a filename-friendly slug.
///
/// Lowercases, strips everything that is not alphanumeric, space, or
/// hyphen, then hyphenates spaces.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(slugify_topic("Climate Change"), "climate-change");
/// assert_eq!(slugify_topic("AI & robotics!"), "ai--robotics");
/// ```
pub fn slugify_topic(topic: &str) -> String {
    topic
        .to_lowercase()
        .replace(|c: char| !c.is_alphanumeric() && c != ' ' && c != '-', "")
        .replace(' ', "-")
}

/// Truncate a string for logging purposes.
///
/// Long strings are truncated to `max` bytes with an ellipsis and byte
/// count indicator appended.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…(+{} bytes)", &s[..end], s.len() - end)
    }
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if needed, then probes it with a throwaway file.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or written to
/// (permission denied, read-only filesystem, etc.).
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).await?;
    // Small sync write; simpler error surface than async here.
    let probe_path = path.join(".__probe_write__");
    match stdfs::File::create(&probe_path) {
        Ok(_) => {
            let _ = stdfs::remove_file(&probe_path);
            info!("Output directory is writable");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_relative_hours() {
        let today = day("2024-06-10");
        assert_eq!(parse_human_date("3 hours ago", today), Some(today));
        assert_eq!(parse_human_date("45 minutes ago", today), Some(today));
    }

    #[test]
    fn test_parse_relative_days_and_weeks() {
        let today = day("2024-06-10");
        assert_eq!(parse_human_date("2 days ago", today), Some(day("2024-06-08")));
        assert_eq!(parse_human_date("1 week ago", today), Some(day("2024-06-03")));
        assert_eq!(parse_human_date("yesterday", today), Some(day("2024-06-09")));
    }

    #[test]
    fn test_parse_absolute_formats() {
        let today = day("2024-06-10");
        assert_eq!(parse_human_date("2024-01-02", today), Some(day("2024-01-02")));
        assert_eq!(parse_human_date("Jun 5, 2024", today), Some(day("2024-06-05")));
        assert_eq!(parse_human_date("5 June 2024", today), Some(day("2024-06-05")));
    }

    #[test]
    fn test_parse_rfc_timestamps() {
        let today = day("2024-06-10");
        assert_eq!(
            parse_human_date("2024-03-04T12:30:00Z", today),
            Some(day("2024-03-04"))
        );
        assert_eq!(
            parse_human_date("Tue, 05 Mar 2024 10:00:00 +0000", today),
            Some(day("2024-03-05"))
        );
    }

    #[test]
    fn test_parse_garbage_is_none() {
        let today = day("2024-06-10");
        assert_eq!(parse_human_date("", today), None);
        assert_eq!(parse_human_date("soonish", today), None);
        assert_eq!(parse_human_date("ago 3 hours", today), None);
    }

    #[test]
    fn test_normalize_ws() {
        assert_eq!(normalize_ws("  a \n b\t\tc  "), "a b c");
        assert_eq!(normalize_ws(""), "");
    }

    #[test]
    fn test_slugify_topic() {
        assert_eq!(slugify_topic("Climate Change"), "climate-change");
        assert_eq!(slugify_topic("Trump-Xi 'situationship'"), "trump-xi-situationship");
        assert_eq!(slugify_topic("Special@#$Characters"), "specialcharacters");
    }

    #[test]
    fn test_truncate_for_log() {
        assert_eq!(truncate_for_log("short", 100), "short");
        let long = "a".repeat(500);
        let result = truncate_for_log(&long, 100);
        assert!(result.starts_with(&"a".repeat(100)));
        assert!(result.contains("…(+400 bytes)"));
    }
}
