//! Flexible date parsing for schedule rows and due-date sentences
//!
//! Course pages write dates every way imaginable: ISO, "September 8, 2025",
//! "Sep 8", "9/8/25", "Mon 9/8". Year-less forms borrow the configured
//! academic year.

use chrono::NaiveDate;
use regex::Regex;
use std::sync::OnceLock;

static RE_ISO: OnceLock<Regex> = OnceLock::new();
static RE_MONTH_NAME: OnceLock<Regex> = OnceLock::new();
static RE_SLASH: OnceLock<Regex> = OnceLock::new();

fn re_iso() -> &'static Regex {
    RE_ISO.get_or_init(|| Regex::new(r"(\d{4})-(\d{2})-(\d{2})").unwrap())
}

fn re_month_name() -> &'static Regex {
    RE_MONTH_NAME.get_or_init(|| {
        Regex::new(
            r"(?i)\b(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?\s+(\d{1,2})(?:st|nd|rd|th)?(?:,?\s+(\d{4}))?",
        )
        .unwrap()
    })
}

fn re_slash() -> &'static Regex {
    RE_SLASH.get_or_init(|| {
        Regex::new(r"\b(\d{1,2})/(\d{1,2})(?:/(\d{2,4}))?\b").unwrap()
    })
}

fn month_number(abbrev: &str) -> Option<u32> {
    let month = match abbrev.to_lowercase().as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

fn expand_year(raw: i32) -> i32 {
    if raw < 100 {
        2000 + raw
    } else {
        raw
    }
}

/// Parse a string that should be a date. Strips a leading weekday name.
pub fn parse_date(s: &str, default_year: i32) -> Option<NaiveDate> {
    let trimmed = s.trim();
    if trimmed.is_empty() || trimmed.len() > 40 {
        return None;
    }
    find_date_in_text(trimmed, default_year)
}

/// Find the first recognizable date in free text.
///
/// ISO dates win over month-name forms, which win over slash forms, so
/// "due 9/15, posted 2025-09-08" resolves to the ISO date.
pub fn find_date_in_text(text: &str, default_year: i32) -> Option<NaiveDate> {
    if let Some(caps) = re_iso().captures(text) {
        let y: i32 = caps[1].parse().ok()?;
        let m: u32 = caps[2].parse().ok()?;
        let d: u32 = caps[3].parse().ok()?;
        if let Some(date) = NaiveDate::from_ymd_opt(y, m, d) {
            return Some(date);
        }
    }

    if let Some(caps) = re_month_name().captures(text) {
        let month = month_number(&caps[1])?;
        let day: u32 = caps[2].parse().ok()?;
        let year = caps
            .get(3)
            .and_then(|y| y.as_str().parse::<i32>().ok())
            .unwrap_or(default_year);
        if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
            return Some(date);
        }
    }

    if let Some(caps) = re_slash().captures(text) {
        let month: u32 = caps[1].parse().ok()?;
        let day: u32 = caps[2].parse().ok()?;
        let year = caps
            .get(3)
            .and_then(|y| y.as_str().parse::<i32>().ok())
            .map(expand_year)
            .unwrap_or(default_year);
        if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
            return Some(date);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_iso() {
        assert_eq!(parse_date("2025-09-08", 2024), Some(d(2025, 9, 8)));
    }

    #[test]
    fn test_month_name_variants() {
        assert_eq!(parse_date("September 8, 2025", 2024), Some(d(2025, 9, 8)));
        assert_eq!(parse_date("Sep 8", 2025), Some(d(2025, 9, 8)));
        assert_eq!(parse_date("Mon, Sept. 8th", 2025), Some(d(2025, 9, 8)));
    }

    #[test]
    fn test_slash_variants() {
        assert_eq!(parse_date("9/8/2025", 2024), Some(d(2025, 9, 8)));
        assert_eq!(parse_date("9/8/25", 2024), Some(d(2025, 9, 8)));
        assert_eq!(parse_date("9/8", 2025), Some(d(2025, 9, 8)));
    }

    #[test]
    fn test_invalid_dates_rejected() {
        assert_eq!(parse_date("13/45", 2025), None);
        assert_eq!(parse_date("2025-02-30", 2025), None);
        assert_eq!(parse_date("no date here", 2025), None);
    }

    #[test]
    fn test_find_in_sentence() {
        assert_eq!(
            find_date_in_text("Homework 1 is due Sep 15 at midnight", 2025),
            Some(d(2025, 9, 15))
        );
    }
}
