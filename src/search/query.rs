//! Search query mini-language
//!
//! ```text
//! auth tag:bug from:LAST 7 DAYS to:2025-10-31 case:
//! ```
//!
//! Filters may appear anywhere and in any order; whatever is not a filter is
//! the free-text query. A filter value that is not understood stays in the
//! free text verbatim.

use crate::tags::normalize_tag;
use chrono::{Datelike, Days, Local, NaiveDate, NaiveDateTime, NaiveTime};

/// Structured form of a search string
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery {
    /// Free text, single-space separated
    pub query: String,
    /// Normalized tags, sorted and unique
    pub tags: Vec<String>,
    /// Inclusive lower bound on modification time
    pub date_from: Option<NaiveDateTime>,
    /// Inclusive upper bound on modification time
    pub date_to: Option<NaiveDateTime>,
    pub use_regex: bool,
    pub case_sensitive: bool,
}

impl SearchQuery {
    /// True if any tag or date filter is set
    pub fn has_filters(&self) -> bool {
        !self.tags.is_empty() || self.date_from.is_some() || self.date_to.is_some()
    }

    pub fn has_text(&self) -> bool {
        !self.query.is_empty()
    }

    /// True if `modified` falls inside the date window
    pub fn date_matches(&self, modified: NaiveDateTime) -> bool {
        self.date_from.is_none_or(|from| modified >= from)
            && self.date_to.is_none_or(|to| modified <= to)
    }
}

/// A whole-day window
struct DayRange {
    first: NaiveDate,
    last: NaiveDate,
}

impl DayRange {
    fn day(date: NaiveDate) -> Self {
        Self {
            first: date,
            last: date,
        }
    }

    fn start(&self) -> NaiveDateTime {
        self.first.and_time(NaiveTime::MIN)
    }

    fn end(&self) -> NaiveDateTime {
        let last_instant = NaiveTime::from_hms_nano_opt(23, 59, 59, 999_999_999).unwrap_or(NaiveTime::MIN);
        self.last.and_time(last_instant)
    }
}

fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)?.pred_opt()
}

/// Parse a date value at the start of `words`
///
/// Returns the window and how many words it used.
fn parse_date(words: &[&str], today: NaiveDate) -> Option<(DayRange, usize)> {
    let first = words.first()?;
    if let Ok(date) = NaiveDate::parse_from_str(first, "%Y-%m-%d") {
        return Some((DayRange::day(date), 1));
    }

    let upper = |i: usize| words.get(i).map(|w| w.to_ascii_uppercase());
    match upper(0)?.as_str() {
        "TODAY" => Some((DayRange::day(today), 1)),
        "YESTERDAY" => Some((DayRange::day(today.pred_opt()?), 1)),
        "THIS" => {
            let range = match upper(1)?.as_str() {
                "WEEK" => {
                    let monday = today
                        .checked_sub_days(Days::new(today.weekday().num_days_from_monday() as u64))?;
                    DayRange {
                        first: monday,
                        last: monday.checked_add_days(Days::new(6))?,
                    }
                }
                "MONTH" => DayRange {
                    first: today.with_day(1)?,
                    last: last_day_of_month(today.year(), today.month())?,
                },
                "YEAR" => DayRange {
                    first: NaiveDate::from_ymd_opt(today.year(), 1, 1)?,
                    last: NaiveDate::from_ymd_opt(today.year(), 12, 31)?,
                },
                _ => return None,
            };
            Some((range, 2))
        }
        "LAST" => {
            let days: u64 = words.get(1)?.parse().ok().filter(|n| *n >= 1)?;
            if !matches!(upper(2)?.as_str(), "DAY" | "DAYS") {
                return None;
            }
            let range = DayRange {
                first: today.checked_sub_days(Days::new(days - 1))?,
                last: today,
            };
            Some((range, 3))
        }
        _ => None,
    }
}

/// Value of a `key:value` token when the key matches case-insensitively
fn strip_key<'a>(word: &'a str, key: &str) -> Option<&'a str> {
    let (head, rest) = word.split_at_checked(key.len())?;
    head.eq_ignore_ascii_case(key).then_some(rest)
}

/// Parse a search string using the current local time for date keywords
pub fn parse_search_query(input: &str) -> SearchQuery {
    parse_search_query_at(input, Local::now().naive_local())
}

/// Parse a search string with date keywords relative to `now`
///
/// Repeated `from:` filters keep the latest bound and repeated `to:` filters
/// the earliest, so filter order never changes the result.
pub fn parse_search_query_at(input: &str, now: NaiveDateTime) -> SearchQuery {
    let today = now.date();
    let words: Vec<&str> = input.split_whitespace().collect();
    let mut parsed = SearchQuery::default();
    let mut text: Vec<&str> = Vec::new();

    let mut i = 0;
    while i < words.len() {
        let word = words[i];

        if let Some(value) = strip_key(word, "tag:") {
            let tag = normalize_tag(value);
            if !tag.is_empty() {
                parsed.tags.push(tag);
                i += 1;
                continue;
            }
        } else if strip_key(word, "regex:").is_some() {
            parsed.use_regex = true;
            i += 1;
            continue;
        } else if strip_key(word, "case:").is_some() {
            parsed.case_sensitive = true;
            i += 1;
            continue;
        } else if let Some((is_from, value)) = strip_key(word, "from:")
            .map(|v| (true, v))
            .or_else(|| strip_key(word, "to:").map(|v| (false, v)))
        {
            let mut date_words = vec![value];
            date_words.extend_from_slice(&words[i + 1..words.len().min(i + 3)]);
            if let Some((range, used)) = parse_date(&date_words, today) {
                if is_from {
                    let start = range.start();
                    parsed.date_from = Some(parsed.date_from.map_or(start, |d| d.max(start)));
                } else {
                    let end = range.end();
                    parsed.date_to = Some(parsed.date_to.map_or(end, |d| d.min(end)));
                }
                i += used;
                continue;
            }
        }

        text.push(word);
        i += 1;
    }

    parsed.tags.sort();
    parsed.tags.dedup();
    parsed.query = text.join(" ");
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> NaiveDateTime {
        // A Wednesday
        NaiveDate::from_ymd_opt(2025, 10, 15)
            .unwrap()
            .and_hms_opt(14, 30, 0)
            .unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn midnight(y: i32, m: u32, d: u32) -> NaiveDateTime {
        date(y, m, d).and_time(NaiveTime::MIN)
    }

    #[test]
    fn test_plain_text() {
        let q = parse_search_query_at("  auth   token  ", now());
        assert_eq!(q.query, "auth token");
        assert!(q.tags.is_empty());
        assert!(!q.has_filters());
    }

    #[test]
    fn test_filters_are_order_independent() {
        let a = parse_search_query_at("tag:bug from:TODAY auth", now());
        let b = parse_search_query_at("auth tag:bug from:TODAY", now());
        let c = parse_search_query_at("from:today auth TAG:Bug", now());
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_eq!(a.query, "auth");
        assert_eq!(a.tags, vec!["bug"]);
        assert_eq!(a.date_from, Some(midnight(2025, 10, 15)));
    }

    #[test]
    fn test_tags_are_normalized_sorted_unique() {
        let q = parse_search_query_at("tag:Urgent tag:#bug tag:urgent", now());
        assert_eq!(q.tags, vec!["bug", "urgent"]);
        assert_eq!(q.query, "");
    }

    #[test]
    fn test_last_n_days() {
        let q = parse_search_query_at("from:LAST 7 DAYS", now());
        assert_eq!(q.date_from, Some(midnight(2025, 10, 9)));
        assert_eq!(q.query, "");

        let q = parse_search_query_at("from:last 1 day notes", now());
        assert_eq!(q.date_from, Some(midnight(2025, 10, 15)));
        assert_eq!(q.query, "notes");
    }

    #[test]
    fn test_this_week_month_year() {
        let q = parse_search_query_at("from:THIS WEEK to:THIS WEEK", now());
        assert_eq!(q.date_from, Some(midnight(2025, 10, 13)));
        assert_eq!(q.date_to.unwrap().date(), date(2025, 10, 19));

        let q = parse_search_query_at("from:THIS MONTH to:THIS MONTH", now());
        assert_eq!(q.date_from, Some(midnight(2025, 10, 1)));
        assert_eq!(q.date_to.unwrap().date(), date(2025, 10, 31));

        let q = parse_search_query_at("from:THIS YEAR", now());
        assert_eq!(q.date_from, Some(midnight(2025, 1, 1)));
    }

    #[test]
    fn test_explicit_dates_and_yesterday() {
        let q = parse_search_query_at("to:2025-10-01 from:YESTERDAY", now());
        assert_eq!(q.date_from, Some(midnight(2025, 10, 14)));
        let to = q.date_to.unwrap();
        assert_eq!(to.date(), date(2025, 10, 1));
        assert!(!q.date_matches(date(2025, 10, 1).and_hms_opt(23, 0, 0).unwrap()));
        assert!(to > midnight(2025, 10, 1));
    }

    #[test]
    fn test_date_window_membership() {
        let q = parse_search_query_at("from:2025-10-01 to:2025-10-02", now());
        assert!(q.date_matches(date(2025, 10, 2).and_hms_opt(23, 59, 0).unwrap()));
        assert!(q.date_matches(midnight(2025, 10, 1)));
        assert!(!q.date_matches(midnight(2025, 10, 3)));
        assert!(!q.date_matches(date(2025, 9, 30).and_hms_opt(12, 0, 0).unwrap()));
    }

    #[test]
    fn test_repeated_bounds_keep_narrowest() {
        let a = parse_search_query_at("from:2025-01-01 from:2025-06-01 to:2025-12-31 to:2025-09-30", now());
        let b = parse_search_query_at("to:2025-09-30 from:2025-06-01 to:2025-12-31 from:2025-01-01", now());
        assert_eq!(a, b);
        assert_eq!(a.date_from, Some(midnight(2025, 6, 1)));
        assert_eq!(a.date_to.unwrap().date(), date(2025, 9, 30));
    }

    #[test]
    fn test_unknown_keywords_fall_back_to_text() {
        let q = parse_search_query_at("from:INVALID_KEYWORD notes", now());
        assert_eq!(q.query, "from:INVALID_KEYWORD notes");
        assert_eq!(q.date_from, None);

        let q = parse_search_query_at("from:TODAYS", now());
        assert_eq!(q.query, "from:TODAYS");
        assert_eq!(q.date_from, None);

        let q = parse_search_query_at("from:THIS WEEKEND to:LAST 0 DAYS", now());
        assert_eq!(q.query, "from:THIS WEEKEND to:LAST 0 DAYS");
        assert_eq!(q.date_to, None);
    }

    #[test]
    fn test_mode_flags() {
        let q = parse_search_query_at("regex: fo+ case:true", now());
        assert!(q.use_regex);
        assert!(q.case_sensitive);
        assert_eq!(q.query, "fo+");

        let q = parse_search_query_at("tag:", now());
        assert_eq!(q.query, "tag:");
    }
}
