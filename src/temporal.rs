//! Natural-language time phrase parsing
//!
//! Queries like "notes from last week" carry a temporal constraint that the
//! retrieval filter needs as an absolute interval. The parser is an ordered
//! rule list: the first matching pattern wins, its span is cut out of the
//! query, and the handler resolves the interval against the reference time.
//!
//! All arithmetic is UTC. A timezone string is accepted at the API surface
//! but does not shift the computation.

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc, Weekday};
use regex::Regex;

/// Resolved half-open interval `[start, end)` (the "last <weekday>" rule
/// produces an inclusive full-day interval, closed at one microsecond
/// before midnight).
pub type TimeInterval = (DateTime<Utc>, DateTime<Utc>);

type Handler = fn(&regex::Captures<'_>, DateTime<Utc>) -> Option<TimeInterval>;

/// Ordered first-match temporal rule set
pub struct TemporalParser {
    rules: Vec<(Regex, Handler)>,
}

impl Default for TemporalParser {
    fn default() -> Self {
        Self::new()
    }
}

impl TemporalParser {
    pub fn new() -> Self {
        let rules: Vec<(&str, Handler)> = vec![
            (
                r"(?i)\blast\s+(monday|tuesday|wednesday|thursday|friday|saturday|sunday)\b",
                last_weekday,
            ),
            (r"(?i)\byesterday\b", |_, now| {
                Some((now - Duration::days(1), now))
            }),
            (r"(?i)\blast\s+week\b", |_, now| {
                Some((now - Duration::days(7), now))
            }),
            (r"(?i)\blast\s+month\b", |_, now| {
                Some((now - Duration::days(30), now))
            }),
            (r"(?i)\blast\s+(\d+)\s+days?\b", last_n_days),
            (
                r"(?i)\bin\s+(january|february|march|april|may|june|july|august|september|october|november|december)\b",
                month_range,
            ),
            (r"(?i)\bthis\s+week\b", this_week),
            (r"(?i)\btoday\b", |_, now| Some((midnight(now), now))),
        ];

        Self {
            rules: rules
                .into_iter()
                .map(|(pattern, handler)| {
                    (
                        Regex::new(pattern).expect("temporal patterns are static"),
                        handler,
                    )
                })
                .collect(),
        }
    }

    /// Extract the first temporal phrase from `query`.
    ///
    /// Returns the residual query (the matched span removed, surrounding
    /// text untouched) and the resolved interval, or the query unchanged
    /// when no rule matches. Only the first-matching rule is consumed;
    /// further temporal phrases stay in the residual.
    ///
    /// "last <weekday>" on that same weekday resolves to one week ago, not
    /// today.
    pub fn parse(&self, query: &str, now: DateTime<Utc>) -> (String, Option<TimeInterval>) {
        for (pattern, handler) in &self.rules {
            if let Some(caps) = pattern.captures(query) {
                if let Some(interval) = handler(&caps, now) {
                    let m = caps.get(0).expect("capture 0 always exists");
                    let residual = format!("{}{}", &query[..m.start()], &query[m.end()..]);
                    return (residual, Some(interval));
                }
            }
        }
        (query.to_string(), None)
    }
}

fn midnight(t: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(t.year(), t.month(), t.day(), 0, 0, 0)
        .single()
        .unwrap_or(t)
}

fn last_weekday(caps: &regex::Captures<'_>, now: DateTime<Utc>) -> Option<TimeInterval> {
    let target = match caps.get(1)?.as_str().to_lowercase().as_str() {
        "monday" => Weekday::Mon,
        "tuesday" => Weekday::Tue,
        "wednesday" => Weekday::Wed,
        "thursday" => Weekday::Thu,
        "friday" => Weekday::Fri,
        "saturday" => Weekday::Sat,
        "sunday" => Weekday::Sun,
        _ => return None,
    };

    let mut days_back = (now.weekday().num_days_from_monday() as i64
        - target.num_days_from_monday() as i64)
        .rem_euclid(7);
    if days_back == 0 {
        // "last Monday" said on a Monday means the previous one.
        days_back = 7;
    }

    let day = now - Duration::days(days_back);
    let start = midnight(day);
    let end = start + Duration::days(1) - Duration::microseconds(1);
    Some((start, end))
}

fn last_n_days(caps: &regex::Captures<'_>, now: DateTime<Utc>) -> Option<TimeInterval> {
    let n: i64 = caps.get(1)?.as_str().parse().ok()?;
    Some((now - Duration::days(n), now))
}

fn month_range(caps: &regex::Captures<'_>, now: DateTime<Utc>) -> Option<TimeInterval> {
    let month = match caps.get(1)?.as_str().to_lowercase().as_str() {
        "january" => 1,
        "february" => 2,
        "march" => 3,
        "april" => 4,
        "may" => 5,
        "june" => 6,
        "july" => 7,
        "august" => 8,
        "september" => 9,
        "october" => 10,
        "november" => 11,
        "december" => 12,
        _ => return None,
    };

    // Current year, or the previous one if the month has not happened yet.
    let year = if month > now.month() {
        now.year() - 1
    } else {
        now.year()
    };

    let start = Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).single()?;
    let next = if month == 12 {
        Utc.with_ymd_and_hms(year + 1, 1, 1, 0, 0, 0).single()?
    } else {
        Utc.with_ymd_and_hms(year, month + 1, 1, 0, 0, 0).single()?
    };
    Some((start, next - Duration::seconds(1)))
}

fn this_week(_caps: &regex::Captures<'_>, now: DateTime<Utc>) -> Option<TimeInterval> {
    let monday = now - Duration::days(now.weekday().num_days_from_monday() as i64);
    Some((midnight(monday), now))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_now() -> DateTime<Utc> {
        // A Wednesday.
        Utc.with_ymd_and_hms(2024, 6, 12, 15, 30, 0).unwrap()
    }

    #[test]
    fn test_no_temporal_phrase() {
        let parser = TemporalParser::new();
        let (residual, interval) = parser.parse("what did the paper say", fixed_now());
        assert_eq!(residual, "what did the paper say");
        assert!(interval.is_none());
    }

    #[test]
    fn test_yesterday() {
        let parser = TemporalParser::new();
        let now = fixed_now();
        let (residual, interval) = parser.parse("notes from yesterday", now);
        let (start, end) = interval.unwrap();

        assert_eq!(residual, "notes from ");
        assert_eq!(start, now - Duration::days(1));
        assert_eq!(end, now);
    }

    #[test]
    fn test_last_week_window() {
        let parser = TemporalParser::new();
        let now = fixed_now();
        let (residual, interval) = parser.parse("meeting notes from last week", now);
        let (start, end) = interval.unwrap();

        assert_eq!(residual, "meeting notes from ");
        assert_eq!(start, now - Duration::days(7));
        assert_eq!(end, now);
    }

    #[test]
    fn test_last_n_days() {
        let parser = TemporalParser::new();
        let now = fixed_now();
        let (_, interval) = parser.parse("ideas from the last 3 days", now);
        let (start, end) = interval.unwrap();

        assert_eq!(start, now - Duration::days(3));
        assert_eq!(end, now);
    }

    #[test]
    fn test_today_starts_at_midnight() {
        let parser = TemporalParser::new();
        let now = fixed_now();
        let (_, interval) = parser.parse("what happened today", now);
        let (start, end) = interval.unwrap();

        assert_eq!(start, Utc.with_ymd_and_hms(2024, 6, 12, 0, 0, 0).unwrap());
        assert_eq!(end, now);
    }

    #[test]
    fn test_this_week_starts_monday() {
        let parser = TemporalParser::new();
        let now = fixed_now(); // Wednesday
        let (_, interval) = parser.parse("progress this week", now);
        let (start, end) = interval.unwrap();

        assert_eq!(start, Utc.with_ymd_and_hms(2024, 6, 10, 0, 0, 0).unwrap());
        assert_eq!(end, now);
    }

    #[test]
    fn test_last_weekday_whole_day() {
        let parser = TemporalParser::new();
        let now = fixed_now(); // Wednesday 2024-06-12
        let (_, interval) = parser.parse("what did I record last Monday", now);
        let (start, end) = interval.unwrap();

        assert_eq!(start, Utc.with_ymd_and_hms(2024, 6, 10, 0, 0, 0).unwrap());
        assert_eq!(
            end,
            Utc.with_ymd_and_hms(2024, 6, 10, 23, 59, 59).unwrap()
                + Duration::microseconds(999_999)
        );
    }

    #[test]
    fn test_last_weekday_same_day_goes_back_a_week() {
        let parser = TemporalParser::new();
        let now = fixed_now(); // Wednesday
        let (_, interval) = parser.parse("last wednesday", now);
        let (start, _) = interval.unwrap();

        assert_eq!(start, Utc.with_ymd_and_hms(2024, 6, 5, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_month_in_the_future_means_last_year() {
        let parser = TemporalParser::new();
        let now = fixed_now(); // June 2024
        let (_, interval) = parser.parse("the report in november", now);
        let (start, end) = interval.unwrap();

        assert_eq!(start, Utc.with_ymd_and_hms(2023, 11, 1, 0, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2023, 11, 30, 23, 59, 59).unwrap());
    }

    #[test]
    fn test_month_in_the_past_means_this_year() {
        let parser = TemporalParser::new();
        let now = fixed_now(); // June 2024
        let (_, interval) = parser.parse("in march", now);
        let (start, _) = interval.unwrap();

        assert_eq!(start, Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_case_insensitive() {
        let parser = TemporalParser::new();
        let (_, interval) = parser.parse("Notes From YESTERDAY", fixed_now());
        assert!(interval.is_some());
    }

    #[test]
    fn test_first_match_wins_others_stay() {
        let parser = TemporalParser::new();
        // "last monday" is declared before "yesterday", so it is consumed
        // and "yesterday" stays in the residual.
        let (residual, interval) = parser.parse("yesterday or last monday", fixed_now());
        assert!(interval.is_some());
        assert!(residual.contains("yesterday"));
        assert!(!residual.to_lowercase().contains("last monday"));
    }

    #[test]
    fn test_reinserting_match_restores_query() {
        let parser = TemporalParser::new();
        let query = "notes from last week about rust";
        let now = fixed_now();
        let (residual, _) = parser.parse(query, now);

        // The residual is the query with the matched span excised; putting
        // the phrase back at its offset restores the original.
        let m = Regex::new(r"(?i)\blast\s+week\b")
            .unwrap()
            .find(query)
            .unwrap();
        let mut restored = residual.clone();
        restored.insert_str(m.start(), m.as_str());
        assert_eq!(restored, query);
    }
}
