use crate::error::{Result, TransferError};
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use regex::Regex;
use std::collections::HashSet;

/// Which `%`-token a capture group in a compiled [`DateSpec`] corresponds to,
/// in the order the tokens appeared in the original format string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Component {
    Year,
    Month,
    Day,
}

/// A format string that is simultaneously a `strftime`-style date template
/// and the source of a regex: it contains exactly one occurrence each of
/// `%Y`, `%m` and `%d`, anchored with `^`...`$`, and no literal capturing
/// groups of its own.
#[derive(Debug, Clone)]
pub struct DateSpec {
    raw: String,
    pattern: Regex,
    /// The innermost unanchored capturing body, used by the ambiguity check.
    body: Regex,
    order: [Component; 3],
}

impl DateSpec {
    pub fn new(spec: &str) -> Result<Self> {
        if !spec.starts_with('^') || !spec.ends_with('$') {
            return Err(TransferError::Config(format!(
                "date spec must be anchored with '^' and '$': {spec}"
            )));
        }
        if spec.contains('(') || spec.contains(')') {
            return Err(TransferError::Config(format!(
                "date spec must not contain capturing groups: {spec}"
            )));
        }

        let mut order = Vec::with_capacity(3);
        let mut pattern = String::with_capacity(spec.len() + 24);
        let mut rest = spec;
        while !rest.is_empty() {
            if let Some(tail) = rest.strip_prefix("%Y") {
                order.push(Component::Year);
                pattern.push_str(r"(\d{4})");
                rest = tail;
            } else if let Some(tail) = rest.strip_prefix("%m") {
                order.push(Component::Month);
                pattern.push_str(r"(\d{2})");
                rest = tail;
            } else if let Some(tail) = rest.strip_prefix("%d") {
                order.push(Component::Day);
                pattern.push_str(r"(\d{2})");
                rest = tail;
            } else {
                let c = rest.chars().next().unwrap();
                pattern.push(c);
                rest = &rest[c.len_utf8()..];
            }
        }

        if order.len() != 3 {
            return Err(TransferError::Config(format!(
                "date spec must contain exactly one each of %Y, %m and %d: {spec}"
            )));
        }
        let mut seen: HashSet<Component> = HashSet::new();
        for c in &order {
            if !seen.insert(*c) {
                return Err(TransferError::Config(format!(
                    "date spec must not repeat a %-token: {spec}"
                )));
            }
        }

        let pattern_re = Regex::new(&pattern)
            .map_err(|e| TransferError::Config(format!("invalid date spec regex: {e}")))?;

        let first_paren = pattern.find('(').ok_or_else(|| {
            TransferError::Config(format!("date spec produced no capture groups: {spec}"))
        })?;
        let last_paren = pattern.rfind(')').ok_or_else(|| {
            TransferError::Config(format!("date spec produced no capture groups: {spec}"))
        })?;
        let body = Regex::new(&pattern[first_paren..=last_paren])
            .map_err(|e| TransferError::Config(format!("invalid date spec body regex: {e}")))?;

        Ok(DateSpec {
            raw: spec.to_string(),
            pattern: pattern_re,
            body,
            order: [order[0], order[1], order[2]],
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    fn assemble(&self, caps: &regex::Captures) -> Option<(i32, u32, u32)> {
        let mut year = None;
        let mut month = None;
        let mut day = None;
        for (idx, component) in self.order.iter().enumerate() {
            let text = caps.get(idx + 1)?.as_str();
            match component {
                Component::Year => year = text.parse::<i32>().ok(),
                Component::Month => month = text.parse::<u32>().ok(),
                Component::Day => day = text.parse::<u32>().ok(),
            }
        }
        Some((year?, month?, day?))
    }
}

/// The outcome of matching a filename/dirname against a [`DateSpec`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseOutcome {
    None,
    Ambiguous,
    Date(NaiveDate),
}

/// The most recent date eligible for upload under the wall-clock cutoff: the
/// most recent date for which at least one hour into the following day has
/// elapsed.
pub fn max_date(now: DateTime<Utc>) -> NaiveDate {
    let today = now.date_naive();
    if now.hour() > 0 {
        today - Duration::days(1)
    } else {
        today - Duration::days(2)
    }
}

/// Map a filename/dirname to a date using `spec`, rejecting ambiguous
/// matches. `max_date` is the upper bound beyond which dates are treated as
/// not-yet-eligible rather than as parse errors.
pub fn parse(name: &str, spec: &DateSpec, max_date: NaiveDate) -> ParseOutcome {
    if is_ambiguous(name, spec) {
        return ParseOutcome::Ambiguous;
    }

    let Some(caps) = spec.pattern.captures(name) else {
        return ParseOutcome::None;
    };
    let Some((year, month, day)) = spec.assemble(&caps) else {
        return ParseOutcome::None;
    };
    let Some(date) = NaiveDate::from_ymd_opt(year, month, day) else {
        return ParseOutcome::None;
    };
    if date > max_date {
        return ParseOutcome::None;
    }
    ParseOutcome::Date(date)
}

/// Enumerate every substring of `name` and collect the distinct date-triples
/// the spec's capturing body matches within them; ambiguous if more than one
/// distinct triple turns up (e.g. `log-2020111111.txt` can be read as
/// `2020-11-11` or `2011-11-11`). O(n^2) substrings in the basename length,
/// which is fine for filenames.
fn is_ambiguous(name: &str, spec: &DateSpec) -> bool {
    let chars: Vec<char> = name.chars().collect();
    let n = chars.len();
    let mut triples: HashSet<(String, String, String)> = HashSet::new();

    for start in 0..n {
        for end in (start + 1)..=n {
            let substring: String = chars[start..end].iter().collect();
            if let Some(caps) = spec.body.captures(&substring)
                && let (Some(a), Some(b), Some(c)) = (caps.get(1), caps.get(2), caps.get(3))
            {
                triples.insert((a.as_str().to_string(), b.as_str().to_string(), c.as_str().to_string()));
            }
            if triples.len() > 1 {
                return true;
            }
        }
    }

    triples.len() > 1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(s: &str) -> DateSpec {
        DateSpec::new(s).unwrap()
    }

    #[test]
    fn test_date_spec_rejects_unanchored() {
        assert!(DateSpec::new("%Y%m%d").is_err());
        assert!(DateSpec::new("^%Y%m%d").is_err());
        assert!(DateSpec::new("%Y%m%d$").is_err());
    }

    #[test]
    fn test_date_spec_rejects_capturing_groups() {
        assert!(DateSpec::new("^(%Y)%m%d$").is_err());
    }

    #[test]
    fn test_date_spec_rejects_wrong_token_count() {
        assert!(DateSpec::new("^%Y%m$").is_err());
        assert!(DateSpec::new("^%Y%Y%m%d$").is_err());
    }

    #[test]
    fn test_parse_simple_directory_name() {
        let s = spec("^%Y%m%d$");
        let max = NaiveDate::from_ymd_opt(2030, 1, 1).unwrap();
        assert_eq!(
            parse("20240101", &s, max),
            ParseOutcome::Date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
        );
    }

    #[test]
    fn test_parse_with_surrounding_text() {
        let s = spec(r"^.*%Y-%m-%d\.txt$");
        let max = NaiveDate::from_ymd_opt(2030, 1, 1).unwrap();
        assert_eq!(
            parse("log-2024-03-05.txt", &s, max),
            ParseOutcome::Date(NaiveDate::from_ymd_opt(2024, 3, 5).unwrap())
        );
    }

    #[test]
    fn test_parse_no_match() {
        let s = spec("^%Y%m%d$");
        let max = NaiveDate::from_ymd_opt(2030, 1, 1).unwrap();
        assert_eq!(parse("not-a-date", &s, max), ParseOutcome::None);
    }

    #[test]
    fn test_parse_invalid_calendar_date() {
        let s = spec("^%Y%m%d$");
        let max = NaiveDate::from_ymd_opt(2030, 1, 1).unwrap();
        assert_eq!(parse("20240231", &s, max), ParseOutcome::None);
    }

    #[test]
    fn test_parse_future_date_is_none_not_ambiguous() {
        let s = spec("^%Y%m%d$");
        let max = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert_eq!(parse("20991231", &s, max), ParseOutcome::None);
    }

    #[test]
    fn test_parse_ambiguous_date() {
        let s = spec(r"^.*%Y%m%d.*$");
        let max = NaiveDate::from_ymd_opt(2030, 1, 1).unwrap();
        assert_eq!(parse("log-2020111111.txt", &s, max), ParseOutcome::Ambiguous);
    }

    #[test]
    fn test_parse_unambiguous_with_separators() {
        let s = spec(r"^%Y-%m-%d$");
        let max = NaiveDate::from_ymd_opt(2030, 1, 1).unwrap();
        assert_eq!(
            parse("2024-11-11", &s, max),
            ParseOutcome::Date(NaiveDate::from_ymd_opt(2024, 11, 11).unwrap())
        );
    }

    #[test]
    fn test_max_date_hour_zero_goes_back_two_days() {
        let now = "2024-06-15T00:30:00Z".parse::<DateTime<Utc>>().unwrap();
        assert_eq!(max_date(now), NaiveDate::from_ymd_opt(2024, 6, 13).unwrap());
    }

    #[test]
    fn test_max_date_hour_past_zero_goes_back_one_day() {
        let now = "2024-06-15T01:00:00Z".parse::<DateTime<Utc>>().unwrap();
        assert_eq!(max_date(now), NaiveDate::from_ymd_opt(2024, 6, 14).unwrap());
    }

    #[test]
    fn test_max_date_late_in_day() {
        let now = "2024-06-15T23:59:00Z".parse::<DateTime<Utc>>().unwrap();
        assert_eq!(max_date(now), NaiveDate::from_ymd_opt(2024, 6, 14).unwrap());
    }

    #[test]
    fn test_roundtrip_strftime_style_dates() {
        let s = spec("^%Y%m%d$");
        let max = NaiveDate::from_ymd_opt(2999, 12, 31).unwrap();
        for (y, m, d) in [(1970, 1, 1), (2000, 2, 29), (2024, 12, 31), (2999, 1, 1)] {
            let date = NaiveDate::from_ymd_opt(y, m, d).unwrap();
            let name = date.format("%Y%m%d").to_string();
            assert_eq!(parse(&name, &s, max), ParseOutcome::Date(date));
        }
    }
}
