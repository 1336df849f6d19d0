use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::{Captures, Regex};

use crate::error::NormalizeError;

type Extractor = fn(&Captures<'_>) -> Option<NaiveDate>;

/// Patterns for dates that carry a month word, most specific first.
const ALPHA_RULES: [(&str, Extractor); 5] = [
    // September 15, 2021
    (
        r"(?P<month>[A-Z][a-z]+)\s(?P<day>[0-3][0-9]|[0-9]),\s(?P<year>[0-9]{4})",
        from_month_word,
    ),
    // 15 September 2021
    (
        r"(?P<day>[0-3][0-9]|[0-9])\s(?P<month>[A-Z][a-z]+)\s(?P<year>[0-9]{4})",
        from_month_word,
    ),
    // 2021/Sep/15
    (
        r"(?P<year>[0-9]{4})[/\-](?P<month>[A-Z][a-z]+)[/\-](?P<day>[0-3][0-9]|[0-9])",
        from_month_word,
    ),
    // 2021 September
    (
        r"(?P<year>[0-9]{4})[/\- ](?P<month>[A-Z][a-z]+)",
        from_month_word,
    ),
    // September 2021
    (
        r"(?P<month>[A-Z][a-z]+)[/\- ](?P<year>[0-9]{4})",
        from_month_word,
    ),
];

/// Patterns for purely numeric dates, most specific first.
const NUMERIC_RULES: [(&str, Extractor); 4] = [
    (
        r"(?P<year>[0-9]{4})[/\- ](?P<month>[0-1][0-9]|[0-9])[/\- ](?P<day>[0-3][0-9]|[0-9])",
        from_numbers,
    ),
    (
        r"(?P<year>[0-9]{4})[/\- ](?P<month>[0-1][0-9]|[0-9])",
        from_numbers,
    ),
    (
        r"(?P<month>[0-1][0-9]|[0-9])[/\- ](?P<year>[0-9]{4})",
        from_numbers,
    ),
    (r"(?P<year>[0-9]{4})", from_numbers),
];

fn compile(rules: &[(&str, Extractor)]) -> Vec<(Regex, Extractor)> {
    rules
        .iter()
        .map(|(pattern, extract)| (Regex::new(pattern).unwrap(), *extract))
        .collect()
}

fn alpha_rules() -> &'static [(Regex, Extractor)] {
    static RULES: OnceLock<Vec<(Regex, Extractor)>> = OnceLock::new();
    RULES.get_or_init(|| compile(&ALPHA_RULES))
}

fn numeric_rules() -> &'static [(Regex, Extractor)] {
    static RULES: OnceLock<Vec<(Regex, Extractor)>> = OnceLock::new();
    RULES.get_or_init(|| compile(&NUMERIC_RULES))
}

/// Parse a scraped release date into a calendar date.
///
/// Parenthetical qualifiers are dropped first. The remaining text is tried
/// against the month-word rules if it contains a lowercase letter and the
/// numeric rules otherwise. Only the first matching rule is applied; a
/// missing month or day collapses to the 1st.
pub fn normalize_date(raw: &str) -> Result<NaiveDate, NormalizeError> {
    let cleaned = strip_parentheticals(raw);
    let rules = if cleaned.chars().any(|c| c.is_ascii_lowercase()) {
        alpha_rules()
    } else {
        numeric_rules()
    };

    let unparsable = || NormalizeError::UnparsableDate(raw.to_string());
    for (re, extract) in rules {
        if let Some(caps) = re.captures(&cleaned) {
            return extract(&caps).ok_or_else(unparsable);
        }
    }
    Err(unparsable())
}

fn strip_parentheticals(raw: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"\([^)]*\)").unwrap());
    re.replace_all(raw, "").trim().to_string()
}

fn from_month_word(caps: &Captures<'_>) -> Option<NaiveDate> {
    let month = caps.name("month")?.as_str();
    let year = caps.name("year")?.as_str();
    let day = padded(caps.name("day").map_or("01", |m| m.as_str()));

    let joined = format!("{} {} {}", month, day, year);
    NaiveDate::parse_from_str(&joined, "%B %d %Y")
        .or_else(|_| NaiveDate::parse_from_str(&joined, "%b %d %Y"))
        .ok()
}

fn from_numbers(caps: &Captures<'_>) -> Option<NaiveDate> {
    let year: i32 = caps.name("year")?.as_str().parse().ok()?;
    let month: u32 = caps.name("month").map_or(Some(1), |m| m.as_str().parse().ok())?;
    let day: u32 = caps.name("day").map_or(Some(1), |m| m.as_str().parse().ok())?;
    NaiveDate::from_ymd_opt(year, month, day)
}

fn padded(part: &str) -> String {
    if part.len() == 1 {
        format!("0{}", part)
    } else {
        part.to_string()
    }
}
