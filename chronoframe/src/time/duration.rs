//! Duration expression parsing.
//!
//! A duration arrives as a raw millisecond count, a numeric string, an
//! ISO-8601-style duration (`PT1H15M`), or a natural-language phrase
//! (`"1 hour and 15 minutes"`). Whatever the form, it resolves to a plain
//! `f64` millisecond count; unparseable input resolves to 0 and never fails.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

const MS_PER_SECOND: f64 = 1_000.0;
const MS_PER_MINUTE: f64 = 60.0 * MS_PER_SECOND;
const MS_PER_HOUR: f64 = 60.0 * MS_PER_MINUTE;
const MS_PER_DAY: f64 = 24.0 * MS_PER_HOUR;
const MS_PER_MONTH: f64 = 30.0 * MS_PER_DAY;
const MS_PER_YEAR: f64 = 365.0 * MS_PER_DAY;

/// Multipliers for the `[years, months, days, hours, minutes, seconds, ms]`
/// component slots shared by the ISO and natural-language paths.
const MULTIPLIERS: [f64; 7] = [
    MS_PER_YEAR,
    MS_PER_MONTH,
    MS_PER_DAY,
    MS_PER_HOUR,
    MS_PER_MINUTE,
    MS_PER_SECOND,
    1.0,
];

/// A duration expression, prior to normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DurationSpec {
    /// Already a millisecond count. Fractional and negative values are kept
    /// as-is; the caller decides what sign means.
    Millis(f64),
    /// A textual form: numeric string, ISO-8601 duration, or phrase.
    Text(String),
}

impl From<f64> for DurationSpec {
    fn from(ms: f64) -> Self {
        DurationSpec::Millis(ms)
    }
}

impl From<i64> for DurationSpec {
    fn from(ms: i64) -> Self {
        DurationSpec::Millis(ms as f64)
    }
}

impl From<&str> for DurationSpec {
    fn from(text: &str) -> Self {
        DurationSpec::Text(text.to_string())
    }
}

impl From<String> for DurationSpec {
    fn from(text: String) -> Self {
        DurationSpec::Text(text)
    }
}

fn iso_duration_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)^\s*P?\s*(?:(\d+(?:[.,]\d+)?)Y)?\s*(?:(\d+(?:[.,]\d+)?)M)?\s*(?:(\d+(?:[.,]\d+)?)D)?\s*T?\s*(?:(\d+(?:[.,]\d+)?)H)?\s*(?:(\d+(?:[.,]\d+)?)M)?\s*(?:(\d+(?:[.,]\d+)?)S)?\s*$",
        )
        .expect("ISO duration pattern is valid")
    })
}

/// Normalizes a duration expression into milliseconds.
///
/// Resolution order for textual input: full numeric string, ISO-8601
/// duration, natural-language phrase. Anything that defeats all three
/// resolves to 0.
pub fn parse_duration(spec: &DurationSpec) -> f64 {
    match spec {
        DurationSpec::Millis(ms) => *ms,
        DurationSpec::Text(text) => parse_duration_text(text),
    }
}

fn parse_duration_text(text: &str) -> f64 {
    if let Some(ms) = parse_plain_number(text) {
        return ms;
    }

    if let Some(parts) = parse_iso_components(text) {
        return sum_components(&parts);
    }

    sum_components(&scan_natural_components(text))
}

/// Parses a string that is entirely a plain decimal number.
///
/// Rust's float parser also accepts `"inf"`, `"NaN"`, and exponent forms
/// like `"1e3"`; those must stay textual here, or a named time literally
/// called `"infinity"` could never be looked up.
pub(crate) fn parse_plain_number(text: &str) -> Option<f64> {
    if text.bytes().any(|b| b.is_ascii_alphabetic()) {
        return None;
    }
    text.parse::<f64>().ok()
}

/// Matches the `P{n}Y{n}M{n}DT{n}H{n}M{n}S` family, every component
/// optional, `.` or `,` as the decimal separator.
fn parse_iso_components(text: &str) -> Option<[f64; 7]> {
    let caps = iso_duration_re().captures(text)?;
    // An all-empty match is a successful parse of e.g. "P" or "", which is
    // indistinguishable from garbage; require at least one component.
    if (1..=6).all(|i| caps.get(i).is_none()) {
        return None;
    }

    let mut parts = [0.0; 7];
    for (slot, group) in (1..=6).enumerate() {
        if let Some(m) = caps.get(group) {
            parts[slot] = parse_component(m.as_str());
        }
    }
    Some(parts)
}

fn parse_component(raw: &str) -> f64 {
    raw.replace(',', ".").parse::<f64>().unwrap_or(0.0)
}

/// Scans `<number> <optional unit-word>` tokens out of a phrase.
///
/// Connective words ("and") are skipped; a missing or unrecognized unit
/// word means milliseconds; the last quantity seen for a unit wins.
fn scan_natural_components(text: &str) -> [f64; 7] {
    let mut parts = [0.0; 7];
    let bytes = text.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        if !bytes[i].is_ascii_digit() {
            i += 1;
            continue;
        }

        let start = i;
        while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.' || bytes[i] == b',')
        {
            i += 1;
        }
        let qty = parse_component(&text[start..i]);

        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        let word_start = i;
        while i < bytes.len() && bytes[i].is_ascii_alphabetic() {
            i += 1;
        }

        let slot = unit_slot(&text[word_start..i]).unwrap_or(6);
        parts[slot] = qty;
    }

    parts
}

fn unit_slot(word: &str) -> Option<usize> {
    let w = word.to_ascii_lowercase();
    match w.as_str() {
        "y" | "yr" | "yrs" | "year" | "years" => Some(0),
        "mon" | "mons" | "month" | "months" => Some(1),
        "d" | "day" | "days" => Some(2),
        "h" | "hr" | "hrs" | "hour" | "hours" => Some(3),
        "min" | "mins" | "minute" | "minutes" => Some(4),
        "s" | "sec" | "secs" | "second" | "seconds" => Some(5),
        "ms" | "msec" | "msecs" | "milli" | "millis" | "millisecond" | "milliseconds" => Some(6),
        _ => None,
    }
}

fn sum_components(parts: &[f64; 7]) -> f64 {
    parts
        .iter()
        .zip(MULTIPLIERS.iter())
        .map(|(qty, mult)| qty * mult)
        .sum()
}
