//! Moment expression resolution.
//!
//! A moment arrives as an absolute millisecond count, a numeric string, an
//! ISO-8601 calendar date, a named time, or a relative sentence such as
//! `"1 hour after lunch"` or `"50% between open and close"`. Textual
//! sentences lower into the same structured variants a caller can build
//! directly, and everything resolves recursively down to absolute
//! milliseconds. Resolution never fails; input that defeats every rule
//! resolves to 0.

use crate::time::duration::{parse_duration, parse_plain_number, DurationSpec};
use crate::time::named::NamedTimeTable;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use tracing::warn;

/// A moment expression, prior to normalization.
///
/// The structured variants mirror the three relative sentence shapes;
/// parsing a sentence produces one of them, so pre-structured and textual
/// input share a single evaluation path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MomentSpec {
    /// An absolute timestamp in milliseconds since the epoch.
    Millis(f64),
    /// A textual form: numeric string, ISO date, named time, or sentence.
    Text(String),
    /// An explicit absolute reference to another moment.
    At { at: Box<MomentSpec> },
    /// A moment offset forward by a duration: `origin + duration`.
    After {
        starting: DurationSpec,
        after: Box<MomentSpec>,
    },
    /// A moment offset backward by a duration: `origin - duration`.
    Before {
        starting: DurationSpec,
        before: Box<MomentSpec>,
    },
    /// Linear interpolation: `between + (and - between) * interpolated`.
    Interpolated {
        interpolated: Fraction,
        between: Box<MomentSpec>,
        and: Box<MomentSpec>,
    },
}

impl From<f64> for MomentSpec {
    fn from(ms: f64) -> Self {
        MomentSpec::Millis(ms)
    }
}

impl From<i64> for MomentSpec {
    fn from(ms: i64) -> Self {
        MomentSpec::Millis(ms as f64)
    }
}

impl From<&str> for MomentSpec {
    fn from(text: &str) -> Self {
        MomentSpec::Text(text.to_string())
    }
}

impl From<String> for MomentSpec {
    fn from(text: String) -> Self {
        MomentSpec::Text(text)
    }
}

impl From<DateTime<Utc>> for MomentSpec {
    fn from(moment: DateTime<Utc>) -> Self {
        MomentSpec::Millis(moment.timestamp_millis() as f64)
    }
}

/// An interpolation fraction: a plain ratio, or text such as `"50%"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Fraction {
    Ratio(f64),
    Text(String),
}

impl Fraction {
    /// The fraction as a ratio in `0..=1` conventions; a `%` in textual
    /// input divides the leading number by 100.
    pub fn value(&self) -> f64 {
        match self {
            Fraction::Ratio(ratio) => *ratio,
            Fraction::Text(text) => {
                let scale = if text.contains('%') { 0.01 } else { 1.0 };
                leading_float(text) * scale
            }
        }
    }
}

impl From<f64> for Fraction {
    fn from(ratio: f64) -> Self {
        Fraction::Ratio(ratio)
    }
}

/// Reads the leading float off a string, `parseFloat`-style: `"50% off"`
/// yields 50. Returns 0 when the string does not start with a number.
fn leading_float(text: &str) -> f64 {
    let trimmed = text.trim_start();
    let mut end = 0;
    let bytes = trimmed.as_bytes();
    if end < bytes.len() && (bytes[end] == b'-' || bytes[end] == b'+') {
        end += 1;
    }
    let mut seen_dot = false;
    while end < bytes.len() {
        match bytes[end] {
            b'0'..=b'9' => end += 1,
            b'.' if !seen_dot => {
                seen_dot = true;
                end += 1;
            }
            _ => break,
        }
    }
    trimmed[..end].parse::<f64>().unwrap_or(0.0)
}

/// Resolves a moment expression into absolute milliseconds against a
/// named-time table.
pub fn resolve_moment(spec: &MomentSpec, table: &NamedTimeTable) -> f64 {
    ResolutionScope::new(table.entries()).resolve(spec)
}

/// One resolution pass over a set of named-time entries.
///
/// The scope tracks which names are mid-resolution so that a named time
/// whose expression (indirectly) references itself resolves to 0 with a
/// warning instead of recursing forever.
pub(crate) struct ResolutionScope<'a> {
    entries: &'a HashMap<String, MomentSpec>,
    in_progress: RefCell<HashSet<String>>,
}

impl<'a> ResolutionScope<'a> {
    pub(crate) fn new(entries: &'a HashMap<String, MomentSpec>) -> Self {
        Self {
            entries,
            in_progress: RefCell::new(HashSet::new()),
        }
    }

    pub(crate) fn resolve(&self, spec: &MomentSpec) -> f64 {
        match spec {
            MomentSpec::Millis(ms) => *ms,
            MomentSpec::Text(text) => self.resolve_text(text),
            MomentSpec::At { at } => self.resolve(at),
            MomentSpec::After { starting, after } => {
                self.resolve(after) + parse_duration(starting)
            }
            MomentSpec::Before { starting, before } => {
                self.resolve(before) - parse_duration(starting)
            }
            MomentSpec::Interpolated {
                interpolated,
                between,
                and,
            } => {
                let from = self.resolve(between);
                let to = self.resolve(and);
                from + (to - from) * interpolated.value()
            }
        }
    }

    fn resolve_text(&self, text: &str) -> f64 {
        // Plain decimal strings only; "infinity" or "1e3" may be table keys.
        if let Some(ms) = parse_plain_number(text) {
            return ms;
        }

        if let Some(expr) = self.entries.get(text) {
            if !self.in_progress.borrow_mut().insert(text.to_string()) {
                warn!(name = text, "named time cycle detected, resolving to 0");
                return 0.0;
            }
            let resolved = self.resolve(expr);
            self.in_progress.borrow_mut().remove(text);
            return resolved;
        }

        if let Some(ms) = parse_calendar_date(text) {
            return ms;
        }

        if let Some(lowered) = parse_sentence(text) {
            return self.resolve(&lowered);
        }

        0.0
    }
}

/// Parses an ISO-8601 calendar date or datetime; naive values read as UTC.
fn parse_calendar_date(text: &str) -> Option<f64> {
    if let Ok(moment) = DateTime::parse_from_rfc3339(text) {
        return Some(moment.timestamp_millis() as f64);
    }
    for format in ["%Y-%m-%dT%H:%M:%S%z", "%Y-%m-%dT%H:%M%z"] {
        if let Ok(moment) = DateTime::parse_from_str(text, format) {
            return Some(moment.timestamp_millis() as f64);
        }
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc().timestamp_millis() as f64);
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        let midnight = date.and_hms_opt(0, 0, 0)?;
        return Some(midnight.and_utc().timestamp_millis() as f64);
    }
    None
}

/// Lowers a relative sentence into a structured moment.
///
/// The alternatives are tried in order, first match wins:
///   1. `[interpolated] <pct> between|from <X> and|to <Y>`
///   2. `[starting] <dur> after|from|following <X>`
///   3. `[starting] <dur> before|until|preceeding <X>`
///   4. `at <X>` — here the `at` is mandatory, so garbage can never loop.
fn parse_sentence(text: &str) -> Option<MomentSpec> {
    if let Some(spec) = parse_interpolated_sentence(text) {
        return Some(spec);
    }

    let offset = text.strip_prefix("starting ").unwrap_or(text);
    if let Some((duration, origin)) = split_on_last_word(offset, &["after", "from", "following"]) {
        return Some(MomentSpec::After {
            starting: DurationSpec::from(duration),
            after: Box::new(MomentSpec::from(origin)),
        });
    }
    if let Some((duration, origin)) = split_on_last_word(offset, &["before", "until", "preceeding"])
    {
        return Some(MomentSpec::Before {
            starting: DurationSpec::from(duration),
            before: Box::new(MomentSpec::from(origin)),
        });
    }

    if let Some(origin) = split_after_at(text) {
        return Some(MomentSpec::At {
            at: Box::new(MomentSpec::from(origin)),
        });
    }

    None
}

fn parse_interpolated_sentence(text: &str) -> Option<MomentSpec> {
    let text = text.strip_prefix("interpolated ").unwrap_or(text);

    // Right-greedy like the original pattern: take the rightmost first
    // separator that still leaves a second separator after it.
    for (fraction, rest) in split_candidates(text, &["between", "from"]) {
        if let Some((between, and)) = split_on_last_word(rest, &["and", "to"]) {
            return Some(MomentSpec::Interpolated {
                interpolated: Fraction::Text(fraction.to_string()),
                between: Box::new(MomentSpec::from(between)),
                and: Box::new(MomentSpec::from(and)),
            });
        }
    }
    None
}

/// All `(left, right)` splits around a whitespace-delimited separator word,
/// rightmost first. Both sides must be non-empty.
fn split_candidates<'t>(
    text: &'t str,
    separators: &'static [&'static str],
) -> Vec<(&'t str, &'t str)> {
    let mut splits = Vec::new();
    for (idx, word) in word_positions(text) {
        if separators.contains(&word) {
            let left = text[..idx].trim_end();
            let right = text[idx + word.len()..].trim_start();
            if !left.is_empty() && !right.is_empty() {
                splits.push((left, right));
            }
        }
    }
    splits.reverse();
    splits
}

fn split_on_last_word<'t>(
    text: &'t str,
    separators: &'static [&'static str],
) -> Option<(&'t str, &'t str)> {
    split_candidates(text, separators).into_iter().next()
}

fn word_positions(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.split_whitespace()
        .map(move |word| (word.as_ptr() as usize - text.as_ptr() as usize, word))
}

/// Splits off everything after the first `at` token. The remainder shrinks
/// on every recursion, so unparseable text bottoms out at 0.
fn split_after_at(text: &str) -> Option<&str> {
    let idx = text.find("at ")?;
    let rest = text[idx + 3..].trim();
    if rest.is_empty() {
        None
    } else {
        Some(rest)
    }
}
