//! Window Variables
//!
//! Detects implicit window identifiers (`v.windowPeriod`) in query text and
//! computes their value from the session time range.
//!
//! # Window Period Heuristic
//!
//! ```text
//! span matches a preset range  → preset period
//! otherwise                    → max(span / desired_points, min_period)
//! span unknown / empty         → fallback_period
//! ```
//!
//! With the defaults a one hour range yields `10000ms` (preset) and a three
//! hour range yields `30000ms` (3h / 360).

use std::collections::BTreeSet;

use crate::variables::duration::FluxDuration;
use crate::variables::types::VARIABLE_RECORD;

/// Default window identifier
pub const WINDOW_PERIOD: &str = "windowPeriod";

/// Target number of points per series
pub const DEFAULT_DESIRED_POINTS: u32 = 360;

/// Period used when the range span cannot be computed
pub const DEFAULT_FALLBACK_PERIOD_MS: i64 = 15_000;

/// Smallest period ever produced
pub const DEFAULT_MIN_PERIOD_MS: i64 = 1;

const MINUTE_MS: i64 = 60 * 1000;
const HOUR_MS: i64 = 60 * MINUTE_MS;
const DAY_MS: i64 = 24 * HOUR_MS;

/// Well-known range spans and the period used for each (span ms, period ms)
const PRESETS: &[(i64, i64)] = &[
    (5 * MINUTE_MS, 10_000),
    (15 * MINUTE_MS, 10_000),
    (HOUR_MS, 10_000),
    (6 * HOUR_MS, 60_000),
    (12 * HOUR_MS, 120_000),
    (DAY_MS, 240_000),
    (2 * DAY_MS, 600_000),
    (7 * DAY_MS, 1_800_000),
    (30 * DAY_MS, 3_600_000),
];

/// Policy for turning a range span into a window period
#[derive(Debug, Clone, PartialEq)]
pub struct WindowPolicy {
    pub desired_points: u32,
    pub min_period_ms: i64,
    pub fallback_period_ms: i64,
    pub use_presets: bool,
}

impl Default for WindowPolicy {
    fn default() -> Self {
        Self {
            desired_points: DEFAULT_DESIRED_POINTS,
            min_period_ms: DEFAULT_MIN_PERIOD_MS,
            fallback_period_ms: DEFAULT_FALLBACK_PERIOD_MS,
            use_presets: true,
        }
    }
}

impl WindowPolicy {
    /// Window period in milliseconds for a range span
    pub fn period_millis(&self, span: Option<chrono::Duration>) -> i64 {
        let span_ms = match span.map(|s| s.num_milliseconds()) {
            Some(ms) if ms > 0 => ms,
            _ => return self.fallback_period_ms,
        };

        if self.use_presets {
            if let Some((_, period)) = PRESETS.iter().find(|(preset, _)| *preset == span_ms) {
                return *period;
            }
        }

        let points = i64::from(self.desired_points.max(1));
        // Round to nearest like the dashboards do
        let period = (span_ms + points / 2) / points;
        period.max(self.min_period_ms)
    }

    /// Window period as a duration literal
    pub fn period_for(&self, span: Option<chrono::Duration>) -> FluxDuration {
        FluxDuration::from_millis(self.period_millis(span))
    }
}

/// Token produced by the lightweight query scanner
#[derive(Debug, Clone, PartialEq)]
enum Token<'a> {
    Ident(&'a str),
    Str(String),
    Punct(char),
}

/// Scans query text for window identifiers used as members of `v`
#[derive(Debug, Clone)]
pub struct WindowVariableDetector {
    identifiers: BTreeSet<String>,
}

impl Default for WindowVariableDetector {
    fn default() -> Self {
        Self::new([WINDOW_PERIOD])
    }
}

impl WindowVariableDetector {
    /// Detector for the given reserved identifiers
    pub fn new<I, S>(identifiers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            identifiers: identifiers.into_iter().map(Into::into).collect(),
        }
    }

    /// Reserved identifiers this detector looks for
    pub fn identifiers(&self) -> &BTreeSet<String> {
        &self.identifiers
    }

    /// Window identifiers referenced by `text`
    ///
    /// Matches `v.<ident>` and `v["<ident>"]`. Occurrences inside string
    /// literals and `//` comments are ignored.
    pub fn detect(&self, text: &str) -> BTreeSet<String> {
        let tokens = tokenize(text);
        let mut found = BTreeSet::new();

        for (i, token) in tokens.iter().enumerate() {
            if *token != Token::Ident(VARIABLE_RECORD) {
                continue;
            }
            let member = match (tokens.get(i + 1), tokens.get(i + 2), tokens.get(i + 3)) {
                (Some(Token::Punct('.')), Some(Token::Ident(name)), _) => Some(name.to_string()),
                (Some(Token::Punct('[')), Some(Token::Str(name)), Some(Token::Punct(']'))) => {
                    Some(name.clone())
                }
                _ => None,
            };
            if let Some(name) = member {
                if self.identifiers.contains(&name) {
                    found.insert(name);
                }
            }
        }

        found
    }
}

fn tokenize(text: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut chars = text.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        if c.is_whitespace() {
            continue;
        }
        if c == '/' && matches!(chars.peek(), Some((_, '/'))) {
            for (_, c) in chars.by_ref() {
                if c == '\n' {
                    break;
                }
            }
            continue;
        }
        if c == '"' {
            let mut value = String::new();
            while let Some((_, c)) = chars.next() {
                match c {
                    '"' => break,
                    '\\' => {
                        if let Some((_, escaped)) = chars.next() {
                            value.push(escaped);
                        }
                    }
                    c => value.push(c),
                }
            }
            tokens.push(Token::Str(value));
            continue;
        }
        if c.is_alphabetic() || c == '_' {
            let mut end = start + c.len_utf8();
            while let Some(&(idx, next)) = chars.peek() {
                if next.is_alphanumeric() || next == '_' {
                    end = idx + next.len_utf8();
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Token::Ident(&text[start..end]));
            continue;
        }
        tokens.push(Token::Punct(c));
    }

    tokens
}
