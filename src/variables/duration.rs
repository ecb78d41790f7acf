//! Flux Duration Literals
//!
//! Parses and renders duration literals such as `1h`, `-15m` and `1h30m`.
//!
//! # Supported Units
//!
//! ```text
//! ns us µs ms s m h d w mo y
//! ```
//!
//! Calendar units (`mo`, `y`) are approximated as 30 and 365 days when a
//! duration has to be converted into milliseconds.

use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{char, digit1},
    combinator::{map_res, opt, value},
    multi::many1,
    sequence::pair,
    IResult,
};
use serde_json::json;

use crate::variables::error::{VariableError, VariableResult};

/// Unit of a single duration component
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationUnit {
    Nanosecond,
    Microsecond,
    Millisecond,
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Year,
}

impl DurationUnit {
    /// Unit suffix as written in Flux
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Nanosecond => "ns",
            Self::Microsecond => "us",
            Self::Millisecond => "ms",
            Self::Second => "s",
            Self::Minute => "m",
            Self::Hour => "h",
            Self::Day => "d",
            Self::Week => "w",
            Self::Month => "mo",
            Self::Year => "y",
        }
    }

    /// Length of one unit in nanoseconds
    fn nanos(&self) -> i128 {
        const SECOND: i128 = 1_000_000_000;
        const DAY: i128 = 24 * 3600 * SECOND;
        match self {
            Self::Nanosecond => 1,
            Self::Microsecond => 1_000,
            Self::Millisecond => 1_000_000,
            Self::Second => SECOND,
            Self::Minute => 60 * SECOND,
            Self::Hour => 3600 * SECOND,
            Self::Day => DAY,
            Self::Week => 7 * DAY,
            Self::Month => 30 * DAY,
            Self::Year => 365 * DAY,
        }
    }
}

/// A signed Flux duration made of one or more `magnitude unit` parts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FluxDuration {
    negative: bool,
    parts: Vec<(i64, DurationUnit)>,
}

impl FluxDuration {
    /// Parse a duration literal like `-1h30m`
    pub fn parse(input: &str) -> VariableResult<Self> {
        let trimmed = input.trim();
        match duration_literal(trimmed) {
            Ok(("", duration)) => Ok(duration),
            _ => Err(VariableError::InvalidDuration(input.to_string())),
        }
    }

    /// A single-part duration expressed in milliseconds
    pub fn from_millis(millis: i64) -> Self {
        Self {
            negative: millis < 0,
            parts: vec![(millis.abs(), DurationUnit::Millisecond)],
        }
    }

    /// Whether the duration points into the past
    pub fn is_negative(&self) -> bool {
        self.negative
    }

    /// Components of the literal, without sign
    pub fn parts(&self) -> &[(i64, DurationUnit)] {
        &self.parts
    }

    /// Total length in milliseconds (signed, truncated)
    pub fn as_millis(&self) -> i64 {
        let nanos: i128 = self
            .parts
            .iter()
            .map(|(magnitude, unit)| (*magnitude as i128).saturating_mul(unit.nanos()))
            .fold(0, i128::saturating_add);
        // Symmetric bounds keep the negation below and chrono conversion in range
        let millis = (nanos / 1_000_000).clamp(-(i64::MAX as i128), i64::MAX as i128) as i64;
        if self.negative {
            -millis
        } else {
            millis
        }
    }

    /// Convert to a chrono duration
    pub fn to_chrono(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.as_millis())
    }

    /// JSON AST node for this literal; negative durations wrap a unary minus
    pub fn to_ast(&self) -> serde_json::Value {
        let values: Vec<serde_json::Value> = self
            .parts
            .iter()
            .map(|(magnitude, unit)| json!({ "magnitude": magnitude, "unit": unit.suffix() }))
            .collect();
        let literal = json!({ "type": "DurationLiteral", "values": values });

        if self.negative {
            json!({ "type": "UnaryExpression", "operator": "-", "argument": literal })
        } else {
            literal
        }
    }
}

impl std::fmt::Display for FluxDuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.negative {
            write!(f, "-")?;
        }
        for (magnitude, unit) in &self.parts {
            write!(f, "{}{}", magnitude, unit.suffix())?;
        }
        Ok(())
    }
}

fn duration_literal(input: &str) -> IResult<&str, FluxDuration> {
    let (input, sign) = opt(char('-'))(input)?;
    let (input, parts) = many1(pair(
        map_res(digit1, |s: &str| s.parse::<i64>()),
        duration_unit,
    ))(input)?;

    Ok((
        input,
        FluxDuration {
            negative: sign.is_some(),
            parts,
        },
    ))
}

fn duration_unit(input: &str) -> IResult<&str, DurationUnit> {
    // Two-letter units must be tried before their one-letter prefixes
    alt((
        value(DurationUnit::Month, tag("mo")),
        value(DurationUnit::Millisecond, tag("ms")),
        value(DurationUnit::Nanosecond, tag("ns")),
        value(DurationUnit::Microsecond, alt((tag("us"), tag("µs")))),
        value(DurationUnit::Year, tag("y")),
        value(DurationUnit::Week, tag("w")),
        value(DurationUnit::Day, tag("d")),
        value(DurationUnit::Hour, tag("h")),
        value(DurationUnit::Minute, tag("m")),
        value(DurationUnit::Second, tag("s")),
    ))(input)
}
