//! Time Range Context
//!
//! The active time window of each analysis session, and the two boundary
//! assignments (`timeRangeStart`, `timeRangeStop`) it contributes to every
//! query.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::variables::duration::FluxDuration;
use crate::variables::error::{VariableError, VariableResult};
use crate::variables::types::{Assignment, AssignmentSource, Expression};

/// Variable name for the lower bound of the session range
pub const TIME_RANGE_START: &str = "timeRangeStart";

/// Variable name for the upper bound of the session range
pub const TIME_RANGE_STOP: &str = "timeRangeStop";

/// One end of a time range
#[derive(Debug, Clone, PartialEq)]
pub enum TimeBound {
    /// The moment the query runs
    Now,
    /// Offset from now (`-1h` is one hour ago)
    Relative(FluxDuration),
    /// Fixed instant
    Absolute(DateTime<Utc>),
}

impl TimeBound {
    /// Parse `now`, `now()`, a signed duration, or an RFC 3339 instant
    pub fn parse(input: &str) -> VariableResult<Self> {
        let s = input.trim();
        if s == "now" || s == "now()" {
            return Ok(Self::Now);
        }
        if let Ok(d) = FluxDuration::parse(s) {
            return Ok(Self::Relative(d));
        }
        DateTime::parse_from_rfc3339(s)
            .map(|dt| Self::Absolute(dt.with_timezone(&Utc)))
            .map_err(|_| VariableError::InvalidTimeBound(input.to_string()))
    }

    /// Resolve against a reference instant; `None` when the offset leaves
    /// the representable range
    pub fn resolve(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Now => Some(now),
            Self::Relative(d) => now.checked_add_signed(d.to_chrono()),
            Self::Absolute(dt) => Some(*dt),
        }
    }

    /// Expression injected for this bound
    pub fn to_expression(&self) -> Expression {
        match self {
            Self::Now => Expression::Now,
            Self::Relative(d) => Expression::Duration(d.clone()),
            Self::Absolute(dt) => Expression::DateTime(*dt),
        }
    }
}

/// A lower/upper time window
#[derive(Debug, Clone, PartialEq)]
pub struct TimeRange {
    pub lower: TimeBound,
    pub upper: TimeBound,
}

impl TimeRange {
    /// Create a range from two bounds
    pub fn new(lower: TimeBound, upper: TimeBound) -> Self {
        Self { lower, upper }
    }

    /// Parse both bounds
    pub fn parse(lower: &str, upper: &str) -> VariableResult<Self> {
        Ok(Self::new(TimeBound::parse(lower)?, TimeBound::parse(upper)?))
    }

    /// The trailing window ending now, e.g. `TimeRange::last("1h")`
    pub fn last(duration: &str) -> VariableResult<Self> {
        let d = FluxDuration::parse(duration)?;
        let lower = if d.is_negative() {
            d
        } else {
            FluxDuration::parse(&format!("-{}", d))?
        };
        Ok(Self::new(TimeBound::Relative(lower), TimeBound::Now))
    }

    /// Length of the range at `now`; `None` when the range is empty,
    /// inverted or out of range
    pub fn span(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        let span = self.upper.resolve(now)? - self.lower.resolve(now)?;
        (span > chrono::Duration::zero()).then_some(span)
    }

    /// The start/stop assignments for this range
    pub fn assignments(&self) -> [Assignment; 2] {
        [
            Assignment::new(
                TIME_RANGE_START,
                self.lower.to_expression(),
                AssignmentSource::TimeRange,
            ),
            Assignment::new(
                TIME_RANGE_STOP,
                self.upper.to_expression(),
                AssignmentSource::TimeRange,
            ),
        ]
    }
}

/// Per-session time range lookup
#[async_trait]
pub trait TimeRangeContext: Send + Sync {
    /// Range of the given session, or `None` if it has not been initialized
    async fn range(&self, session_id: &str) -> Option<TimeRange>;
}

/// In-memory map of session id to time range
#[derive(Debug, Default)]
pub struct SessionTimeContexts {
    ranges: RwLock<HashMap<String, TimeRange>>,
}

impl SessionTimeContexts {
    /// Create an empty context map
    pub fn new() -> Self {
        Self::default()
    }

    /// Set or replace the range of a session
    pub async fn set(&self, session_id: impl Into<String>, range: TimeRange) {
        self.ranges.write().await.insert(session_id.into(), range);
    }

    /// Forget a session's range
    pub async fn clear(&self, session_id: &str) -> Option<TimeRange> {
        self.ranges.write().await.remove(session_id)
    }
}

#[async_trait]
impl TimeRangeContext for SessionTimeContexts {
    async fn range(&self, session_id: &str) -> Option<TimeRange> {
        self.ranges.read().await.get(session_id).cloned()
    }
}
