//! Variable Types
//!
//! Core data types for query parameters:
//!
//! - `Expression`: a literal or reference that can be injected into a query
//! - `Variable`: a user-defined, named parameter with dependencies
//! - `Assignment`: a resolved `name = expression` pair ready for injection

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::json;
use std::collections::BTreeSet;

use crate::variables::duration::FluxDuration;

/// Name of the record that carries all injected variables (`v.bucket`, ...)
pub const VARIABLE_RECORD: &str = "v";

/// A value that can be bound to a variable name
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Quoted string
    String(String),
    /// 64-bit integer
    Integer(i64),
    /// Floating point number
    Float(f64),
    /// Boolean
    Boolean(bool),
    /// Duration literal like `-1h`
    Duration(FluxDuration),
    /// Absolute instant
    DateTime(DateTime<Utc>),
    /// `now()`
    Now,
    /// Another variable, written `v.name`
    Reference(String),
}

impl Expression {
    /// Interpret free-form user input as the most specific literal it matches
    ///
    /// Order: `now`, `v.<name>`, double-quoted string, boolean, integer,
    /// float, duration, RFC 3339 instant, plain string.
    pub fn parse_literal(input: &str) -> Self {
        let s = input.trim();

        if s == "now" || s == "now()" {
            return Self::Now;
        }
        if let Some(name) = s.strip_prefix("v.") {
            if is_identifier(name) {
                return Self::Reference(name.to_string());
            }
        }
        if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
            return Self::String(s[1..s.len() - 1].to_string());
        }
        match s {
            "true" => return Self::Boolean(true),
            "false" => return Self::Boolean(false),
            _ => {}
        }
        if let Ok(i) = s.parse::<i64>() {
            return Self::Integer(i);
        }
        if let Ok(f) = s.parse::<f64>() {
            if f.is_finite() {
                return Self::Float(f);
            }
        }
        if let Ok(d) = FluxDuration::parse(s) {
            return Self::Duration(d);
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Self::DateTime(dt.with_timezone(&Utc));
        }

        Self::String(s.to_string())
    }

    /// Name of the variable this expression refers to, if any
    pub fn reference(&self) -> Option<&str> {
        match self {
            Self::Reference(name) => Some(name),
            _ => None,
        }
    }

    /// JSON AST node understood by the query backend's `extern` field
    pub fn to_ast(&self) -> serde_json::Value {
        match self {
            Self::String(s) => json!({ "type": "StringLiteral", "value": s }),
            // Integer literals travel as strings in the AST
            Self::Integer(i) => json!({ "type": "IntegerLiteral", "value": i.to_string() }),
            Self::Float(f) => json!({ "type": "FloatLiteral", "value": f }),
            Self::Boolean(b) => json!({ "type": "BooleanLiteral", "value": b }),
            Self::Duration(d) => d.to_ast(),
            Self::DateTime(dt) => json!({
                "type": "DateTimeLiteral",
                "value": dt.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            }),
            Self::Now => json!({
                "type": "CallExpression",
                "callee": { "type": "Identifier", "name": "now" },
            }),
            Self::Reference(name) => json!({
                "type": "MemberExpression",
                "object": { "type": "Identifier", "name": VARIABLE_RECORD },
                "property": { "type": "Identifier", "name": name },
            }),
        }
    }
}

impl std::fmt::Display for Expression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String(s) => {
                write!(f, "\"")?;
                for c in s.chars() {
                    match c {
                        '"' => write!(f, "\\\"")?,
                        '\\' => write!(f, "\\\\")?,
                        '\n' => write!(f, "\\n")?,
                        c => write!(f, "{}", c)?,
                    }
                }
                write!(f, "\"")
            }
            Self::Integer(i) => write!(f, "{}", i),
            Self::Float(v) => {
                if v.fract() == 0.0 {
                    write!(f, "{:.1}", v)
                } else {
                    write!(f, "{}", v)
                }
            }
            Self::Boolean(b) => write!(f, "{}", b),
            Self::Duration(d) => write!(f, "{}", d),
            Self::DateTime(dt) => write!(f, "{}", dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            Self::Now => write!(f, "now()"),
            Self::Reference(name) => write!(f, "{}.{}", VARIABLE_RECORD, name),
        }
    }
}

/// How a variable produces its value
#[derive(Debug, Clone, PartialEq)]
pub enum VariableKind {
    /// A single expression
    Expression(Expression),
    /// A list of string choices with an optional selection
    Constant {
        values: Vec<String>,
        selected: Option<String>,
    },
    /// Display keys mapped to string values, with an optional selected key
    Map {
        entries: Vec<(String, String)>,
        selected: Option<String>,
    },
}

/// A user-defined query variable
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    /// Variable name, unique within a resolution pass
    pub name: String,
    /// Value source
    pub kind: VariableKind,
    /// Names this variable must be evaluated after
    pub depends_on: BTreeSet<String>,
}

impl Variable {
    /// Create a variable bound to a single expression
    pub fn new(name: impl Into<String>, expression: Expression) -> Self {
        Self {
            name: name.into(),
            kind: VariableKind::Expression(expression),
            depends_on: BTreeSet::new(),
        }
    }

    /// Create a constant-list variable
    pub fn constant(name: impl Into<String>, values: &[&str], selected: Option<&str>) -> Self {
        Self {
            name: name.into(),
            kind: VariableKind::Constant {
                values: values.iter().map(|v| v.to_string()).collect(),
                selected: selected.map(str::to_string),
            },
            depends_on: BTreeSet::new(),
        }
    }

    /// Create a map variable
    pub fn map(name: impl Into<String>, entries: &[(&str, &str)], selected: Option<&str>) -> Self {
        Self {
            name: name.into(),
            kind: VariableKind::Map {
                entries: entries
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                selected: selected.map(str::to_string),
            },
            depends_on: BTreeSet::new(),
        }
    }

    /// Declare an explicit dependency
    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        self.depends_on.insert(name.into());
        self
    }

    /// Declared dependencies plus any `v.<name>` reference in the expression
    pub fn dependencies(&self) -> BTreeSet<String> {
        let mut deps = self.depends_on.clone();
        if let VariableKind::Expression(expr) = &self.kind {
            if let Some(name) = expr.reference() {
                deps.insert(name.to_string());
            }
        }
        deps
    }

    /// Resolve into the assignments this variable contributes
    ///
    /// Constant and map variables without a selection fall back to their
    /// first entry. A map selection naming a missing key contributes nothing.
    pub fn resolve(&self) -> Vec<Assignment> {
        let value = match &self.kind {
            VariableKind::Expression(expr) => Some(expr.clone()),
            VariableKind::Constant { values, selected } => selected
                .clone()
                .or_else(|| values.first().cloned())
                .map(Expression::String),
            VariableKind::Map { entries, selected } => match selected {
                Some(key) => entries
                    .iter()
                    .find(|(k, _)| k == key)
                    .map(|(_, v)| Expression::String(v.clone())),
                None => entries.first().map(|(_, v)| Expression::String(v.clone())),
            },
        };

        value
            .map(|value| vec![Assignment::new(&self.name, value, AssignmentSource::Explicit)])
            .unwrap_or_default()
    }
}

/// Where an assignment came from, in precedence order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AssignmentSource {
    /// User-defined variable
    Explicit,
    /// Derived from the session time range
    TimeRange,
    /// Computed window period
    Window,
}

impl std::fmt::Display for AssignmentSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Explicit => write!(f, "explicit"),
            Self::TimeRange => write!(f, "time-range"),
            Self::Window => write!(f, "window"),
        }
    }
}

/// A resolved `name = value` pair
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub name: String,
    pub value: Expression,
    pub source: AssignmentSource,
}

impl Assignment {
    /// Create a new assignment
    pub fn new(name: impl Into<String>, value: Expression, source: AssignmentSource) -> Self {
        Self {
            name: name.into(),
            value,
            source,
        }
    }
}

/// Whether `s` is a valid identifier (`[A-Za-z_][A-Za-z0-9_]*`)
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
