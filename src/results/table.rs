//! Result Tables
//!
//! Typed, structured form of a query response:
//!
//! - `DataType` / `Value`: declared column types and typed cells
//! - `Column`: column metadata from the annotation rows
//! - `Table`: one partition, with row-major and column-major access
//! - `FluxResult`: every table of a response

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::fmt;

/// Column data type declared by the `#datatype` annotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DataType {
    String,
    Long,
    UnsignedLong,
    Double,
    Boolean,
    DateTime,
    Duration,
    Base64Binary,
}

impl DataType {
    /// Parse an annotation value such as `dateTime:RFC3339`
    pub fn from_annotation(s: &str) -> Option<Self> {
        match s {
            "string" | "tag" => Some(Self::String),
            "long" => Some(Self::Long),
            "unsignedLong" => Some(Self::UnsignedLong),
            "double" => Some(Self::Double),
            "boolean" => Some(Self::Boolean),
            "dateTime" | "dateTime:RFC3339" | "dateTime:RFC3339Nano" => Some(Self::DateTime),
            "duration" => Some(Self::Duration),
            "base64Binary" => Some(Self::Base64Binary),
            _ => None,
        }
    }

    /// Convert a raw cell into a typed value
    pub fn parse_value(&self, raw: &str) -> Option<Value> {
        Some(match self {
            Self::String | Self::Base64Binary => Value::String(raw.to_string()),
            Self::Long => Value::Long(raw.parse().ok()?),
            Self::UnsignedLong => Value::UnsignedLong(raw.parse().ok()?),
            Self::Double => Value::Double(raw.parse().ok()?),
            Self::Boolean => match raw {
                "true" => Value::Boolean(true),
                "false" => Value::Boolean(false),
                _ => return None,
            },
            Self::DateTime => Value::DateTime(
                DateTime::parse_from_rfc3339(raw)
                    .ok()?
                    .with_timezone(&Utc),
            ),
            Self::Duration => Value::Duration(raw.to_string()),
        })
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "string",
            Self::Long => "long",
            Self::UnsignedLong => "unsignedLong",
            Self::Double => "double",
            Self::Boolean => "boolean",
            Self::DateTime => "dateTime:RFC3339",
            Self::Duration => "duration",
            Self::Base64Binary => "base64Binary",
        };
        write!(f, "{}", name)
    }
}

/// A typed cell
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    String(String),
    Long(i64),
    UnsignedLong(u64),
    Double(f64),
    Boolean(bool),
    DateTime(DateTime<Utc>),
    Duration(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) | Self::Duration(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric view of long, unsigned and double cells
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Long(v) => Some(*v as f64),
            Self::UnsignedLong(v) => Some(*v as f64),
            Self::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::DateTime(dt) => Some(*dt),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::String(s) | Self::Duration(s) => write!(f, "{}", s),
            Self::Long(v) => write!(f, "{}", v),
            Self::UnsignedLong(v) => write!(f, "{}", v),
            Self::Double(v) => write!(f, "{}", v),
            Self::Boolean(v) => write!(f, "{}", v),
            Self::DateTime(dt) => write!(f, "{}", dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        }
    }
}

/// Column metadata
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    pub name: String,
    pub data_type: DataType,
    /// Part of the group key (`#group` true)
    pub group: bool,
    /// Value used for empty cells (`#default`)
    pub default: Option<String>,
}

/// One partition of a response
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table {
    /// Position of this table in the response
    pub id: usize,
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Column names in order
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Index of a column by name
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Column-major access to every value of one column
    pub fn column(&self, name: &str) -> Option<Vec<&Value>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|row| &row[idx]).collect())
    }

    /// Row-major access to one row
    pub fn row(&self, index: usize) -> Option<Row<'_>> {
        self.rows.get(index).map(|values| Row {
            columns: &self.columns,
            values,
        })
    }

    /// Iterate rows
    pub fn iter(&self) -> impl Iterator<Item = Row<'_>> {
        self.rows.iter().map(|values| Row {
            columns: &self.columns,
            values,
        })
    }

    /// Group-key column names and their values for this partition
    pub fn group_key(&self) -> Vec<(&str, &Value)> {
        let Some(first) = self.rows.first() else {
            return Vec::new();
        };
        self.columns
            .iter()
            .zip(first.iter())
            .filter(|(c, _)| c.group)
            .map(|(c, v)| (c.name.as_str(), v))
            .collect()
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cells: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|row| row.iter().map(|v| v.to_string()).collect())
            .collect();
        let widths: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| {
                cells
                    .iter()
                    .map(|row| row[i].chars().count())
                    .chain(std::iter::once(c.name.chars().count()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let header: Vec<String> = self
            .columns
            .iter()
            .zip(&widths)
            .map(|(c, w)| format!("{:<w$}", c.name, w = *w))
            .collect();
        writeln!(f, "{}", header.join("  ").trim_end())?;

        let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        writeln!(f, "{}", rule.join("  "))?;

        for row in &cells {
            let line: Vec<String> = row
                .iter()
                .zip(&widths)
                .map(|(v, w)| format!("{:<w$}", v, w = *w))
                .collect();
            writeln!(f, "{}", line.join("  ").trim_end())?;
        }
        Ok(())
    }
}

/// Borrowed view of one row
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    columns: &'a [Column],
    values: &'a [Value],
}

impl<'a> Row<'a> {
    /// Value of a column by name
    pub fn get(&self, name: &str) -> Option<&'a Value> {
        let idx = self.columns.iter().position(|c| c.name == name)?;
        self.values.get(idx)
    }

    /// All values in column order
    pub fn values(&self) -> &'a [Value] {
        self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// All tables of one response
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FluxResult {
    pub tables: Vec<Table>,
}

impl FluxResult {
    /// An empty result
    pub fn empty() -> Self {
        Self::default()
    }

    /// Total rows across all tables
    pub fn row_count(&self) -> usize {
        self.tables.iter().map(Table::len).sum()
    }

    /// Whether no table has any row
    pub fn is_empty(&self) -> bool {
        self.row_count() == 0
    }

    /// Names of every column marked as group key in any table
    pub fn group_key_union(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for column in self.tables.iter().flat_map(|t| &t.columns) {
            if column.group && !names.contains(&column.name.as_str()) {
                names.push(&column.name);
            }
        }
        names
    }

    /// Distinct values of the `result` column, in first-seen order
    pub fn result_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for table in &self.tables {
            if let Some(values) = table.column("result") {
                for value in values.into_iter().filter_map(Value::as_str) {
                    if !names.contains(&value) {
                        names.push(value);
                    }
                }
            }
        }
        names
    }
}
