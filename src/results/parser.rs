//! Annotated CSV Parser
//!
//! Parses the backend's annotated CSV into [`FluxResult`] tables.
//!
//! # Format
//!
//! ```text
//! #group,false,false,true,false
//! #datatype,string,long,string,double
//! #default,_result,,,
//! ,result,table,host,_value
//! ,,0,a,1.5
//! ,,1,b,2.5
//!
//! #group,...            ← a new annotation block starts a new table
//! ```
//!
//! The first field of every record is the annotation column. A new table
//! starts at each annotation block (or after a blank line), and within a
//! block whenever the `table` column or any group-key value changes.

use csv::{ReaderBuilder, StringRecord};

use crate::results::error::{ParseError, ParseResult};
use crate::results::table::{Column, DataType, FluxResult, Table, Value};

const DATATYPE: &str = "#datatype";
const GROUP: &str = "#group";
const DEFAULT: &str = "#default";
const TABLE_COLUMN: &str = "table";

/// Parse a complete annotated CSV response
pub fn parse_annotated_csv(raw: &str) -> ParseResult<FluxResult> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(raw.as_bytes());

    let mut tables: Vec<Table> = Vec::new();
    let mut block = Block::default();
    // Last physical line consumed by the previous record
    let mut last_line: Option<u64> = None;

    for record in reader.records() {
        let record = record?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);

        let after_blank = last_line.map(|l| line > l + 1).unwrap_or(false);
        last_line = Some(line + embedded_newlines(&record));

        if is_blank(&record) {
            continue;
        }

        let is_annotation = record
            .get(0)
            .map(|f| f.starts_with('#'))
            .unwrap_or(false);

        if (is_annotation && block.columns.is_some()) || after_blank {
            block.finish(&mut tables);
        }

        if is_annotation {
            block.annotate(&record, line)?;
        } else if block.columns.is_none() {
            block.header(&record, line)?;
        } else {
            block.row(&record, line)?;
        }
    }
    block.finish(&mut tables);

    tracing::trace!(tables = tables.len(), "parsed annotated csv");
    Ok(FluxResult { tables })
}

fn is_blank(record: &StringRecord) -> bool {
    record.iter().all(|f| f.trim().is_empty()) && record.len() <= 1
}

fn embedded_newlines(record: &StringRecord) -> u64 {
    record
        .iter()
        .map(|f| f.matches('\n').count() as u64)
        .sum()
}

/// Parsing state of one annotation block
#[derive(Debug, Default)]
struct Block {
    width: Option<usize>,
    datatypes: Option<Vec<DataType>>,
    groups: Vec<bool>,
    defaults: Vec<Option<String>>,
    columns: Option<Vec<Column>>,
    table_index: Option<usize>,
    current: Option<Table>,
    current_key: Vec<String>,
    /// Tables of this block closed by a group-key change
    pending: Vec<Table>,
}

impl Block {
    fn check_width(&mut self, record: &StringRecord, line: u64) -> ParseResult<()> {
        let expected = *self.width.get_or_insert(record.len());
        if record.len() != expected {
            return Err(ParseError::ColumnCount {
                line,
                expected: expected.saturating_sub(1),
                found: record.len().saturating_sub(1),
            });
        }
        Ok(())
    }

    fn annotate(&mut self, record: &StringRecord, line: u64) -> ParseResult<()> {
        self.check_width(record, line)?;
        let fields = record.iter().skip(1);

        match record.get(0).unwrap_or_default() {
            DATATYPE => {
                let types = fields
                    .enumerate()
                    .map(|(column, name)| {
                        DataType::from_annotation(name).ok_or_else(|| ParseError::UnknownDataType {
                            line,
                            column,
                            data_type: name.to_string(),
                        })
                    })
                    .collect::<ParseResult<Vec<_>>>()?;
                self.datatypes = Some(types);
            }
            GROUP => self.groups = fields.map(|f| f == "true").collect(),
            DEFAULT => {
                self.defaults = fields
                    .map(|f| (!f.is_empty()).then(|| f.to_string()))
                    .collect()
            }
            other => tracing::debug!(annotation = other, line, "ignoring unknown annotation"),
        }
        Ok(())
    }

    fn header(&mut self, record: &StringRecord, line: u64) -> ParseResult<()> {
        let Some(types) = self.datatypes.take() else {
            return Err(ParseError::MissingAnnotation { line });
        };
        self.check_width(record, line)?;

        let columns: Vec<Column> = record
            .iter()
            .skip(1)
            .zip(types)
            .enumerate()
            .map(|(i, (name, data_type))| Column {
                name: name.to_string(),
                data_type,
                group: self.groups.get(i).copied().unwrap_or(false),
                default: self.defaults.get(i).cloned().flatten(),
            })
            .collect();

        self.table_index = columns.iter().position(|c| c.name == TABLE_COLUMN);
        self.columns = Some(columns);
        Ok(())
    }

    fn row(&mut self, record: &StringRecord, line: u64) -> ParseResult<()> {
        self.check_width(record, line)?;
        let columns = self.columns.as_ref().map(Vec::as_slice).unwrap_or_default();

        let mut values = Vec::with_capacity(columns.len());
        let mut key = Vec::new();
        for (i, (raw, column)) in record.iter().skip(1).zip(columns).enumerate() {
            let cell = if raw.is_empty() {
                column.default.as_deref().unwrap_or("")
            } else {
                raw
            };
            if column.group || Some(i) == self.table_index {
                key.push(cell.to_string());
            }

            let value = if cell.is_empty() {
                Value::Null
            } else {
                column
                    .data_type
                    .parse_value(cell)
                    .ok_or_else(|| ParseError::InvalidValue {
                        line,
                        column: column.name.clone(),
                        data_type: column.data_type.to_string(),
                        value: cell.to_string(),
                    })?
            };
            values.push(value);
        }

        let starts_new_table = match &self.current {
            Some(table) => !table.rows.is_empty() && key != self.current_key,
            None => true,
        };
        if starts_new_table {
            if let Some(done) = self.current.take() {
                self.pending.push(done);
            }
            self.current = Some(Table {
                id: 0,
                columns: columns.to_vec(),
                rows: Vec::new(),
            });
            self.current_key = key;
        }
        if let Some(table) = self.current.as_mut() {
            table.rows.push(values);
        }
        Ok(())
    }

    /// Move completed tables into `tables` and reset for the next block
    fn finish(&mut self, tables: &mut Vec<Table>) {
        let mut done: Vec<Table> = std::mem::take(&mut self.pending);
        match self.current.take() {
            Some(table) => done.push(table),
            // Header with no rows still describes the columns
            None => {
                if let Some(columns) = self.columns.take() {
                    done.push(Table {
                        id: 0,
                        columns,
                        rows: Vec::new(),
                    });
                }
            }
        }
        for mut table in done {
            table.id = tables.len();
            tables.push(table);
        }
        *self = Block::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESPONSE: &str = "\
#group,false,false,true,true,false,false,true,true
#datatype,string,long,dateTime:RFC3339,dateTime:RFC3339,dateTime:RFC3339,double,string,string
#default,_result,,,,,,,
,result,table,_start,_stop,_time,_value,_field,host
,,0,2024-03-01T11:00:00Z,2024-03-01T12:00:00Z,2024-03-01T11:10:00Z,1.5,usage,a
,,0,2024-03-01T11:00:00Z,2024-03-01T12:00:00Z,2024-03-01T11:20:00Z,2.5,usage,a
,,1,2024-03-01T11:00:00Z,2024-03-01T12:00:00Z,2024-03-01T11:10:00Z,7,usage,b

#group,false,false,true,false
#datatype,string,long,string,long
#default,counts,,,
,result,table,host,_value
,,0,a,2
";

    #[test]
    fn test_parse_partitions_and_blocks() {
        let result = parse_annotated_csv(RESPONSE).unwrap();
        assert_eq!(result.tables.len(), 3);
        assert_eq!(result.row_count(), 4);

        let first = &result.tables[0];
        assert_eq!(first.id, 0);
        assert_eq!(first.len(), 2);
        assert_eq!(first.columns.len(), 8);
        assert_eq!(first.row(0).unwrap().get("result"), Some(&Value::String("_result".into())));
        assert_eq!(first.row(1).unwrap().get("_value"), Some(&Value::Double(2.5)));
        assert!(first.row(0).unwrap().get("_time").unwrap().as_datetime().is_some());

        let second = &result.tables[1];
        assert_eq!(second.row(0).unwrap().get("host"), Some(&Value::String("b".into())));

        let third = &result.tables[2];
        assert_eq!(third.id, 2);
        assert_eq!(third.row(0).unwrap().get("_value"), Some(&Value::Long(2)));
        assert_eq!(result.result_names(), vec!["_result", "counts"]);
    }

    #[test]
    fn test_every_row_has_header_width() {
        let result = parse_annotated_csv(RESPONSE).unwrap();
        for table in &result.tables {
            for row in table.iter() {
                assert_eq!(row.len(), table.columns.len());
            }
        }
    }

    #[test]
    fn test_group_key_change_without_table_column() {
        let raw = "\
#group,false,true,false
#datatype,string,string,double
#default,,,
,result,host,_value
,,a,1
,,a,2
,,b,3
";
        let result = parse_annotated_csv(raw).unwrap();
        assert_eq!(result.tables.len(), 2);
        assert_eq!(result.tables[0].len(), 2);
        assert_eq!(result.tables[1].len(), 1);
        assert_eq!(result.group_key_union(), vec!["host"]);
    }

    #[test]
    fn test_new_block_without_blank_line() {
        let raw = "\
#datatype,string,long
,result,_value
,,1
#datatype,string,string
,result,msg
,,hi
";
        let result = parse_annotated_csv(raw).unwrap();
        assert_eq!(result.tables.len(), 2);
        assert_eq!(result.tables[1].row(0).unwrap().get("msg"), Some(&Value::String("hi".into())));
    }

    #[test]
    fn test_empty_input() {
        let result = parse_annotated_csv("").unwrap();
        assert!(result.tables.is_empty());
        assert!(result.is_empty());

        let result = parse_annotated_csv("\n\n").unwrap();
        assert!(result.tables.is_empty());
    }

    #[test]
    fn test_header_without_rows_is_empty_table() {
        let raw = "#datatype,string,long\n,result,_value\n";
        let result = parse_annotated_csv(raw).unwrap();
        assert_eq!(result.tables.len(), 1);
        assert!(result.tables[0].is_empty());
        assert_eq!(result.tables[0].column_names(), vec!["result", "_value"]);
    }

    #[test]
    fn test_short_row_cites_line() {
        let raw = "\
#datatype,string,long,double
,result,table,_value
,,0,1.0
,,0
";
        let err = parse_annotated_csv(raw).unwrap_err();
        assert_eq!(
            err,
            ParseError::ColumnCount {
                line: 4,
                expected: 3,
                found: 2
            }
        );
    }

    #[test]
    fn test_missing_annotation() {
        let err = parse_annotated_csv(",result,_value\n,,1\n").unwrap_err();
        assert_eq!(err, ParseError::MissingAnnotation { line: 1 });

        let raw = "#datatype,string,long\n,result,_value\n,,1\n\n,result,_value\n,,2\n";
        let err = parse_annotated_csv(raw).unwrap_err();
        assert_eq!(err, ParseError::MissingAnnotation { line: 5 });
    }

    #[test]
    fn test_invalid_value() {
        let raw = "#datatype,string,long\n,result,_value\n,,abc\n";
        let err = parse_annotated_csv(raw).unwrap_err();
        assert_eq!(err.line(), 3);
        assert!(matches!(err, ParseError::InvalidValue { .. }));
    }

    #[test]
    fn test_empty_cells_use_default_then_null() {
        let raw = "\
#datatype,string,long,double
#default,_result,,
,result,table,_value
,,0,
";
        let result = parse_annotated_csv(raw).unwrap();
        let row = result.tables[0].row(0).unwrap();
        assert_eq!(row.get("result"), Some(&Value::String("_result".into())));
        assert!(row.get("_value").unwrap().is_null());
    }

    #[test]
    fn test_parse_is_idempotent() {
        let first = parse_annotated_csv(RESPONSE).unwrap();
        let second = parse_annotated_csv(RESPONSE).unwrap();
        assert_eq!(first, second);
    }
}
