//! Query Results
//!
//! Turns the backend's annotated CSV into typed tables:
//!
//! - **Parser**: annotated CSV → [`FluxResult`]
//! - **Table**: typed columns with row-major and column-major access
//!
//! # Example
//!
//! ```rust
//! use fluxnote::results::{parse_annotated_csv, Value};
//!
//! let raw = "#datatype,string,long,double\n,result,table,_value\n,,0,4.5\n";
//! let result = parse_annotated_csv(raw).unwrap();
//!
//! assert_eq!(result.row_count(), 1);
//! assert_eq!(result.tables[0].row(0).unwrap().get("_value"), Some(&Value::Double(4.5)));
//! ```

mod error;
mod parser;
mod table;

pub use error::{ParseError, ParseResult};
pub use parser::parse_annotated_csv;
pub use table::{Column, DataType, FluxResult, Row, Table, Value};
