//! # fluxnote
//!
//! Notebook query pipeline - resolves the variables a Flux query depends on,
//! runs it against a query backend and parses the annotated CSV it returns.
//!
//! ## Features
//!
//! - **Variables**: user-defined, time-range and computed window-period
//!   variables merged into one ordered preamble
//! - **Execution**: cancellable queries over a pluggable transport
//! - **Results**: annotated CSV decoded into typed tables
//!
//! ## Modules
//!
//! - [`variables`]: variable model, stores and preamble building
//! - [`query`]: transport, executor and the session [`QueryContext`]
//! - [`results`]: annotated CSV parser and table types
//! - [`config`]: TOML configuration with environment overrides
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use fluxnote::config::Config;
//! use fluxnote::query::{HttpTransport, QueryContext, QueryExecutor};
//! use fluxnote::variables::{MemoryVariableStore, SessionTimeContexts, TimeRange};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load_default();
//!
//!     let variables = Arc::new(MemoryVariableStore::with_variables(config.variables()?));
//!     let time = Arc::new(SessionTimeContexts::new());
//!     time.set("notebook", TimeRange::last("24h")?).await;
//!
//!     let transport = Arc::new(HttpTransport::new(&config.backend)?);
//!     let ctx = QueryContext::new(
//!         config.backend.org_id.clone(),
//!         "notebook",
//!         variables,
//!         time,
//!         QueryExecutor::new(transport),
//!     )
//!     .with_window(config.window.detector(), config.window.policy());
//!
//!     let result = ctx
//!         .query("from(bucket: v.bucket) |> range(start: v.timeRangeStart) |> aggregateWindow(every: v.windowPeriod, fn: mean)")
//!         .await?;
//!
//!     if let Some(parsed) = result.parsed {
//!         for table in &parsed.tables {
//!             println!("{}", table);
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod query;
pub mod results;
pub mod variables;

pub use config::Config;
pub use query::{ParsedResult, QueryContext, QueryError};
pub use results::FluxResult;
