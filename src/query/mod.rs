//! Query Pipeline
//!
//! Runs notebook queries with their variables resolved:
//!
//! - **Transport**: the backend seam and its HTTP implementation
//! - **Executor**: one cancellable execution per composed query
//! - **Context**: the session-scoped `query(text)` entry point
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use fluxnote::config::BackendConfig;
//! use fluxnote::query::{HttpTransport, QueryContext, QueryExecutor};
//! use fluxnote::variables::{MemoryVariableStore, SessionTimeContexts, TimeRange};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = HttpTransport::new(&BackendConfig::default())?;
//! let time = Arc::new(SessionTimeContexts::new());
//! time.set("notebook", TimeRange::last("1h")?).await;
//!
//! let ctx = QueryContext::new(
//!     "my-org",
//!     "notebook",
//!     Arc::new(MemoryVariableStore::new()),
//!     time,
//!     QueryExecutor::new(Arc::new(transport)),
//! );
//!
//! let result = ctx
//!     .query("from(bucket: \"telegraf\") |> range(start: v.timeRangeStart)")
//!     .await?;
//! println!("{} rows", result.parsed.map(|p| p.row_count()).unwrap_or(0));
//! # Ok(())
//! # }
//! ```

mod context;
mod error;
mod executor;
mod transport;

pub use context::{ParsedResult, QueryContext};
pub use error::{QueryError, QueryResult, TransportError};
pub use executor::{ComposedQuery, PendingQuery, QueryExecutor};
pub use transport::{HttpTransport, QueryTransport, RawResult};
