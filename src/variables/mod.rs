//! Query Variables
//!
//! Resolves the parameters injected ahead of every query:
//!
//! - **Types**: variables, expressions and assignments
//! - **Store**: the user-defined variables of a session
//! - **Time**: per-session time ranges and their boundary assignments
//! - **Window**: implicit window-period detection and heuristic
//! - **Builder**: merges all sources into an ordered [`Preamble`]
//!
//! # Example
//!
//! ```rust
//! use fluxnote::variables::*;
//!
//! let vars = vec![Variable::new("bucket", Expression::String("prod".into()))];
//! let range = TimeRange::parse("-1h", "now").unwrap();
//! let windows = WindowVariableDetector::default()
//!     .detect("from(bucket: v.bucket) |> aggregateWindow(every: v.windowPeriod, fn: mean)");
//!
//! let preamble = AssignmentBuilder::new(WindowPolicy::default())
//!     .build(&vars, &range, &windows)
//!     .unwrap();
//!
//! assert_eq!(
//!     preamble.names(),
//!     vec!["bucket", "timeRangeStart", "timeRangeStop", "windowPeriod"]
//! );
//! ```

mod builder;
mod duration;
mod error;
mod store;
mod time;
mod types;
mod window;

pub use builder::{AssignmentBuilder, Preamble};
pub use duration::{DurationUnit, FluxDuration};
pub use error::{VariableError, VariableResult};
pub use store::{MemoryVariableStore, VariableStore};
pub use time::{
    SessionTimeContexts, TimeBound, TimeRange, TimeRangeContext, TIME_RANGE_START, TIME_RANGE_STOP,
};
pub use types::{
    is_identifier, Assignment, AssignmentSource, Expression, Variable, VariableKind,
    VARIABLE_RECORD,
};
pub use window::{WindowPolicy, WindowVariableDetector, WINDOW_PERIOD};
