//! Variable resolution errors

use thiserror::Error;

/// Errors that can occur while resolving variables into assignments
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VariableError {
    /// Explicit variables reference each other in a cycle
    #[error("Cyclic dependency between variables: {}", .names.join(", "))]
    CyclicDependency { names: Vec<String> },

    /// A duration literal could not be parsed
    #[error("Invalid duration: '{0}'")]
    InvalidDuration(String),

    /// A time range bound could not be parsed
    #[error("Invalid time bound: '{0}'")]
    InvalidTimeBound(String),

    /// A variable definition is malformed
    #[error("Invalid variable: {0}")]
    InvalidVariable(String),
}

/// Result type for variable operations
pub type VariableResult<T> = Result<T, VariableError>;
