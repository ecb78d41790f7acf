//! Query error types
//!
//! Defines all error conditions that can occur while composing, executing and
//! parsing a query.

use thiserror::Error;

use crate::results::ParseError;
use crate::variables::VariableError;

/// Failures talking to the query backend
#[derive(Error, Debug)]
pub enum TransportError {
    /// Backend could not be reached
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// Non-success HTTP status without a backend error message
    #[error("HTTP {0}: {1}")]
    Status(u16, String),

    /// Request exceeded the configured timeout
    #[error("Request timeout")]
    Timeout,

    /// Any other HTTP client failure
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The transport could not be constructed
    #[error("Invalid transport configuration: {0}")]
    Config(String),
}

impl TransportError {
    /// Classify a reqwest error the way the rest of the crate reports it
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_connect() {
            TransportError::Unavailable(err.to_string())
        } else {
            TransportError::Request(err)
        }
    }
}

/// Errors surfaced by [`QueryContext::query`](crate::query::QueryContext::query)
#[derive(Error, Debug)]
pub enum QueryError {
    /// Variables could not be resolved; nothing was sent
    #[error(transparent)]
    Variables(#[from] VariableError),

    /// Backend unreachable or the connection failed
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Backend ran the query and reported a failure
    #[error("{message}")]
    Backend { message: String },

    /// Response could not be parsed; the raw text is kept for inspection
    #[error("Parse error: {error}")]
    Parse { error: ParseError, raw: String },

    /// The caller cancelled the query
    #[error("Query cancelled")]
    Cancelled,
}

impl QueryError {
    /// Raw response text, when the backend answered
    pub fn raw(&self) -> Option<&str> {
        match self {
            QueryError::Parse { raw, .. } => Some(raw),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, QueryError::Cancelled)
    }
}

/// Result type for query operations
pub type QueryResult<T> = Result<T, QueryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_message_verbatim() {
        let err = QueryError::Backend {
            message: "syntax error at line 3".to_string(),
        };
        assert_eq!(err.to_string(), "syntax error at line 3");
    }

    #[test]
    fn test_status_display() {
        let err = QueryError::from(TransportError::Status(503, "Service Unavailable".into()));
        assert_eq!(
            err.to_string(),
            "Transport error: HTTP 503: Service Unavailable"
        );
    }

    #[test]
    fn test_cycle_converts() {
        let err: QueryError = VariableError::CyclicDependency {
            names: vec!["a".into()],
        }
        .into();
        assert!(matches!(err, QueryError::Variables(_)));
        assert!(err.raw().is_none());
    }

    #[test]
    fn test_parse_keeps_raw() {
        let err = QueryError::Parse {
            error: ParseError::MissingAnnotation { line: 1 },
            raw: ",a\n".to_string(),
        };
        assert_eq!(err.raw(), Some(",a\n"));
        assert_eq!(err.to_string(), "Parse error: line 1: missing #datatype annotation");
    }
}
