//! Query Executor
//!
//! Issues a composed query through a [`QueryTransport`] and hands back a
//! cancellable [`PendingQuery`].
//!
//! # Execution Pipeline
//!
//! ```text
//! ComposedQuery → transport.run_query → RawResult → csv | Backend error
//!                        ↑
//!                 CancellationToken (drops the in-flight request)
//! ```
//!
//! Exactly one transport call is made per execution; retries are left to the
//! caller or the transport.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::query::error::{QueryError, QueryResult, TransportError};
use crate::query::transport::{QueryTransport, RawResult};
use crate::variables::Preamble;

/// Preamble plus the user's query text
#[derive(Debug, Clone, PartialEq)]
pub struct ComposedQuery {
    pub preamble: Preamble,
    pub body: String,
}

impl ComposedQuery {
    pub fn new(preamble: Preamble, body: impl Into<String>) -> Self {
        Self {
            preamble,
            body: body.into(),
        }
    }

    /// Full query text with the preamble inlined as an `option v` statement
    pub fn to_flux(&self) -> String {
        format!("{}\n\n{}", self.preamble.to_flux(), self.body)
    }
}

type TransportFuture = Pin<Box<dyn Future<Output = Result<RawResult, TransportError>> + Send>>;

/// An in-flight query execution
///
/// Dropping or cancelling it abandons the request.
pub struct PendingQuery {
    id: Uuid,
    cancel: CancellationToken,
    future: TransportFuture,
}

impl PendingQuery {
    /// Identifier recorded on this execution's tracing span
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Cancel the execution; calling it more than once has no further effect
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that cancels this execution from elsewhere
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wait for the backend; yields the raw annotated CSV on success
    pub async fn wait(self) -> QueryResult<String> {
        let PendingQuery { id, cancel, future } = self;

        if cancel.is_cancelled() {
            return Err(QueryError::Cancelled);
        }

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(query_id = %id, "query cancelled");
                return Err(QueryError::Cancelled);
            }
            outcome = future => outcome,
        };

        match outcome? {
            RawResult::Success { csv } => Ok(csv),
            RawResult::Error { message } => Err(QueryError::Backend { message }),
        }
    }
}

impl std::fmt::Debug for PendingQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingQuery")
            .field("id", &self.id)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

/// Runs composed queries against a transport
#[derive(Clone)]
pub struct QueryExecutor {
    transport: Arc<dyn QueryTransport>,
}

impl QueryExecutor {
    /// Create a new executor
    pub fn new(transport: Arc<dyn QueryTransport>) -> Self {
        Self { transport }
    }

    /// Start executing `query`; the returned handle drives it to completion
    pub fn execute(
        &self,
        org_id: &str,
        query: ComposedQuery,
        cancel: CancellationToken,
    ) -> PendingQuery {
        let id = Uuid::new_v4();
        let span = tracing::info_span!("flux_query", query_id = %id, org_id = %org_id);
        let transport = Arc::clone(&self.transport);
        let org_id = org_id.to_string();

        let future = async move {
            tracing::debug!(
                preamble = %query.preamble.to_flux(),
                "sending query"
            );
            let result = transport
                .run_query(&org_id, &query.body, &query.preamble)
                .await;
            match &result {
                Ok(RawResult::Success { csv }) => {
                    tracing::info!(bytes = csv.len(), "query succeeded")
                }
                Ok(RawResult::Error { message }) => {
                    tracing::warn!(message = %message, "backend reported error")
                }
                Err(e) => tracing::error!(error = %e, "transport failed"),
            }
            result
        }
        .instrument(span);

        PendingQuery {
            id,
            cancel,
            future: Box::pin(future),
        }
    }
}

impl std::fmt::Debug for QueryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryExecutor").finish_non_exhaustive()
    }
}
