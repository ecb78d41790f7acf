//! Query Context
//!
//! Session-scoped orchestrator behind the single `query(text)` entry point.
//!
//! Per call:
//!
//! ```text
//! session range? ──no──→ ParsedResult::empty (transport untouched)
//!      │yes
//! detect windows → build preamble → execute → parse → ParsedResult
//! ```
//!
//! Nothing is cached between calls; variables and the time range are read
//! fresh every time.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::query::error::{QueryError, QueryResult};
use crate::query::executor::{ComposedQuery, QueryExecutor};
use crate::results::{parse_annotated_csv, FluxResult};
use crate::variables::{
    AssignmentBuilder, TimeRangeContext, VariableStore, WindowPolicy, WindowVariableDetector,
};

/// Outcome of one `query()` call, handed to presentation code
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedResult {
    /// Query text as written by the user
    pub source: String,
    /// Raw annotated CSV as returned by the backend
    pub raw: String,
    /// Structured tables; absent when the query failed
    pub parsed: Option<FluxResult>,
    /// User-displayable failure message
    pub error: Option<String>,
}

impl ParsedResult {
    /// No-op result for a session that is not ready yet
    pub fn empty(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            raw: String::new(),
            parsed: Some(FluxResult::empty()),
            error: None,
        }
    }

    /// Render a failed call for display, keeping any raw response text
    pub fn failed(source: impl Into<String>, error: &QueryError) -> Self {
        Self {
            source: source.into(),
            raw: error.raw().unwrap_or_default().to_string(),
            parsed: None,
            error: Some(error.to_string()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Query capability scoped to one session
pub struct QueryContext {
    org_id: String,
    session_id: String,
    variables: Arc<dyn VariableStore>,
    time: Arc<dyn TimeRangeContext>,
    executor: QueryExecutor,
    detector: WindowVariableDetector,
    policy: WindowPolicy,
    now: Option<DateTime<Utc>>,
}

impl QueryContext {
    /// Create a context for `session_id` in `org_id`
    pub fn new(
        org_id: impl Into<String>,
        session_id: impl Into<String>,
        variables: Arc<dyn VariableStore>,
        time: Arc<dyn TimeRangeContext>,
        executor: QueryExecutor,
    ) -> Self {
        Self {
            org_id: org_id.into(),
            session_id: session_id.into(),
            variables,
            time,
            executor,
            detector: WindowVariableDetector::default(),
            policy: WindowPolicy::default(),
            now: None,
        }
    }

    /// Use a specific window detector and period policy
    pub fn with_window(mut self, detector: WindowVariableDetector, policy: WindowPolicy) -> Self {
        self.detector = detector;
        self.policy = policy;
        self
    }

    /// Resolve relative ranges against a fixed instant instead of the clock
    pub fn with_clock(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn org_id(&self) -> &str {
        &self.org_id
    }

    /// Compose the query that `query(text)` would send
    ///
    /// Returns `None` while the session's time range is not initialized.
    pub async fn compose(&self, text: &str) -> QueryResult<Option<ComposedQuery>> {
        let Some(range) = self.time.range(&self.session_id).await else {
            return Ok(None);
        };

        let variables = self.variables.variables().await;
        let windows = self.detector.detect(text);

        let mut builder = AssignmentBuilder::new(self.policy.clone());
        if let Some(now) = self.now {
            builder = builder.at(now);
        }
        let preamble = builder.build_with(
            &variables,
            |v| self.variables.as_assignment(v),
            &range,
            &windows,
        )?;

        Ok(Some(ComposedQuery::new(preamble, text)))
    }

    /// Run `text` in this session
    pub async fn query(&self, text: &str) -> QueryResult<ParsedResult> {
        self.query_with_cancel(text, CancellationToken::new()).await
    }

    /// Run `text`, abandoning it when `cancel` fires
    ///
    /// A cancelled call never reaches the parse step.
    pub async fn query_with_cancel(
        &self,
        text: &str,
        cancel: CancellationToken,
    ) -> QueryResult<ParsedResult> {
        let Some(composed) = self.compose(text).await? else {
            tracing::debug!(session = %self.session_id, "time range not initialized, skipping query");
            return Ok(ParsedResult::empty(text));
        };

        let pending = self.executor.execute(&self.org_id, composed, cancel.clone());
        let raw = pending.wait().await?;

        if cancel.is_cancelled() {
            return Err(QueryError::Cancelled);
        }

        let parsed = match parse_annotated_csv(&raw) {
            Ok(parsed) => parsed,
            Err(error) => {
                tracing::warn!(error = %error, "failed to parse query response");
                return Err(QueryError::Parse { error, raw });
            }
        };

        Ok(ParsedResult {
            source: text.to_string(),
            raw,
            parsed: Some(parsed),
            error: None,
        })
    }
}

impl std::fmt::Debug for QueryContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryContext")
            .field("org_id", &self.org_id)
            .field("session_id", &self.session_id)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::error::TransportError;
    use crate::query::transport::{QueryTransport, RawResult};
    use crate::results::ParseError;
    use crate::variables::{
        Expression, MemoryVariableStore, Preamble, SessionTimeContexts, TimeRange, Variable,
        VariableError,
    };
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::Mutex;
    use std::time::Duration;

    const CSV: &str = "\
#group,false,false,true,false
#datatype,string,long,string,double
#default,_result,,,
,result,table,host,_value
,,0,a,1.5
,,1,b,2.5
";

    /// Transport that records calls and replies with a scripted result
    struct Scripted {
        reply: RawResult,
        delay: Duration,
        calls: Mutex<Vec<(String, String, Preamble)>>,
    }

    impl Scripted {
        fn new(reply: RawResult) -> Arc<Self> {
            Arc::new(Self {
                reply,
                delay: Duration::ZERO,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<(String, String, Preamble)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl QueryTransport for Scripted {
        async fn run_query(
            &self,
            org_id: &str,
            query: &str,
            preamble: &Preamble,
        ) -> Result<RawResult, TransportError> {
            self.calls
                .lock()
                .unwrap()
                .push((org_id.to_string(), query.to_string(), preamble.clone()));
            tokio::time::sleep(self.delay).await;
            Ok(self.reply.clone())
        }
    }

    async fn context(transport: Arc<Scripted>, vars: Vec<Variable>, ready: bool) -> QueryContext {
        let time = Arc::new(SessionTimeContexts::new());
        if ready {
            time.set("nb-1", TimeRange::parse("-1h", "now").unwrap()).await;
        }
        QueryContext::new(
            "org-1",
            "nb-1",
            Arc::new(MemoryVariableStore::with_variables(vars)),
            time,
            QueryExecutor::new(transport),
        )
        .with_clock(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap())
    }

    #[tokio::test]
    async fn test_query_composes_and_parses() {
        let transport = Scripted::new(RawResult::Success { csv: CSV.into() });
        let ctx = context(
            transport.clone(),
            vec![Variable::new("bucket", Expression::String("prod".into()))],
            true,
        )
        .await;

        let text = "from(bucket: v.bucket) |> aggregateWindow(every: v.windowPeriod, fn: mean)";
        let result = ctx.query(text).await.unwrap();

        assert_eq!(result.source, text);
        assert_eq!(result.raw, CSV);
        assert!(result.error.is_none());
        let parsed = result.parsed.unwrap();
        assert_eq!(parsed.tables.len(), 2);
        assert_eq!(parsed.row_count(), 2);

        let calls = transport.calls();
        assert_eq!(calls.len(), 1);
        let (org, body, preamble) = &calls[0];
        assert_eq!(org, "org-1");
        assert_eq!(body, text);
        assert_eq!(
            preamble.names(),
            vec!["bucket", "timeRangeStart", "timeRangeStop", "windowPeriod"]
        );
    }

    #[tokio::test]
    async fn test_uninitialized_session_is_noop() {
        let transport = Scripted::new(RawResult::Success { csv: CSV.into() });
        let ctx = context(transport.clone(), Vec::new(), false).await;

        let result = ctx.query("buckets()").await.unwrap();
        assert_eq!(result, ParsedResult::empty("buckets()"));
        assert!(transport.calls().is_empty());
        assert!(ctx.compose("buckets()").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_backend_error_rejects() {
        let transport = Scripted::new(RawResult::Error {
            message: "syntax error at line 3".into(),
        });
        let ctx = context(transport, Vec::new(), true).await;

        let err = ctx.query("from(").await.unwrap_err();
        match &err {
            QueryError::Backend { message } => assert_eq!(message, "syntax error at line 3"),
            other => panic!("unexpected error {:?}", other),
        }

        let shown = ParsedResult::failed("from(", &err);
        assert!(shown.parsed.is_none());
        assert_eq!(shown.error.as_deref(), Some("syntax error at line 3"));
    }

    #[tokio::test]
    async fn test_cycle_fails_before_network() {
        let transport = Scripted::new(RawResult::Success { csv: CSV.into() });
        let ctx = context(
            transport.clone(),
            vec![
                Variable::new("a", Expression::Reference("b".into())),
                Variable::new("b", Expression::Reference("a".into())),
            ],
            true,
        )
        .await;

        let err = ctx.query("x").await.unwrap_err();
        assert!(matches!(
            err,
            QueryError::Variables(VariableError::CyclicDependency { .. })
        ));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_parse_error_keeps_raw() {
        let bad = "#datatype,string,long,double\n,result,table,_value\n,,0\n";
        let transport = Scripted::new(RawResult::Success { csv: bad.into() });
        let ctx = context(transport, Vec::new(), true).await;

        let err = ctx.query("x").await.unwrap_err();
        match &err {
            QueryError::Parse { error, raw } => {
                assert_eq!(error.line(), 3);
                assert!(matches!(error, ParseError::ColumnCount { .. }));
                assert_eq!(raw, bad);
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(ParsedResult::failed("x", &err).raw, bad);
    }

    #[tokio::test]
    async fn test_recomputes_every_call() {
        let transport = Scripted::new(RawResult::Success { csv: String::new() });
        let store = Arc::new(MemoryVariableStore::new());
        let time = Arc::new(SessionTimeContexts::new());
        time.set("nb-1", TimeRange::last("1h").unwrap()).await;
        let ctx = QueryContext::new(
            "org-1",
            "nb-1",
            store.clone(),
            time.clone(),
            QueryExecutor::new(transport.clone()),
        );

        ctx.query("x").await.unwrap();
        store
            .set(Variable::new("bucket", Expression::String("prod".into())))
            .await;
        time.set("nb-1", TimeRange::last("7d").unwrap()).await;
        ctx.query("x").await.unwrap();

        let calls = transport.calls();
        assert_eq!(calls[0].2.len(), 2);
        assert_eq!(calls[1].2.len(), 3);
        assert_eq!(
            calls[1].2.get("timeRangeStart").unwrap().value.to_string(),
            "-7d"
        );
    }

    #[tokio::test]
    async fn test_empty_response_is_empty_result() {
        let transport = Scripted::new(RawResult::Success { csv: String::new() });
        let ctx = context(transport, Vec::new(), true).await;
        let result = ctx.query("x").await.unwrap();
        assert!(result.parsed.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_query_skips_parse() {
        let transport = Arc::new(Scripted {
            reply: RawResult::Success { csv: CSV.into() },
            delay: Duration::from_secs(30),
            calls: Mutex::new(Vec::new()),
        });
        let ctx = Arc::new(context(transport, Vec::new(), true).await);
        let cancel = CancellationToken::new();

        let handle = {
            let ctx = Arc::clone(&ctx);
            let cancel = cancel.clone();
            tokio::spawn(async move { ctx.query_with_cancel("x", cancel).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
        cancel.cancel();

        let err = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap_err();
        assert!(err.is_cancelled());
    }
}
