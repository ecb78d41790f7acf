//! Query Transport
//!
//! The narrow interface the pipeline uses to reach the query backend, and an
//! HTTP implementation of it.
//!
//! # Wire Protocol
//!
//! ```text
//! POST {url}/api/v2/query?orgID={org}
//! Authorization: Token {token}
//!
//! {"query": "...", "extern": {...}, "dialect": {"annotations": ["group", "datatype", "default"]}}
//! ```
//!
//! A 2xx answer carries annotated CSV. A non-success status whose JSON body
//! holds a `message` is a backend-reported failure; any other status is a
//! transport failure.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::BackendConfig;
use crate::query::error::TransportError;
use crate::variables::Preamble;

/// Unparsed backend answer
#[derive(Debug, Clone, PartialEq)]
pub enum RawResult {
    /// Query ran; annotated CSV follows
    Success { csv: String },
    /// Backend reported a failure
    Error { message: String },
}

/// Sends composed queries to a backend
#[async_trait]
pub trait QueryTransport: Send + Sync {
    /// Run `query` for `org_id` with the given preamble
    async fn run_query(
        &self,
        org_id: &str,
        query: &str,
        preamble: &Preamble,
    ) -> Result<RawResult, TransportError>;
}

/// HTTP transport for the `/api/v2/query` endpoint
pub struct HttpTransport {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpTransport {
    /// Create a transport from backend configuration
    pub fn new(config: &BackendConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| TransportError::Config(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    fn query_url(&self, org_id: &str) -> String {
        format!(
            "{}/api/v2/query?orgID={}",
            self.base_url,
            urlencoding::encode(org_id)
        )
    }
}

#[async_trait]
impl QueryTransport for HttpTransport {
    async fn run_query(
        &self,
        org_id: &str,
        query: &str,
        preamble: &Preamble,
    ) -> Result<RawResult, TransportError> {
        let body = QueryRequest {
            query,
            extern_: preamble.to_extern(),
            dialect: Dialect::default(),
        };

        let mut request = self.client.post(self.query_url(org_id)).json(&body);
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Token {}", token));
        }

        let response = request.send().await.map_err(TransportError::from_reqwest)?;
        let status = response.status();
        let text = response.text().await.map_err(TransportError::from_reqwest)?;

        if status.is_success() {
            return Ok(RawResult::Success { csv: text });
        }

        let message = serde_json::from_str::<ErrorBody>(&text)
            .ok()
            .and_then(|b| b.message)
            .filter(|m| !m.is_empty());

        match message {
            Some(message) => {
                tracing::debug!(status = status.as_u16(), message = %message, "backend rejected query");
                Ok(RawResult::Error { message })
            }
            None => {
                let reason = status.canonical_reason().unwrap_or("unknown status");
                Err(TransportError::Status(status.as_u16(), reason.to_string()))
            }
        }
    }
}

// ============================================
// Request/Response DTOs
// ============================================

#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    query: &'a str,
    #[serde(rename = "extern")]
    extern_: serde_json::Value,
    dialect: Dialect,
}

#[derive(Debug, Serialize)]
struct Dialect {
    annotations: [&'static str; 3],
}

impl Default for Dialect {
    fn default() -> Self {
        Self {
            annotations: ["group", "datatype", "default"],
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}
