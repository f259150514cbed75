//! # Query Caller
//!
//! The outbound capability the flow handlers depend on. [`HttpCaller`] is
//! built once at startup and shared by every request; tests swap in their
//! own [`QueryCaller`].

use crate::config::LokiConfig;
use thiserror::Error;

const TENANT_HEADER: &str = "X-Scope-OrgID";

/// Raw backend answer. Non-2xx statuses are not errors at this level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl CallerResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).trim().to_string()
    }
}

#[derive(Debug, Error)]
pub enum CallerError {
    #[error("could not build HTTP client: {0}")]
    Client(String),

    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("request to {url} timed out")]
    Timeout { url: String },
}

#[async_trait::async_trait]
pub trait QueryCaller: Send + Sync {
    /// GET `url` and hand back status and body.
    async fn get(&self, url: &str) -> Result<CallerResponse, CallerError>;
}

pub struct HttpCaller {
    client: reqwest::Client,
    tenant_id: Option<String>,
    token: Option<String>,
}

impl HttpCaller {
    pub fn new(config: &LokiConfig) -> Result<Self, CallerError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| CallerError::Client(e.to_string()))?;

        Ok(Self {
            client,
            tenant_id: config.tenant_id.clone(),
            token: config.token.clone(),
        })
    }
}

#[async_trait::async_trait]
impl QueryCaller for HttpCaller {
    async fn get(&self, url: &str) -> Result<CallerResponse, CallerError> {
        let mut request = self.client.get(url);
        if let Some(tenant) = &self.tenant_id {
            request = request.header(TENANT_HEADER, tenant);
        }
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let transport = |e: reqwest::Error| {
            if e.is_timeout() {
                CallerError::Timeout { url: url.to_string() }
            } else {
                CallerError::Transport {
                    url: url.to_string(),
                    message: e.to_string(),
                }
            }
        };

        let response = request.send().await.map_err(transport)?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(transport)?;
        tracing::trace!(url, status, bytes = body.len(), "Loki responded");

        Ok(CallerResponse::new(status, body.to_vec()))
    }
}
