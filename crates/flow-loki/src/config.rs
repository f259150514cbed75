use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Connection settings for the Loki backend (`[loki]` in `flow-hub.toml`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LokiConfig {
    #[serde(default = "default_url")]
    pub url: String,
    /// Shared deadline for all queries issued by one request.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Sent as `X-Scope-OrgID` when set.
    #[serde(default)]
    pub tenant_id: Option<String>,
    /// Bearer token for authenticated Loki gateways.
    #[serde(default)]
    pub token: Option<String>,
    /// Flow fields indexed as Loki stream labels.
    #[serde(default = "default_labels")]
    pub labels: Vec<String>,
}

impl Default for LokiConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            timeout_secs: default_timeout_secs(),
            tenant_id: None,
            token: None,
            labels: default_labels(),
        }
    }
}

impl LokiConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Base URL, always ending in `/`.
    pub fn base_url(&self) -> String {
        if self.url.ends_with('/') {
            self.url.clone()
        } else {
            format!("{}/", self.url)
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn is_label(&self, key: &str) -> bool {
        self.labels.iter().any(|label| label == key)
    }
}

fn default_url() -> String {
    "http://localhost:3100/".into()
}
fn default_timeout_secs() -> u64 {
    10
}
fn default_labels() -> Vec<String> {
    [
        "SrcK8S_Namespace",
        "SrcK8S_OwnerName",
        "DstK8S_Namespace",
        "DstK8S_OwnerName",
        "FlowDirection",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
