//! Scripted Loki stand-in for handler tests.

use flow_loki::{CallerError, CallerResponse, QueryCaller};
use std::sync::Mutex;

type Script = dyn Fn(&str) -> Result<CallerResponse, CallerError> + Send + Sync;

/// Answers each URL through a closure and records what was asked.
pub struct ScriptedCaller {
    script: Box<Script>,
    urls: Mutex<Vec<String>>,
}

impl ScriptedCaller {
    pub fn new(script: impl Fn(&str) -> Result<CallerResponse, CallerError> + Send + Sync + 'static) -> Self {
        Self {
            script: Box::new(script),
            urls: Mutex::new(Vec::new()),
        }
    }

    /// Every query gets one stream holding `entries`.
    pub fn answering(entries: Vec<(String, String)>) -> Self {
        Self::new(move |_| Ok(CallerResponse::new(200, streams_body(&entries))))
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl QueryCaller for ScriptedCaller {
    async fn get(&self, url: &str) -> Result<CallerResponse, CallerError> {
        self.urls.lock().unwrap().push(url.to_string());
        (self.script)(url)
    }
}

pub fn streams_body(entries: &[(String, String)]) -> String {
    serde_json::json!({
        "status": "success",
        "data": {
            "resultType": "streams",
            "result": [{
                "stream": {"app": "netobserv-flowcollector"},
                "values": entries,
            }]
        }
    })
    .to_string()
}

pub fn entries(prefix: &str, count: usize) -> Vec<(String, String)> {
    (0..count)
        .map(|i| (format!("{i}"), format!("{{\"{prefix}\":{i}}}")))
        .collect()
}
