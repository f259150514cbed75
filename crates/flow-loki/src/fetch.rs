//! # Flow Fetching
//!
//! Runs built queries against Loki and feeds the decoded results into a
//! [`StreamMerger`]. The parallel path spawns one task per query, shares
//! the merger behind a mutex and stops early on the first failure or once
//! the merger's cap is reached. Every path runs under a single deadline.

use crate::client::{CallerError, QueryCaller};
use flow_core::error::{STATUS_GATEWAY_TIMEOUT, STATUS_INTERNAL_ERROR, STATUS_SERVICE_UNAVAILABLE};
use flow_core::{FlowError, QueryResponse, QueryResponseData, StreamMerger};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinSet;

pub const FETCH_ERROR_PREFIX: &str = "Error while fetching flows from Loki: ";

const STATUS_OK: u16 = 200;
const STATUS_NO_CONTENT: u16 = 204;

/// Execute one query and decode its body.
pub async fn execute_query(caller: &dyn QueryCaller, url: &str) -> Result<QueryResponseData, FlowError> {
    tracing::debug!(url, "Executing Loki query");

    let response = caller.get(url).await.map_err(|e| match e {
        CallerError::Timeout { .. } => FlowError::BackendFetch {
            status: STATUS_GATEWAY_TIMEOUT,
            message: e.to_string(),
        },
        _ => FlowError::BackendFetch {
            status: STATUS_SERVICE_UNAVAILABLE,
            message: e.to_string(),
        },
    })?;

    if response.status != STATUS_OK {
        let status = match response.status {
            STATUS_NO_CONTENT => STATUS_SERVICE_UNAVAILABLE,
            code => code,
        };
        return Err(FlowError::BackendFetch {
            status,
            message: format!("[{}] {}", response.status, response.text()),
        });
    }

    let decoded: QueryResponse =
        serde_json::from_slice(&response.body).map_err(|e| FlowError::BackendFetch {
            status: STATUS_INTERNAL_ERROR,
            message: format!("could not decode Loki response: {e}"),
        })?;
    Ok(decoded.data)
}

/// One query, merged directly.
pub async fn fetch_single(
    caller: &dyn QueryCaller,
    url: &str,
    merger: &mut StreamMerger,
    deadline: Duration,
) -> Result<(), FlowError> {
    let data = tokio::time::timeout(deadline, execute_query(caller, url))
        .await
        .map_err(|_| deadline_exceeded(deadline))??;
    merger.add(data);
    Ok(())
}

/// N queries in parallel, each result merged as it completes.
///
/// The first error wins and aborts the remaining queries; so does the
/// merger reaching its cap. No partial result is meaningful after an error:
/// callers drop the merger.
pub async fn fetch_parallel(
    caller: Arc<dyn QueryCaller>,
    queries: Vec<String>,
    merger: Arc<Mutex<StreamMerger>>,
    deadline: Duration,
) -> Result<(), FlowError> {
    let mut tasks = JoinSet::new();
    for query in queries {
        let caller = Arc::clone(&caller);
        let merger = Arc::clone(&merger);
        tasks.spawn(async move {
            let data = execute_query(caller.as_ref(), &query).await?;
            let reached = merger.lock().await.add(data);
            Ok::<bool, FlowError>(reached)
        });
    }

    let outcome = tokio::time::timeout(deadline, join_all(&mut tasks))
        .await
        .unwrap_or_else(|_| Err(deadline_exceeded(deadline)));
    tasks.abort_all();
    outcome
}

async fn join_all(tasks: &mut JoinSet<Result<bool, FlowError>>) -> Result<(), FlowError> {
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(true)) => {
                if !tasks.is_empty() {
                    tracing::debug!(remaining = tasks.len(), "Limit reached, cancelling remaining queries");
                }
                return Ok(());
            }
            Ok(Ok(false)) => {}
            Ok(Err(e)) => {
                tracing::warn!(remaining = tasks.len(), "Loki query failed: {}", e);
                return Err(e);
            }
            Err(e) if e.is_cancelled() => {}
            Err(e) => {
                return Err(FlowError::BackendFetch {
                    status: STATUS_INTERNAL_ERROR,
                    message: format!("query task failed: {e}"),
                })
            }
        }
    }
    Ok(())
}

fn deadline_exceeded(deadline: Duration) -> FlowError {
    FlowError::BackendFetch {
        status: STATUS_GATEWAY_TIMEOUT,
        message: format!("Loki did not answer within {}s", deadline.as_secs()),
    }
}
