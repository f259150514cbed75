//! # Flow Retrieval
//!
//! Turns extracted [`FlowParams`] into one or more Loki queries and a merged
//! response. More than one filter group means "match any": one query per
//! group, run concurrently. Otherwise a single query carries the lone
//! group, if there is one.

use flow_core::{AggregatedQueryResponse, FlowError, FlowParams, StreamMerger};
use flow_loki::{fetch_parallel, fetch_single, FlowQueryBuilder, LokiConfig, QueryCaller, FETCH_ERROR_PREFIX};
use std::sync::Arc;
use tokio::sync::Mutex;

const BUILD_ERROR_PREFIX: &str = "Can't build query: ";

pub async fn get_flows(
    cfg: &LokiConfig,
    caller: Arc<dyn QueryCaller>,
    params: &FlowParams,
) -> Result<AggregatedQueryResponse, FlowError> {
    if params.filter_groups.len() > 1 {
        // All queries are built before any is sent
        let queries = params
            .filter_groups
            .iter()
            .map(|group| {
                let mut qb = FlowQueryBuilder::new(cfg, params);
                qb.filters(group).map_err(|e| e.context(BUILD_ERROR_PREFIX))?;
                Ok(qb.build())
            })
            .collect::<Result<Vec<_>, FlowError>>()?;

        tracing::debug!(queries = queries.len(), "Fanning out flow queries");
        let merger = Arc::new(Mutex::new(StreamMerger::new(params.limit_count)));
        fetch_parallel(caller, queries, Arc::clone(&merger), cfg.timeout())
            .await
            .map_err(|e| e.context(FETCH_ERROR_PREFIX))?;

        let response = merger.lock().await.get();
        Ok(response)
    } else {
        let mut qb = FlowQueryBuilder::new(cfg, params);
        if let Some(group) = params.filter_groups.first() {
            qb.filters(group)?;
        }

        let mut merger = StreamMerger::new(params.limit_count);
        fetch_single(caller.as_ref(), &qb.build(), &mut merger, cfg.timeout())
            .await
            .map_err(|e| e.context(FETCH_ERROR_PREFIX))?;
        Ok(merger.get())
    }
}
