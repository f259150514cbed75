//! # flow-loki: the "Reach" of FLOWSCOPE
//!
//! Everything that talks to Loki: turning a filter group into a LogQL
//! `query_range` URL, the injectable [`QueryCaller`] capability and the
//! single / parallel fetch paths that feed a [`flow_core::StreamMerger`].

pub mod client;
pub mod config;
pub mod fetch;
pub mod query;

pub use client::{CallerError, CallerResponse, HttpCaller, QueryCaller};
pub use config::LokiConfig;
pub use fetch::{fetch_parallel, fetch_single, FETCH_ERROR_PREFIX};
pub use query::FlowQueryBuilder;
