//! # flow-core: the "Model" of FLOWSCOPE
//!
//! Request-scoped building blocks for querying network flows out of Loki.
//! Nothing in here touches the network.
//!
//! - [`filters`] decodes the grouped `filters` expression into OR-of-AND groups.
//! - [`params`] extracts time range, limit and reporter from query parameters.
//! - [`merger`] folds one or more Loki results into a capped [`AggregatedQueryResponse`].

pub mod error;
pub mod filters;
pub mod merger;
pub mod model;
pub mod params;

pub use error::FlowError;
pub use filters::{encode_filters, parse_filters, render_filters, Filter, FilterGroup};
pub use merger::StreamMerger;
pub use model::{AggregatedQueryResponse, AggregatedStats, Entry, QueryResponse, QueryResponseData, Stream};
pub use params::FlowParams;
