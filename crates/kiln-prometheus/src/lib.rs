//! Prometheus backend for the reconcile loop metrics.
//!
//! [`PrometheusMetrics`] implements [`kiln_core::MetricsBackend`]; serving the text exposition is
//! left to the binary (see `kilnd`'s `/metrics` route).
//!
//! ## Metrics
//! - `kiln_reconcile_passes_total{procedure, outcome}`
//! - `kiln_nodes_requested_total{node_type}`
//! - `kiln_nodes_destroyed_total{provider, reason}`
//! - `kiln_unresolved_tasks_total`

mod backend;
pub use backend::PrometheusMetrics;

pub use prometheus::{Encoder, Registry, TextEncoder};
