//! Observability: runtime telemetry (metrics) and sink abstractions.
//!
//! Structured logs go through `tracing`; hosts install the subscriber.
//! Counters here are thread-local and ephemeral.

pub(crate) mod metrics;
pub(crate) mod sink;

// re-exports
pub use metrics::{EntityCounters, EntitySummary, EventOps, EventReport, EventState};
pub use sink::{MetricsEvent, MetricsSink, metrics_report, metrics_reset_all, with_metrics_sink};
