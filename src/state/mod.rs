// Per-tool memory and relay traffic counters

mod metrics;
mod tracker;

pub use metrics::{MetricsSnapshot, RelayMetrics};
pub use tracker::LastActorTracker;
