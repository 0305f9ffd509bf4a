pub mod metrics;

pub use metrics::{Aggregator, FlushConfig, FlushLoop, MetricPoint, RuleMatcher};
