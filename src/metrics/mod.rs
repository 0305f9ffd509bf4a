//! Periodic Metric Aggregation
//!
//! Turns continuously accumulated samples into time-stamped output records,
//! once per flush cycle:
//!
//! - **Counters** are summed, emitted and zeroed; idle counters emit a bounded
//!   tail of zeros before they are forgotten
//! - **Gauges** keep their last value and are re-emitted until overwritten
//! - **Sets** report how many distinct members were seen during the cycle
//! - **Timers** are summarised (percentiles, mean, std, sum, SLA violations)
//!   according to the first pattern rule that matches their name

mod aggregator;
mod config;
mod driver;
mod encoder;
mod error;
mod flush;
mod percentile;
mod rules;
mod timer;
mod types;

pub use aggregator::{Aggregator, FlushSummary};
pub use config::FlushConfig;
pub use driver::FlushLoop;
pub use encoder::RecordEncoder;
pub use error::ConfigError;
pub use flush::{flush_counters, flush_gauges, flush_sets, InactivityTracker};
pub use percentile::{tail_value, PercentileSpec, Tail};
pub use rules::{CompiledRule, MetricRule, RuleConfig, RuleMatcher, RuleSet, StatFunction};
pub use timer::{flush_timers, write_timer_lines, TimerStats};
pub use types::{MetricPoint, MetricType, MetricValue};
