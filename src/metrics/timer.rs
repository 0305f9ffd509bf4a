//! Timer statistics
//!
//! Each timer bucket is summarised once per cycle according to the rule it
//! matched: one line per configured percentile, always a `.mean` line, then
//! one line per requested statistic function. Buckets without a rule are
//! dropped with a debug log.

use ahash::{AHashMap, AHashSet};
use bytes::BytesMut;
use tracing::debug;

use super::config::FlushConfig;
use super::encoder::RecordEncoder;
use super::percentile::{tail_value, PercentileSpec};
use super::rules::{CompiledRule, RuleMatcher, StatFunction};

/// Summary statistics over one bucket's samples
#[derive(Debug, Clone, PartialEq)]
pub struct TimerStats {
    sorted: Vec<f64>,
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub sum: f64,
    pub mean: f64,
    /// Population standard deviation
    pub std_dev: f64,
}

impl TimerStats {
    /// Compute statistics over `samples`; `None` when there are none
    pub fn compute(mut samples: Vec<f64>) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        samples.sort_by(f64::total_cmp);

        let count = samples.len();
        let sum: f64 = samples.iter().sum();
        let mean = sum / count as f64;
        let variance = samples.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count as f64;

        Some(TimerStats {
            count,
            min: samples[0],
            max: samples[count - 1],
            sum,
            mean,
            std_dev: variance.sqrt(),
            sorted: samples,
        })
    }

    /// Samples strictly above `threshold`
    pub fn sla_violations(&self, threshold: f64) -> u64 {
        self.sorted.iter().filter(|&&v| v > threshold).count() as u64
    }

    /// Tail value for a percentile spec
    pub fn percentile(&self, spec: &PercentileSpec) -> f64 {
        // sorted is never empty once constructed
        tail_value(&self.sorted, spec.value).unwrap_or(self.max)
    }

    pub fn sorted(&self) -> &[f64] {
        &self.sorted
    }
}

/// Emit the lines a rule asks for. Returns the number of lines written.
pub fn write_timer_lines(
    out: &mut BytesMut,
    name: &str,
    postfix: &str,
    stats: &TimerStats,
    rule: &CompiledRule,
    now: i64,
) -> u64 {
    let mut lines = 0;

    for spec in &rule.percentiles {
        let metric = format!("{}.{}{}", name, spec.suffix(), postfix);
        RecordEncoder::write(out, &metric, stats.percentile(spec), now);
        lines += 1;
    }

    RecordEncoder::write(out, &format!("{}.mean{}", name, postfix), stats.mean, now);
    lines += 1;

    for func in &rule.functions {
        let metric = format!("{}.{}{}", name, func.name(), postfix);
        match func {
            StatFunction::Std => RecordEncoder::write(out, &metric, stats.std_dev, now),
            StatFunction::Sum => RecordEncoder::write(out, &metric, stats.sum, now),
            StatFunction::SlaViolations => RecordEncoder::write_count(
                out,
                &metric,
                stats.sla_violations(rule.threshold()),
                now,
            ),
            StatFunction::Upper => RecordEncoder::write(out, &metric, stats.max, now),
            StatFunction::Lower => RecordEncoder::write(out, &metric, stats.min, now),
            StatFunction::Count => {
                RecordEncoder::write_count(out, &metric, stats.count as u64, now)
            }
        }
        lines += 1;
    }

    lines
}

/// Summarise every detached timer bucket. Returns the number of lines written.
pub fn flush_timers(
    timers: AHashMap<String, Vec<f64>>,
    matcher: &RuleMatcher,
    config: &FlushConfig,
    now: i64,
    out: &mut BytesMut,
) -> u64 {
    let mut lines = 0;
    let mut flushed = AHashSet::with_capacity(timers.len());

    for (bucket, samples) in timers {
        let name = config.strip_postfix(&bucket);
        flushed.insert(name.to_string());

        let Some(rule) = matcher.assign_rule(name) else {
            debug!(bucket = %name, "no rule configured for timer bucket; dropping samples");
            continue;
        };

        let Some(stats) = TimerStats::compute(samples) else {
            continue;
        };

        lines += write_timer_lines(out, name, &config.postfix, &stats, &rule, now);
    }

    // buckets idle for a whole cycle are classified again when they return
    matcher.retain_records(|name| flushed.contains(name));

    lines
}
