//! Shared metric stores
//!
//! The aggregator owns the four per-kind stores and the counter inactivity
//! tracker. Ingestion takes a store lock just long enough to update one
//! bucket. A flush swaps each store for an empty one and processes the
//! detached copy without holding the lock, so inserts are never blocked for
//! the duration of a pass.

use std::sync::Arc;

use ahash::AHashMap;
use bytes::BytesMut;
use parking_lot::Mutex;
use tracing::debug;

use super::config::FlushConfig;
use super::flush::{self, InactivityTracker};
use super::rules::RuleMatcher;
use super::timer;
use super::types::{MetricPoint, MetricType, MetricValue};

/// Lines written per metric kind during one flush cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushSummary {
    pub counters: u64,
    pub gauges: u64,
    pub sets: u64,
    pub timers: u64,
}

impl FlushSummary {
    pub fn total(&self) -> u64 {
        self.counters + self.gauges + self.sets + self.timers
    }
}

/// Thread-safe metric stores with an exclusive flush API
pub struct Aggregator {
    config: FlushConfig,
    rules: Arc<RuleMatcher>,
    counters: Mutex<AHashMap<String, f64>>,
    gauges: Mutex<AHashMap<String, f64>>,
    sets: Mutex<AHashMap<String, Vec<String>>>,
    timers: Mutex<AHashMap<String, Vec<f64>>>,
    inactivity: Mutex<InactivityTracker>,
}

impl Aggregator {
    pub fn new(config: FlushConfig, rules: Arc<RuleMatcher>) -> Self {
        Aggregator {
            config,
            rules,
            counters: Mutex::new(AHashMap::new()),
            gauges: Mutex::new(AHashMap::new()),
            sets: Mutex::new(AHashMap::new()),
            timers: Mutex::new(AHashMap::new()),
            inactivity: Mutex::new(InactivityTracker::new()),
        }
    }

    pub fn config(&self) -> &FlushConfig {
        &self.config
    }

    pub fn rules(&self) -> &Arc<RuleMatcher> {
        &self.rules
    }

    // ------------------------------------------------------------------
    // Ingestion
    // ------------------------------------------------------------------

    /// Route a sample to the store for its kind
    pub fn submit(&self, point: MetricPoint) {
        if let MetricValue::Number(n) = point.value {
            if !n.is_finite() && point.metric_type != MetricType::Set {
                debug!(bucket = %point.name, value = %n, "dropping non-finite sample");
                return;
            }
        }
        match (point.metric_type, point.value) {
            (MetricType::Set, value) => self.add_set_member(&point.name, value.as_string()),
            (MetricType::Counter, value) => self.add_counter(&point.name, value.as_f64()),
            (MetricType::Gauge, value) => self.set_gauge(&point.name, value.as_f64()),
            (MetricType::Timer, MetricValue::Number(n)) => self.add_timing(&point.name, n),
            (MetricType::Timer, MetricValue::Member(m)) => {
                debug!(bucket = %point.name, member = %m, "ignoring non-numeric timer sample");
            }
        }
    }

    pub fn add_counter(&self, bucket: &str, increment: f64) {
        let mut counters = self.counters.lock();
        match counters.get_mut(bucket) {
            Some(value) => *value += increment,
            None => {
                counters.insert(bucket.to_string(), increment);
            }
        }
    }

    pub fn set_gauge(&self, bucket: &str, value: f64) {
        self.gauges.lock().insert(bucket.to_string(), value);
    }

    pub fn add_set_member(&self, bucket: &str, member: impl Into<String>) {
        let member = member.into();
        let mut sets = self.sets.lock();
        match sets.get_mut(bucket) {
            Some(members) => members.push(member),
            None => {
                sets.insert(bucket.to_string(), vec![member]);
            }
        }
    }

    /// Append a timer sample. The first sample of a bucket classifies its
    /// logical name against the active rules.
    pub fn add_timing(&self, bucket: &str, duration: f64) {
        let first_sample = {
            let mut timers = self.timers.lock();
            match timers.get_mut(bucket) {
                Some(samples) => {
                    samples.push(duration);
                    false
                }
                None => {
                    timers.insert(bucket.to_string(), vec![duration]);
                    true
                }
            }
        };

        if first_sample {
            self.rules.assign_rule(self.config.strip_postfix(bucket));
        }
    }

    // ------------------------------------------------------------------
    // Flush
    // ------------------------------------------------------------------

    pub fn flush_counters(&self, now: i64, out: &mut BytesMut) -> u64 {
        let detached = std::mem::take(&mut *self.counters.lock());
        let mut inactivity = self.inactivity.lock();
        flush::flush_counters(
            detached,
            &mut inactivity,
            self.config.persist_count_keys,
            now,
            out,
        )
    }

    pub fn flush_gauges(&self, now: i64, out: &mut BytesMut) -> u64 {
        let mut detached = std::mem::take(&mut *self.gauges.lock());
        let lines = flush::flush_gauges(&mut detached, self.config.delete_gauges, now, out);

        if !detached.is_empty() {
            // writes that landed during the pass are newer
            let mut live = self.gauges.lock();
            for (bucket, value) in detached {
                live.entry(bucket).or_insert(value);
            }
        }
        lines
    }

    pub fn flush_sets(&self, now: i64, out: &mut BytesMut) -> u64 {
        let detached = std::mem::take(&mut *self.sets.lock());
        flush::flush_sets(detached, now, out)
    }

    pub fn flush_timers(&self, now: i64, out: &mut BytesMut) -> u64 {
        let detached = std::mem::take(&mut *self.timers.lock());
        timer::flush_timers(detached, &self.rules, &self.config, now, out)
    }

    /// Run one full flush cycle stamped with `now` (unix seconds)
    pub fn flush(&self, now: i64, out: &mut BytesMut) -> FlushSummary {
        let summary = FlushSummary {
            counters: self.flush_counters(now, out),
            gauges: self.flush_gauges(now, out),
            sets: self.flush_sets(now, out),
            timers: self.flush_timers(now, out),
        };
        debug!(
            now,
            counters = summary.counters,
            gauges = summary.gauges,
            sets = summary.sets,
            timers = summary.timers,
            "flush cycle complete"
        );
        summary
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    pub fn counter_value(&self, bucket: &str) -> Option<f64> {
        self.counters.lock().get(bucket).copied()
    }

    pub fn gauge_value(&self, bucket: &str) -> Option<f64> {
        self.gauges.lock().get(bucket).copied()
    }

    /// Raw members recorded for a set bucket, duplicates included
    pub fn set_members(&self, bucket: &str) -> Option<usize> {
        self.sets.lock().get(bucket).map(Vec::len)
    }

    pub fn timer_samples(&self, bucket: &str) -> Option<usize> {
        self.timers.lock().get(bucket).map(Vec::len)
    }

    /// Idle cycles recorded for a counter, if it is still tracked
    pub fn idle_cycles(&self, bucket: &str) -> Option<u32> {
        self.inactivity.lock().get(bucket).copied()
    }
}
