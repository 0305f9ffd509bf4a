//! Timer-driven flush cycle
//!
//! Stamps each cycle with the current unix time in seconds, flushes the
//! aggregator and hands the encoded batch to a sink. A final cycle runs when
//! shutdown is signalled so nothing accumulated is lost.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::{Bytes, BytesMut};
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use super::aggregator::Aggregator;

pub struct FlushLoop {
    aggregator: Arc<Aggregator>,
    period: Duration,
}

impl FlushLoop {
    /// Flush on the aggregator's configured interval
    pub fn new(aggregator: Arc<Aggregator>) -> Self {
        let period = aggregator.config().flush_interval;
        FlushLoop { aggregator, period }
    }

    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    pub async fn run<F>(self, mut shutdown: watch::Receiver<bool>, mut sink: F)
    where
        F: FnMut(Bytes),
    {
        let mut tick = interval(self.period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately
        tick.tick().await;

        info!(period_ms = self.period.as_millis() as u64, "flush loop started");

        loop {
            tokio::select! {
                _ = tick.tick() => self.cycle(&mut sink),
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        self.cycle(&mut sink);
                        info!("flush loop stopped");
                        break;
                    }
                }
            }
        }
    }

    fn cycle<F: FnMut(Bytes)>(&self, sink: &mut F) {
        let mut out = BytesMut::new();
        let summary = self.aggregator.flush(unix_now(), &mut out);
        if !out.is_empty() {
            debug!(lines = summary.total(), bytes = out.len(), "emitting flush batch");
            sink(out.freeze());
        }
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
