//! Counter, gauge and set flush passes
//!
//! Each pass works on a store detached from the ingestion path and writes
//! `<bucket> <value> <timestamp>` lines. They differ only in lifecycle:
//!
//! - **Counters** are consumed every cycle; an idle counter keeps emitting
//!   zeros for a bounded number of cycles before it is forgotten.
//! - **Gauges** are sticky unless deletion is enabled.
//! - **Sets** report their distinct member count and are always cleared.

use ahash::{AHashMap, AHashSet};
use bytes::BytesMut;

use super::encoder::RecordEncoder;

/// Consecutive idle cycles per counter bucket
pub type InactivityTracker = AHashMap<String, u32>;

/// Emit accumulated counters and the zero tail of idle ones.
///
/// Every bucket with a nonzero value is written and its idle count reset.
/// Then every tracked bucket with an idle count above zero gets a zero line,
/// its count is bumped, and it is forgotten once the count exceeds
/// `persist_limit`. An idle counter therefore emits exactly `persist_limit`
/// zero lines. Returns the number of lines written.
pub fn flush_counters(
    counters: AHashMap<String, f64>,
    inactivity: &mut InactivityTracker,
    persist_limit: u32,
    now: i64,
    out: &mut BytesMut,
) -> u64 {
    let mut lines = 0;

    for (bucket, value) in counters {
        if value == 0.0 {
            continue;
        }
        RecordEncoder::write(out, &bucket, value, now);
        inactivity.insert(bucket, 0);
        lines += 1;
    }

    inactivity.retain(|bucket, idle| {
        if *idle > 0 {
            RecordEncoder::write(out, bucket, 0.0, now);
            lines += 1;
        }
        *idle += 1;
        *idle <= persist_limit
    });

    lines
}

/// Emit every gauge. With `delete` set the map is emptied afterwards.
/// Returns the number of lines written.
pub fn flush_gauges(
    gauges: &mut AHashMap<String, f64>,
    delete: bool,
    now: i64,
    out: &mut BytesMut,
) -> u64 {
    for (bucket, value) in gauges.iter() {
        RecordEncoder::write(out, bucket, *value, now);
    }
    let lines = gauges.len() as u64;
    if delete {
        gauges.clear();
    }
    lines
}

/// Emit the distinct member count of every set. Returns the number of lines written.
pub fn flush_sets(sets: AHashMap<String, Vec<String>>, now: i64, out: &mut BytesMut) -> u64 {
    let mut lines = 0;
    for (bucket, members) in sets {
        let unique: AHashSet<&str> = members.iter().map(String::as_str).collect();
        RecordEncoder::write_count(out, &bucket, unique.len() as u64, now);
        lines += 1;
    }
    lines
}
