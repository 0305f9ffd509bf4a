//! Output record encoding
//!
//! Every flushed record is one plaintext line:
//!
//! Format: `<metric-name> <value> <unix-timestamp>\n`
//!
//! Examples:
//! - `api.requests 42 1700000000` (counter)
//! - `db.query.mean 12.75 1700000000` (timer statistic)

use std::fmt::Write;

use bytes::BytesMut;

/// Encodes flushed values into output record lines
pub struct RecordEncoder;

impl RecordEncoder {
    /// Append one record line to the output buffer
    pub fn write(out: &mut BytesMut, name: &str, value: f64, now: i64) {
        // fmt::Write for BytesMut only fails on allocation failure
        let _ = writeln!(out, "{} {} {}", name, Self::format_value(value), now);
    }

    /// Append one record line carrying an integer count
    pub fn write_count(out: &mut BytesMut, name: &str, count: u64, now: i64) {
        let _ = writeln!(out, "{} {} {}", name, count, now);
    }

    /// Render a value as an integer-looking token when whole, otherwise the
    /// shortest decimal that round-trips. Never uses exponent notation.
    ///
    /// Non-finite values render as `0` so the line stays parseable.
    pub fn format_value(value: f64) -> String {
        if !value.is_finite() || value == 0.0 {
            return "0".to_string();
        }
        // f64's Display is shortest-round-trip and never switches to exponent form
        value.to_string()
    }

    /// Render a percentile spec as a metric-name label: the whole part with
    /// the sign dropped (`99.9` -> `99`, `-10` -> `10`, `-0.5` -> `0`)
    pub fn format_label(value: f64) -> String {
        (value.trunc() as i64).unsigned_abs().to_string()
    }
}
