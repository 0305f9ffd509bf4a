//! Tail percentiles over sorted timer samples
//!
//! A percentile spec is signed: a non-negative value selects the upper tail
//! (`90` -> the sample at the 90th percentile), a negative value selects the
//! lower tail counted from 100 (`-90` -> the sample at the 10th percentile).

use super::encoder::RecordEncoder;

/// Direction of a percentile spec
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tail {
    Upper,
    Lower,
}

/// A configured percentile with its metric-name label
#[derive(Debug, Clone, PartialEq)]
pub struct PercentileSpec {
    /// Signed percentile value (negative = lower tail)
    pub value: f64,
    /// Label used in `<name>.upper_<label>` / `<name>.lower_<label>`
    pub label: String,
}

impl PercentileSpec {
    pub fn new(value: f64) -> Self {
        PercentileSpec {
            value,
            label: RecordEncoder::format_label(value),
        }
    }

    pub fn tail(&self) -> Tail {
        if self.value >= 0.0 {
            Tail::Upper
        } else {
            Tail::Lower
        }
    }

    /// Metric-name segment for this spec (`upper_90`, `lower_10`)
    pub fn suffix(&self) -> String {
        match self.tail() {
            Tail::Upper => format!("upper_{}", self.label),
            Tail::Lower => format!("lower_{}", self.label),
        }
    }
}

/// Pick the sample at signed percentile `p` from ascending `sorted`.
///
/// Rank is `p` for the upper tail and `100 + p` for the lower tail. The index
/// is `floor(rank / 100 * count + 0.5) - 1`, clamped into the slice.
/// Returns `None` only for an empty slice.
pub fn tail_value(sorted: &[f64], p: f64) -> Option<f64> {
    match sorted.len() {
        0 => None,
        1 => Some(sorted[0]),
        count => {
            let rank = if p >= 0.0 { p } else { 100.0 + p };
            // round half up
            let index = ((rank / 100.0) * count as f64 + 0.5).floor() as i64 - 1;
            let index = index.clamp(0, count as i64 - 1) as usize;
            Some(sorted[index])
        }
    }
}
