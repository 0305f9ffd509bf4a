//! Core metric types for the aggregation engine

use serde::{Deserialize, Serialize};

/// Kind of metric being accumulated between flushes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetricType {
    /// Accumulated per cycle, zeroed on flush, decays to silence when idle
    /// Use for: request counts, error counts
    Counter,

    /// Last written value, sticky across flushes unless deletion is enabled
    /// Use for: queue depth, memory usage
    Gauge,

    /// Distinct members observed during one cycle
    /// Use for: unique users, unique hosts
    Set,

    /// Raw durations, summarised by rule-driven statistics
    /// Use for: latency, request sizes
    Timer,
}

impl MetricType {
    /// Get the statsd type code used on the wire
    pub fn type_code(&self) -> &'static str {
        match self {
            MetricType::Counter => "c",
            MetricType::Gauge => "g",
            MetricType::Set => "s",
            MetricType::Timer => "ms",
        }
    }

    /// Parse a statsd type code back to MetricType
    pub fn from_type_code(code: &str) -> Option<MetricType> {
        match code {
            "c" => Some(MetricType::Counter),
            "g" => Some(MetricType::Gauge),
            "s" => Some(MetricType::Set),
            "ms" => Some(MetricType::Timer),
            _ => None,
        }
    }
}

/// Value carried by a single sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MetricValue {
    /// Numeric value (counters, gauges, timers)
    Number(f64),
    /// Member value (sets)
    Member(String),
}

impl MetricValue {
    /// Get as f64; members read as 0
    pub fn as_f64(&self) -> f64 {
        match self {
            MetricValue::Number(n) => *n,
            MetricValue::Member(_) => 0.0,
        }
    }

    /// Get as string
    pub fn as_string(&self) -> String {
        match self {
            MetricValue::Number(n) => n.to_string(),
            MetricValue::Member(s) => s.clone(),
        }
    }
}

impl From<f64> for MetricValue {
    fn from(v: f64) -> Self {
        MetricValue::Number(v)
    }
}

impl From<String> for MetricValue {
    fn from(v: String) -> Self {
        MetricValue::Member(v)
    }
}

impl From<&str> for MetricValue {
    fn from(v: &str) -> Self {
        MetricValue::Member(v.to_string())
    }
}

/// A single sample handed over by the ingestion path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    /// Bucket name (e.g., "api.requests", "db.query_time.p")
    pub name: String,

    /// Kind of metric
    pub metric_type: MetricType,

    /// The sampled value
    pub value: MetricValue,
}

impl MetricPoint {
    /// Create a counter increment
    pub fn counter(name: impl Into<String>, increment: f64) -> Self {
        MetricPoint {
            name: name.into(),
            metric_type: MetricType::Counter,
            value: MetricValue::Number(increment),
        }
    }

    /// Create a gauge write
    pub fn gauge(name: impl Into<String>, value: f64) -> Self {
        MetricPoint {
            name: name.into(),
            metric_type: MetricType::Gauge,
            value: MetricValue::Number(value),
        }
    }

    /// Create a set membership observation
    pub fn set(name: impl Into<String>, member: impl Into<String>) -> Self {
        MetricPoint {
            name: name.into(),
            metric_type: MetricType::Set,
            value: MetricValue::Member(member.into()),
        }
    }

    /// Create a timer sample
    pub fn timer(name: impl Into<String>, duration: f64) -> Self {
        MetricPoint {
            name: name.into(),
            metric_type: MetricType::Timer,
            value: MetricValue::Number(duration),
        }
    }

    /// Parse a `name:value|type` line (sample-rate suffixes are not supported)
    pub fn parse_line(line: &str) -> Result<MetricPoint, String> {
        let line = line.trim();
        let (name, rest) = line
            .split_once(':')
            .ok_or_else(|| format!("Missing ':' in sample line: {}", line))?;
        let (value, code) = rest
            .split_once('|')
            .ok_or_else(|| format!("Missing '|' in sample line: {}", line))?;

        if name.is_empty() {
            return Err("Empty bucket name".to_string());
        }

        let metric_type = MetricType::from_type_code(code)
            .ok_or_else(|| format!("Unknown metric type: {}", code))?;

        match metric_type {
            MetricType::Set => Ok(MetricPoint::set(name, value)),
            _ => {
                let n: f64 = value
                    .parse()
                    .map_err(|_| format!("Invalid numeric value: {}", value))?;
                if !n.is_finite() {
                    return Err(format!("Non-finite value: {}", value));
                }
                Ok(MetricPoint {
                    name: name.to_string(),
                    metric_type,
                    value: MetricValue::Number(n),
                })
            }
        }
    }
}
