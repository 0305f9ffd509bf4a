//! Pattern-based metric rules
//!
//! Rules are tried in declaration order and a timer bucket resolves to the
//! first rule whose pattern matches its name. The association is recorded the
//! first time the bucket is seen and reused every cycle until the rule config
//! is replaced.
//!
//! Config format (JSON):
//! ```text
//! {"metrics": [
//!   {"regexp": "^api\\.", "threshold": 250, "percent-thresholds": [90, -10],
//!    "count_persistence": true, "func": ["std", "count"]},
//!   {"regexp": ".*"}
//! ]}
//! ```
//!
//! A rule whose pattern fails to compile stays in the list but never matches.
//! Only a top-level parse failure rejects a reload.

use std::path::Path;
use std::sync::Arc;

use ahash::AHashMap;
use arc_swap::ArcSwap;
use parking_lot::RwLock;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::error::ConfigError;
use super::percentile::PercentileSpec;

/// Extra statistic a rule can request for its timers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatFunction {
    /// Standard deviation
    Std,
    Sum,
    /// Samples strictly above the rule threshold
    SlaViolations,
    /// Max sample
    Upper,
    /// Min sample
    Lower,
    Count,
}

impl StatFunction {
    pub fn from_name(name: &str) -> Option<StatFunction> {
        match name {
            "std" => Some(StatFunction::Std),
            "sum" => Some(StatFunction::Sum),
            "sla_violations" => Some(StatFunction::SlaViolations),
            "upper" => Some(StatFunction::Upper),
            "lower" => Some(StatFunction::Lower),
            "count" => Some(StatFunction::Count),
            _ => None,
        }
    }

    /// Metric-name segment emitted for this function
    pub fn name(&self) -> &'static str {
        match self {
            StatFunction::Std => "std",
            StatFunction::Sum => "sum",
            StatFunction::SlaViolations => "sla_violations",
            StatFunction::Upper => "upper",
            StatFunction::Lower => "lower",
            StatFunction::Count => "count",
        }
    }
}

/// One rule as written in the config
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRule {
    #[serde(rename = "regexp")]
    pub pattern: String,
    /// SLA threshold for `sla_violations`
    #[serde(default)]
    pub threshold: f64,
    #[serde(rename = "percent-thresholds", default)]
    pub percent_thresholds: Vec<f64>,
    /// Retain counter on idle
    #[serde(default)]
    pub count_persistence: bool,
    #[serde(rename = "func", default)]
    pub functions: Vec<String>,
}

impl MetricRule {
    pub fn new(pattern: impl Into<String>) -> Self {
        MetricRule {
            pattern: pattern.into(),
            threshold: 0.0,
            percent_thresholds: Vec::new(),
            count_persistence: false,
            functions: Vec::new(),
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_percentiles(mut self, percentiles: &[f64]) -> Self {
        self.percent_thresholds = percentiles.to_vec();
        self
    }

    pub fn with_functions(mut self, functions: &[&str]) -> Self {
        self.functions = functions.iter().map(|f| f.to_string()).collect();
        self
    }
}

/// Top-level rule config
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleConfig {
    #[serde(default)]
    pub metrics: Vec<MetricRule>,
}

impl RuleConfig {
    pub fn from_json(raw: &[u8]) -> Result<RuleConfig, ConfigError> {
        Ok(serde_json::from_slice(raw)?)
    }
}

/// A rule with its pattern compiled and its statistics resolved
#[derive(Debug)]
pub struct CompiledRule {
    pub rule: MetricRule,
    /// `None` when the pattern failed to compile; the rule never matches
    matcher: Option<Regex>,
    pub percentiles: Vec<PercentileSpec>,
    /// Requested functions in config order, unknown names dropped
    pub functions: Vec<StatFunction>,
}

impl CompiledRule {
    /// Compile the rule at position `index` of its config
    pub fn compile(index: usize, rule: MetricRule) -> Self {
        let matcher = match Regex::new(&rule.pattern) {
            Ok(re) => Some(re),
            Err(e) => {
                warn!(
                    index,
                    pattern = %rule.pattern,
                    error = %e,
                    "rule pattern does not compile; rule will never match"
                );
                None
            }
        };
        let percentiles = rule
            .percent_thresholds
            .iter()
            .map(|&p| PercentileSpec::new(p))
            .collect();
        let functions = rule
            .functions
            .iter()
            .filter_map(|name| {
                let func = StatFunction::from_name(name);
                if func.is_none() {
                    debug!(function = %name, pattern = %rule.pattern, "ignoring unknown statistic function");
                }
                func
            })
            .collect();

        CompiledRule {
            rule,
            matcher,
            percentiles,
            functions,
        }
    }

    pub fn matches(&self, name: &str) -> bool {
        self.matcher.as_ref().is_some_and(|re| re.is_match(name))
    }

    pub fn is_inert(&self) -> bool {
        self.matcher.is_none()
    }

    pub fn threshold(&self) -> f64 {
        self.rule.threshold
    }
}

/// Immutable, ordered list of compiled rules
#[derive(Debug, Default)]
pub struct RuleSet {
    rules: Vec<Arc<CompiledRule>>,
}

impl RuleSet {
    pub fn compile(config: RuleConfig) -> Self {
        let rules = config
            .metrics
            .into_iter()
            .enumerate()
            .map(|(index, rule)| Arc::new(CompiledRule::compile(index, rule)))
            .collect();
        RuleSet { rules }
    }

    pub fn from_json(raw: &[u8]) -> Result<Self, ConfigError> {
        Ok(Self::compile(RuleConfig::from_json(raw)?))
    }

    /// First rule whose pattern matches `name`
    pub fn first_match(&self, name: &str) -> Option<Arc<CompiledRule>> {
        self.rules.iter().find(|r| r.matches(name)).cloned()
    }

    pub fn rules(&self) -> &[Arc<CompiledRule>] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Number of rules whose pattern failed to compile
    pub fn inert_count(&self) -> usize {
        self.rules.iter().filter(|r| r.is_inert()).count()
    }
}

/// Published rule set together with the match records made against it
#[derive(Debug)]
struct MatchState {
    rules: Arc<RuleSet>,
    records: RwLock<AHashMap<String, Option<Arc<CompiledRule>>>>,
}

impl MatchState {
    fn new(rules: RuleSet) -> Self {
        MatchState {
            rules: Arc::new(rules),
            records: RwLock::new(AHashMap::new()),
        }
    }
}

/// Resolves bucket names to rules against the active rule set.
///
/// Reload publishes a fresh rule set with an empty record table in a single
/// pointer swap; lookups in flight keep using the snapshot they loaded.
#[derive(Debug)]
pub struct RuleMatcher {
    state: ArcSwap<MatchState>,
}

impl Default for RuleMatcher {
    fn default() -> Self {
        Self::new(RuleSet::default())
    }
}

impl RuleMatcher {
    pub fn new(rules: RuleSet) -> Self {
        RuleMatcher {
            state: ArcSwap::from_pointee(MatchState::new(rules)),
        }
    }

    /// Build a matcher from a raw JSON config
    pub fn from_json(raw: &[u8]) -> Result<Self, ConfigError> {
        Ok(Self::new(RuleSet::from_json(raw)?))
    }

    /// Classify `bucket` once and return its rule; later calls reuse the record.
    pub fn assign_rule(&self, bucket: &str) -> Option<Arc<CompiledRule>> {
        let state = self.state.load();
        let cached = state.records.read().get(bucket).cloned();
        if let Some(record) = cached {
            return record;
        }

        let matched = state.rules.first_match(bucket);
        let record = state
            .records
            .write()
            .entry(bucket.to_string())
            .or_insert(matched)
            .clone();
        record
    }

    /// Drop match records for buckets `keep` rejects.
    ///
    /// Dropped buckets are classified again on their next sample.
    pub fn retain_records<F>(&self, mut keep: F)
    where
        F: FnMut(&str) -> bool,
    {
        let state = self.state.load();
        state.records.write().retain(|bucket, _| keep(bucket));
    }

    /// Whether `bucket` already has a match record under the active config
    pub fn is_classified(&self, bucket: &str) -> bool {
        self.state.load().records.read().contains_key(bucket)
    }

    /// The active rule set
    pub fn rules(&self) -> Arc<RuleSet> {
        self.state.load().rules.clone()
    }

    /// Parse, compile and publish a new rule config.
    ///
    /// On a parse failure the active config is left untouched.
    pub fn load_config(&self, raw: &[u8]) -> Result<(), ConfigError> {
        let rules = match RuleSet::from_json(raw) {
            Ok(rules) => rules,
            Err(e) => {
                error!(error = %e, "rejecting rule config reload");
                return Err(e);
            }
        };
        info!(
            rules = rules.len(),
            inert = rules.inert_count(),
            "rule config loaded"
        );
        self.state.store(Arc::new(MatchState::new(rules)));
        Ok(())
    }

    /// Read a rules file and publish it as with [`RuleMatcher::load_config`]
    pub fn load_config_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.load_config(&raw)
    }
}
