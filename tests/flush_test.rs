//! Flush Cycle Integration Tests
//!
//! Drives the aggregator the way the ingestion path and the cycle driver do,
//! verifying:
//! - Counter emission and idle decay
//! - Gauge stickiness and deletion
//! - Set cardinality
//! - Timer percentiles, statistics and rule selection
//! - Rule config reload

use std::io::Write;
use std::sync::Arc;

use bytes::BytesMut;
use statsd_flush::metrics::{
    tail_value, Aggregator, FlushConfig, MetricPoint, MetricRule, RuleConfig, RuleMatcher,
    RuleSet,
};

fn aggregator_with(config: FlushConfig, rules_json: &str) -> Aggregator {
    let rules = RuleMatcher::from_json(rules_json.as_bytes()).unwrap();
    Aggregator::new(config, Arc::new(rules))
}

fn flush_lines(agg: &Aggregator, now: i64) -> Vec<String> {
    let mut out = BytesMut::new();
    agg.flush(now, &mut out);
    let mut lines: Vec<String> = String::from_utf8(out.to_vec())
        .unwrap()
        .lines()
        .map(String::from)
        .collect();
    lines.sort();
    lines
}

const CATCH_ALL: &str = r#"{"metrics": [{"regexp": ".*"}]}"#;

// ============================================================================
// Counter Tests
// ============================================================================

#[test]
fn test_counter_emitted_once_then_cleared() {
    let agg = aggregator_with(FlushConfig::default(), CATCH_ALL);
    agg.submit(MetricPoint::counter("api.requests", 40.0));
    agg.submit(MetricPoint::counter("api.requests", 2.0));

    assert_eq!(flush_lines(&agg, 1000), vec!["api.requests 42 1000"]);
    assert_eq!(agg.counter_value("api.requests"), None);
}

#[test]
fn test_idle_counter_decays_after_persistence_limit() {
    let config = FlushConfig {
        persist_count_keys: 4,
        ..FlushConfig::default()
    };
    let agg = aggregator_with(config, CATCH_ALL);
    agg.add_counter("api.errors", 1.0);
    assert_eq!(flush_lines(&agg, 0), vec!["api.errors 1 0"]);

    let mut zero_lines = 0;
    for now in 1..=10 {
        let lines = flush_lines(&agg, now);
        if now <= 4 {
            assert_eq!(lines, vec![format!("api.errors 0 {}", now)]);
        } else {
            assert!(lines.is_empty());
        }
        zero_lines += lines.len();
    }
    assert_eq!(zero_lines, 4);
    assert_eq!(agg.idle_cycles("api.errors"), None);
}

// ============================================================================
// Gauge Tests
// ============================================================================

#[test]
fn test_sticky_gauge_reemitted_every_cycle() {
    let agg = aggregator_with(FlushConfig::default(), CATCH_ALL);
    agg.submit(MetricPoint::gauge("queue.depth", 17.0));

    for now in 0..5 {
        assert_eq!(flush_lines(&agg, now), vec![format!("queue.depth 17 {}", now)]);
    }
}

#[test]
fn test_deleted_gauge_emitted_once() {
    let config = FlushConfig {
        delete_gauges: true,
        ..FlushConfig::default()
    };
    let agg = aggregator_with(config, CATCH_ALL);
    agg.submit(MetricPoint::gauge("queue.depth", 17.0));

    assert_eq!(flush_lines(&agg, 0), vec!["queue.depth 17 0"]);
    assert!(flush_lines(&agg, 1).is_empty());
    assert_eq!(agg.gauge_value("queue.depth"), None);
}

// ============================================================================
// Set Tests
// ============================================================================

#[test]
fn test_set_cardinality_and_clear() {
    let agg = aggregator_with(FlushConfig::default(), CATCH_ALL);
    for member in ["a", "b", "a", "c"] {
        agg.submit(MetricPoint::set("unique.users", member));
    }

    assert_eq!(flush_lines(&agg, 5), vec!["unique.users 3 5"]);
    assert_eq!(agg.set_members("unique.users"), None);
    assert!(flush_lines(&agg, 6).is_empty());
}

// ============================================================================
// Timer Tests
// ============================================================================

#[test]
fn test_percentile_properties() {
    let samples: Vec<f64> = (1..=10).map(|v| v as f64).collect();
    assert_eq!(tail_value(&samples, 90.0), Some(9.0));
    assert_eq!(tail_value(&samples, -90.0), Some(1.0));
    assert_eq!(tail_value(&[1.0, 2.0, 3.0], 50.0), Some(2.0));
    assert_eq!(tail_value(&[42.0], 75.0), Some(42.0));
}

#[test]
fn test_timer_full_output() {
    let rules = r#"{"metrics": [
        {"regexp": "^api\\.", "threshold": 8, "percent-thresholds": [90, -90],
         "func": ["sum", "sla_violations", "upper", "lower", "count"]}
    ]}"#;
    let agg = aggregator_with(FlushConfig::default(), rules);
    for v in [3, 7, 1, 10, 5, 2, 9, 4, 8, 6] {
        agg.submit(MetricPoint::timer("api.latency", v as f64));
    }

    assert_eq!(
        flush_lines(&agg, 60),
        vec![
            "api.latency.count 10 60",
            "api.latency.lower 1 60",
            "api.latency.lower_90 1 60",
            "api.latency.mean 5.5 60",
            "api.latency.sla_violations 2 60",
            "api.latency.sum 55 60",
            "api.latency.upper 10 60",
            "api.latency.upper_90 9 60",
        ]
    );
    assert_eq!(agg.timer_samples("api.latency"), None);
}

#[test]
fn test_single_sample_timer() {
    let rules = r#"{"metrics": [{"regexp": ".*", "percent-thresholds": [50, 99, -5]}]}"#;
    let agg = aggregator_with(FlushConfig::default(), rules);
    agg.submit(MetricPoint::timer("db.query", 42.0));

    assert_eq!(
        flush_lines(&agg, 1),
        vec![
            "db.query.lower_5 42 1",
            "db.query.mean 42 1",
            "db.query.upper_50 42 1",
            "db.query.upper_99 42 1",
        ]
    );
}

#[test]
fn test_fractional_percentile_labels_truncate() {
    let rules = r#"{"metrics": [{"regexp": ".*", "percent-thresholds": [99.9, -0.5]}]}"#;
    let agg = aggregator_with(FlushConfig::default(), rules);
    for v in 1..=10 {
        agg.submit(MetricPoint::timer("t", v as f64));
    }

    assert_eq!(
        flush_lines(&agg, 1),
        vec!["t.lower_0 10 1", "t.mean 5.5 1", "t.upper_99 10 1"]
    );
}

#[test]
fn test_timer_postfix() {
    let config = FlushConfig {
        postfix: ".host1".to_string(),
        ..FlushConfig::default()
    };
    let rules = r#"{"metrics": [{"regexp": "^db\\.query$", "func": ["count"]}]}"#;
    let agg = aggregator_with(config, rules);
    agg.submit(MetricPoint::timer("db.query.host1", 2.0));
    agg.submit(MetricPoint::timer("db.query.host1", 4.0));

    assert_eq!(
        flush_lines(&agg, 9),
        vec!["db.query.count.host1 2 9", "db.query.mean.host1 3 9"]
    );
}

#[test]
fn test_unmatched_timer_dropped() {
    let rules = r#"{"metrics": [{"regexp": "^api\\."}]}"#;
    let agg = aggregator_with(FlushConfig::default(), rules);
    agg.submit(MetricPoint::timer("db.query", 5.0));

    assert!(flush_lines(&agg, 1).is_empty());
    assert_eq!(agg.timer_samples("db.query"), None);
}

#[test]
fn test_first_matching_rule_wins() {
    let rules = RuleSet::compile(RuleConfig {
        metrics: vec![
            MetricRule::new("^api\\.").with_functions(&["count"]),
            MetricRule::new("latency").with_functions(&["sum"]),
        ],
    });
    let agg = Aggregator::new(FlushConfig::default(), Arc::new(RuleMatcher::new(rules)));
    agg.submit(MetricPoint::timer("api.latency", 1.0));
    agg.submit(MetricPoint::timer("db.latency", 1.0));

    assert_eq!(
        flush_lines(&agg, 0),
        vec![
            "api.latency.count 1 0",
            "api.latency.mean 1 0",
            "db.latency.mean 1 0",
            "db.latency.sum 1 0",
        ]
    );
}

// ============================================================================
// Config Reload Tests
// ============================================================================

#[test]
fn test_reload_with_invalid_pattern() {
    let agg = aggregator_with(FlushConfig::default(), CATCH_ALL);
    agg.rules()
        .load_config(
            br#"{"metrics": [
                {"regexp": "([unclosed", "func": ["count"]},
                {"regexp": "^api\\.", "func": ["sum"]}
            ]}"#,
        )
        .unwrap();

    let rules = agg.rules().rules();
    assert_eq!(rules.len(), 2);
    assert_eq!(rules.inert_count(), 1);

    agg.submit(MetricPoint::timer("api.latency", 3.0));
    agg.submit(MetricPoint::timer("([unclosed", 3.0));
    assert_eq!(
        flush_lines(&agg, 0),
        vec!["api.latency.mean 3 0", "api.latency.sum 3 0"]
    );
}

#[test]
fn test_rejected_reload_keeps_rules() {
    let agg = aggregator_with(FlushConfig::default(), CATCH_ALL);
    assert!(agg.rules().load_config(b"{\"metrics\": [").is_err());

    agg.submit(MetricPoint::timer("db.query", 1.0));
    assert_eq!(flush_lines(&agg, 0), vec!["db.query.mean 1 0"]);
}

#[test]
fn test_reload_reclassifies_buckets() {
    let agg = aggregator_with(FlushConfig::default(), CATCH_ALL);
    agg.submit(MetricPoint::timer("db.query", 1.0));
    assert_eq!(flush_lines(&agg, 0), vec!["db.query.mean 1 0"]);

    agg.rules()
        .load_config(br#"{"metrics": [{"regexp": "^api\\."}]}"#)
        .unwrap();
    agg.submit(MetricPoint::timer("db.query", 1.0));
    assert!(flush_lines(&agg, 1).is_empty());
}

#[test]
fn test_load_rules_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(br#"{"metrics": [{"regexp": "^api\\.", "func": ["count"]}]}"#)
        .unwrap();

    let matcher = RuleMatcher::default();
    matcher.load_config_file(file.path()).unwrap();
    assert_eq!(matcher.rules().len(), 1);
    assert!(matcher.assign_rule("api.latency").is_some());

    assert!(matcher
        .load_config_file(file.path().with_extension("missing"))
        .is_err());
    assert_eq!(matcher.rules().len(), 1);
}

// ============================================================================
// Concurrency Tests
// ============================================================================

#[test]
fn test_concurrent_ingest_and_flush_loses_nothing() {
    let agg = Arc::new(aggregator_with(FlushConfig::default(), CATCH_ALL));

    let writers: Vec<_> = (0..4)
        .map(|_| {
            let agg = agg.clone();
            std::thread::spawn(move || {
                for _ in 0..1000 {
                    agg.add_counter("hits", 1.0);
                }
            })
        })
        .collect();

    let mut total = 0.0;
    for now in 0..50 {
        let mut out = BytesMut::new();
        agg.flush_counters(now, &mut out);
        total += sum_hits(&out);
    }
    for w in writers {
        w.join().unwrap();
    }
    let mut out = BytesMut::new();
    agg.flush_counters(99, &mut out);
    total += sum_hits(&out);

    assert_eq!(total, 4000.0);
}

fn sum_hits(out: &BytesMut) -> f64 {
    String::from_utf8(out.to_vec())
        .unwrap()
        .lines()
        .filter_map(|line| line.split(' ').nth(1))
        .filter_map(|v| v.parse::<f64>().ok())
        .sum()
}
