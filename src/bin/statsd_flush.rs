//! Flush Driver
//!
//! Reads `name:value|type` samples from stdin, aggregates them, and writes
//! flushed records to stdout once per flush interval.
//!
//! Usage:
//!   statsd-flush [rules.json] < samples.txt
//!
//! The rules file may also be given via `STATSD_RULES_FILE`. Flush parameters
//! come from `STATSD_*` environment variables (see `FlushConfig`). On unix,
//! SIGHUP reloads the rules file; a malformed file keeps the old rules.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use statsd_flush::metrics::ConfigError;
use statsd_flush::{Aggregator, FlushConfig, FlushLoop, MetricPoint, RuleMatcher};

fn rules_path() -> Option<PathBuf> {
    std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("STATSD_RULES_FILE").map(PathBuf::from))
}

#[cfg(unix)]
fn spawn_reload_on_hangup(rules: Arc<RuleMatcher>, path: PathBuf) {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async move {
        let mut hangup = match signal(SignalKind::hangup()) {
            Ok(s) => s,
            Err(e) => {
                warn!("Cannot listen for SIGHUP: {}", e);
                return;
            }
        };
        while hangup.recv().await.is_some() {
            info!("Reloading rules from {}", path.display());
            if let Err(e) = rules.load_config_file(&path) {
                error!("Reload failed, keeping previous rules: {}", e);
            }
        }
    });
}

#[tokio::main]
async fn main() -> Result<(), ConfigError> {
    // Logs go to stderr; stdout carries only records
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = FlushConfig::from_env();
    let rules = Arc::new(RuleMatcher::default());

    match rules_path() {
        Some(path) => {
            rules.load_config_file(&path)?;
            #[cfg(unix)]
            spawn_reload_on_hangup(rules.clone(), path);
        }
        None => warn!("No rules file given; every timer bucket will be dropped"),
    }

    info!(
        persist_count_keys = config.persist_count_keys,
        delete_gauges = config.delete_gauges,
        postfix = %config.postfix,
        "starting flush driver"
    );

    let aggregator = Arc::new(Aggregator::new(config, rules));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let flusher = tokio::spawn(FlushLoop::new(aggregator.clone()).run(shutdown_rx, |batch| {
        let mut stdout = std::io::stdout().lock();
        if let Err(e) = stdout.write_all(&batch).and_then(|_| stdout.flush()) {
            error!("Failed to write flush batch: {}", e);
        }
    }));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => continue,
            Ok(Some(line)) => match MetricPoint::parse_line(&line) {
                Ok(point) => aggregator.submit(point),
                Err(msg) => warn!("Skipping sample: {}", msg),
            },
            Ok(None) => break,
            Err(e) => {
                error!("stdin read error: {}", e);
                break;
            }
        }
    }

    let _ = shutdown_tx.send(true);
    if let Err(e) = flusher.await {
        error!("Flush loop task failed: {}", e);
    }
    Ok(())
}
