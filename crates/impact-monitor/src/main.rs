//! impact-monitor: load an item's impact record, poll the analysis service for
//! per-category detail and print the resulting radar chart data as JSON.
//!
//! Usage:
//!   cargo run -p impact-monitor -- <item-id> <record.json>
//!   cargo run -p impact-monitor -- <item-id> <record.json> --large

mod config;

use anyhow::{bail, Context, Result};
use config::MonitorConfig;
use impact_analysis::{ChartData, ContainerSize, ContainerSizes, ImpactEngine, LayoutPoint, PollingStatus};
use impact_client::HttpCategoryFetcher;
use impact_core::{AffectedInstrument, ChartSide, RawImpactRecord};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Serialize)]
struct ImpactReport {
    item_id: String,
    timed_out: bool,
    chart: ChartData,
    positive_layout: Vec<LayoutPoint>,
    negative_layout: Vec<LayoutPoint>,
    instruments: BTreeMap<String, Vec<AffectedInstrument>>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_writer(std::io::stderr)
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    }

    let args: Vec<String> = std::env::args().skip(1).collect();
    let positional: Vec<&String> = args.iter().filter(|a| !a.starts_with("--")).collect();
    let (item_id, record_path) = match positional.as_slice() {
        [item_id, record_path] => (item_id.as_str(), record_path.as_str()),
        _ => bail!("usage: impact-monitor <item-id> <record.json> [--large]"),
    };

    let config = MonitorConfig::from_env().context("Invalid configuration")?;
    let large_viewport = config.large_viewport || args.iter().any(|a| a == "--large");

    let json = std::fs::read_to_string(record_path)
        .with_context(|| format!("Failed to read {}", record_path))?;
    let record = RawImpactRecord::from_json(&json)
        .with_context(|| format!("Failed to parse impact record {}", record_path))?;

    let fetcher = Arc::new(HttpCategoryFetcher::new(&config.client_config())?);
    let sizes = Arc::new(ContainerSizes::new());
    if let (Some(width), Some(height)) = (config.chart_width, config.chart_height) {
        sizes.report(ChartSide::Positive, ContainerSize::new(width, height));
        sizes.report(ChartSide::Negative, ContainerSize::new(width, height));
    }

    let engine = ImpactEngine::new(fetcher, sizes, config.engine_config())?;
    engine.set_large_viewport(large_viewport);

    tracing::info!("Impact monitor starting for {} against {}", item_id, config.service_url);
    let chart = engine.activate(item_id, &record);

    let mut progress = engine.subscribe();
    let status = loop {
        let current = progress.borrow_and_update().clone();
        log_progress(&current);
        if !current.loading {
            break current;
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received SIGINT, stopping");
                engine.deactivate();
                return Ok(());
            }
            changed = progress.changed() => {
                if changed.is_err() {
                    break engine.polling_status();
                }
            }
        }
    };

    let mut instruments = BTreeMap::new();
    for entry in &status.entries {
        if let Some(cached) = engine.cached_instruments(item_id, &entry.category_key) {
            instruments.insert(entry.category_key.clone(), cached);
        }
    }

    let report = ImpactReport {
        item_id: item_id.to_string(),
        timed_out: status.timed_out,
        chart,
        positive_layout: engine.layout_positions(ChartSide::Positive),
        negative_layout: engine.layout_positions(ChartSide::Negative),
        instruments,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    engine.deactivate();
    Ok(())
}

fn log_progress(status: &PollingStatus) {
    tracing::debug!(
        "{:?}: {}/{} categories ready",
        status.phase,
        status.ready_count(),
        status.entries.len()
    );
}
