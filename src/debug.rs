use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use tracing::info;

use crate::app_state::build_app_state;
use crate::core::persistence::config::ReportConfigFsAdapter;
use crate::pipeline;

/// Set to run the pipeline on synthetic data instead of the configured providers.
pub const DEBUG_MODE_ENV: &str = "CLOUDCOST_DEBUG_MODE";

pub fn debug_mode_enabled() -> bool {
    std::env::var(DEBUG_MODE_ENV).is_ok_and(|v| !v.is_empty() && v != "0")
}

fn debug_config_yaml(days: i64) -> String {
    let end = Utc::now().date_naive();
    let start = end - Duration::days(days);
    format!(
        r#"
window:
  start: {start}T00:00:00Z
  end: {end}T00:00:00Z
group_by: [provider, service, currency]
template: table
providers:
  - type: synthetic
    provider: aws
    rows: 120
  - type: synthetic
    provider: azure
    rows: 120
  - type: synthetic
    provider: gcp
    rows: 120
"#
    )
}

/// Runs only when in CLOUDCOST_DEBUG_MODE: last 30 days of synthetic data for
/// all three providers, rendered to stdout.
pub async fn run_debug() -> Result<()> {
    info!("Debug mode: running synthetic report");

    let config = ReportConfigFsAdapter::parse(&debug_config_yaml(30))?;
    let state = build_app_state(config).context("Failed to build debug state")?;
    let outcome = pipeline::run(&state).await.context("Debug run failed")?;

    info!(
        groups = outcome.view.len(),
        records = outcome.view.record_count(),
        "Debug run completed"
    );
    Ok(())
}
