use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, info_span, warn, Instrument};

use cloudcost_core::app_state::build_app_state;
use cloudcost_core::core::logging::init_tracing;
use cloudcost_core::core::persistence::config::{ReportConfigEntity, ReportConfigFsAdapter};
use cloudcost_core::debug::{debug_mode_enabled, run_debug};
use cloudcost_core::errors::RunError;
use cloudcost_core::pipeline::{self, RunOutcome};

const EXIT_SUCCESS: u8 = 0;
const EXIT_DEGRADED: u8 = 2;
const EXIT_FATAL: u8 = 1;
const EXIT_INTERRUPTED: u8 = 130;

/// Aggregates AWS, Azure and GCP billing data into one report.
#[derive(Debug, Parser)]
#[command(name = "cloudcost", version, about)]
struct Cli {
    /// YAML run configuration.
    #[arg(long, short, default_value = "cloudcost.yaml")]
    config: PathBuf,

    /// Fail unless every provider returns complete data.
    #[arg(long)]
    strict: bool,

    /// Template name; overrides the config.
    #[arg(long, short)]
    template: Option<String>,

    /// Output file; overrides the config. Defaults to stdout.
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Grouping dimensions, e.g. `provider,service,month`.
    #[arg(long, value_delimiter = ',')]
    group_by: Vec<String>,
}

impl Cli {
    fn apply(&self, config: &mut ReportConfigEntity) {
        config.strict |= self.strict;
        if let Some(template) = &self.template {
            config.template = template.clone();
        }
        if let Some(output) = &self.output {
            config.output = Some(output.clone());
        }
        if !self.group_by.is_empty() {
            config.group_by = self.group_by.clone();
        }
    }
}

fn load_config(cli: &Cli) -> Result<ReportConfigEntity> {
    let mut config = ReportConfigFsAdapter::read(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    cli.apply(&mut config);
    Ok(config)
}

fn exit_status(outcome: &RunOutcome) -> u8 {
    if outcome.is_degraded() {
        EXIT_DEGRADED
    } else {
        EXIT_SUCCESS
    }
}

fn exit_code(outcome: &RunOutcome) -> ExitCode {
    for warning in outcome.warnings() {
        warn!("{}", warning);
    }
    ExitCode::from(exit_status(outcome))
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let _guard = init_tracing();
    let cli = Cli::parse();

    if debug_mode_enabled() {
        return match run_debug().await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!(error = %format!("{:#}", e), "Debug run failed");
                ExitCode::from(EXIT_FATAL)
            }
        };
    }

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %format!("{:#}", e), "Invalid configuration");
            return ExitCode::from(EXIT_FATAL);
        }
    };

    let state = match build_app_state(config) {
        Ok(state) => state,
        Err(e) => {
            error!(error = %e, "Failed to prepare run");
            return ExitCode::from(EXIT_FATAL);
        }
    };

    let span = info_span!("run", run_id = %state.run_id);
    let result: Result<RunOutcome, RunError> = tokio::select! {
        result = pipeline::run(&state).instrument(span) => result,
        _ = tokio::signal::ctrl_c() => {
            warn!(run_id = %state.run_id, "Interrupted; aborting run");
            return ExitCode::from(EXIT_INTERRUPTED);
        }
    };

    match result {
        Ok(outcome) => {
            info!(run_id = %state.run_id, degraded = outcome.is_degraded(), "Run finished");
            exit_code(&outcome)
        }
        Err(e) => {
            error!(run_id = %state.run_id, error = %e, "Run failed");
            ExitCode::from(EXIT_FATAL)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudcost_core::domain::aggregate::model::AggregatedView;
    use cloudcost_core::domain::common::model::Provider;
    use cloudcost_core::domain::report::dto::ProviderCompleteness;

    fn outcome(completeness: Vec<ProviderCompleteness>) -> RunOutcome {
        RunOutcome {
            completeness,
            view: AggregatedView::new(Vec::new()),
            document: Vec::new(),
        }
    }

    #[test]
    fn degraded_runs_exit_with_two() {
        let degraded = outcome(vec![
            ProviderCompleteness::complete(Provider::Aws, 10, 0),
            ProviderCompleteness::absent(Provider::Gcp, "rate limit exhausted"),
        ]);
        assert_eq!(exit_status(&degraded), 2);

        let partial = outcome(vec![ProviderCompleteness::partial(Provider::Azure, 3, 0, "HTTP 500")]);
        assert_eq!(exit_status(&partial), 2);
    }

    #[test]
    fn complete_runs_exit_with_zero() {
        let complete = outcome(vec![
            ProviderCompleteness::complete(Provider::Aws, 10, 0),
            ProviderCompleteness::complete(Provider::Azure, 4, 2),
        ]);
        assert_eq!(exit_status(&complete), 0);
    }

    #[test]
    fn cli_overrides_config() {
        let cli = Cli::parse_from([
            "cloudcost",
            "--strict",
            "--template",
            "html",
            "--group-by",
            "provider,month",
        ]);
        assert_eq!(cli.config, PathBuf::from("cloudcost.yaml"));

        let mut config = ReportConfigFsAdapter::parse(
            r#"
window:
  start: 2026-09-01T00:00:00Z
  end: 2026-10-01T00:00:00Z
providers:
  - type: synthetic
    provider: aws
"#,
        )
        .unwrap();
        cli.apply(&mut config);

        assert!(config.strict);
        assert_eq!(config.template, "html");
        assert_eq!(config.group_by, vec!["provider".to_string(), "month".to_string()]);
        assert!(config.output.is_none());
    }
}
