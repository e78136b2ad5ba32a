use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tracing::{error, info, warn};

use crate::app_state::AppState;
use crate::core::client::{build_adapter, CostAdapter};
use crate::core::persistence::export::RawViewFsAdapter;
use crate::domain::aggregate::model::AggregatedView;
use crate::domain::aggregate::service::aggregate;
use crate::domain::report::dto::{ProviderCompleteness, RawViewExport, ReportContextDto};
use crate::domain::report::service::ReportRenderer;
use crate::errors::{output_error, RunError, TemplateError};
use crate::pipeline::collect_task::collect_all;

/// Result of a finished run.
#[derive(Debug)]
pub struct RunOutcome {
    /// One entry per configured provider, in provider order.
    pub completeness: Vec<ProviderCompleteness>,
    pub view: AggregatedView,
    pub document: Vec<u8>,
}

impl RunOutcome {
    pub fn is_degraded(&self) -> bool {
        self.completeness.iter().any(ProviderCompleteness::is_degraded)
    }

    pub fn warnings(&self) -> Vec<String> {
        self.completeness.iter().filter_map(ProviderCompleteness::warning).collect()
    }
}

/// Runs the whole report against the adapters named in the config.
pub async fn run(state: &AppState) -> Result<RunOutcome, RunError> {
    let adapters = state
        .config
        .providers
        .iter()
        .map(|p| build_adapter(p, state))
        .collect();

    run_with_adapters(state, adapters).await
}

pub async fn run_with_adapters(state: &AppState, adapters: Vec<Arc<dyn CostAdapter>>) -> Result<RunOutcome, RunError> {
    let config = &state.config;
    info!(
        providers = adapters.len(),
        window = %state.window,
        template = %config.template,
        "Starting cost report run"
    );

    let batches = collect_all(
        adapters,
        state.window,
        state.retry_policy.clone(),
        Duration::from_secs(config.timeout_secs),
    )
    .await;

    let mut completeness = Vec::with_capacity(batches.len());
    let mut records = Vec::new();
    for batch in batches {
        if let Some(warning) = batch.completeness.warning() {
            warn!(provider = %batch.completeness.provider, "{}", warning);
        }
        completeness.push(batch.completeness);
        records.extend(batch.records);
    }

    if config.strict {
        let degraded: Vec<String> = completeness
            .iter()
            .filter(|c| c.is_degraded())
            .map(|c| c.provider.to_string())
            .collect();
        if !degraded.is_empty() {
            return Err(RunError::StrictMode(degraded.join(", ")));
        }
    }

    let view = aggregate(&records, &state.group_by)?;
    info!(records = records.len(), groups = view.len(), "Aggregated view built");

    let context = ReportContextDto::build(&view, &completeness)?;
    let document = match render(state, &context) {
        Ok(bytes) => bytes,
        Err(e) => {
            error!(template = %config.template, error = %e, "Rendering failed");
            export_after_failure(config.raw_export.as_deref(), config.output.as_deref(), &context);
            return Err(e.into());
        }
    };

    if let Some(path) = &config.raw_export {
        RawViewFsAdapter::write(path, &RawViewExport::from(&context)).map_err(|e| output_error(format!("{:#}", e)))?;
    }
    write_output(config.output.as_deref(), &document).await?;

    Ok(RunOutcome {
        completeness,
        view,
        document,
    })
}

fn render(state: &AppState, context: &ReportContextDto) -> Result<Vec<u8>, TemplateError> {
    let renderer = match &state.config.template_dir {
        Some(dir) => ReportRenderer::with_template_dir(dir)?,
        None => ReportRenderer::new()?,
    };
    renderer.render_context(context, &state.config.template)
}

/// Keeps the aggregated numbers when the document could not be produced.
fn export_after_failure(raw_export: Option<&Path>, output: Option<&Path>, context: &ReportContextDto) {
    let path: Option<PathBuf> = raw_export
        .map(Path::to_path_buf)
        .or_else(|| output.map(RawViewFsAdapter::default_path));

    let Some(path) = path else {
        warn!("No output path configured; aggregated view not exported");
        return;
    };

    match RawViewFsAdapter::write(&path, &RawViewExport::from(context)) {
        Ok(()) => info!(path = %path.display(), "Aggregated view exported"),
        Err(e) => error!(path = %path.display(), error = %e, "Failed to export aggregated view"),
    }
}

async fn write_output(output: Option<&Path>, document: &[u8]) -> Result<(), RunError> {
    match output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await.map_err(output_error)?;
            }
            tokio::fs::write(path, document).await.map_err(output_error)?;
            info!(path = %path.display(), bytes = document.len(), "Report written");
        }
        None => {
            let mut stdout = tokio::io::stdout();
            stdout.write_all(document).await.map_err(output_error)?;
            stdout.flush().await.map_err(output_error)?;
        }
    }
    Ok(())
}
