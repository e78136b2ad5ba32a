use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tracing::debug;
use uuid::Uuid;

use crate::core::client::http_client::build_http_client;
use crate::core::client::retry::RetryPolicy;
use crate::core::persistence::config::ReportConfigEntity;
use crate::core::persistence::credentials::CredentialStore;
use crate::domain::aggregate::model::Dimension;
use crate::domain::common::model::FetchWindow;
use crate::errors::RunError;

/// Per-run context handed to adapter construction and the pipeline.
#[derive(Clone)]
pub struct AppState {
    pub run_id: Uuid,
    pub config: Arc<ReportConfigEntity>,
    pub http: Client,
    pub credentials: Arc<CredentialStore>,
    pub retry_policy: RetryPolicy,
    pub window: FetchWindow,
    pub group_by: Vec<Dimension>,
}

pub fn build_app_state(config: ReportConfigEntity) -> Result<AppState, RunError> {
    let window = config
        .fetch_window()
        .map_err(|e| RunError::Config(e.to_string()))?;
    let group_by = config.dimensions()?;

    let http = build_http_client(Duration::from_secs(config.request_timeout_secs))
        .map_err(|e| RunError::Config(format!("{:#}", e)))?;

    let credentials = CredentialStore::resolve(
        config
            .providers
            .iter()
            .filter_map(|p| p.credentials().map(|source| (p.provider(), source))),
    );

    let state = AppState {
        run_id: Uuid::new_v4(),
        retry_policy: config.retry_policy(),
        config: Arc::new(config),
        http,
        credentials: Arc::new(credentials),
        window,
        group_by,
    };

    debug!(run_id = %state.run_id, providers = state.config.providers.len(), "App state built");
    Ok(state)
}
