use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use validator::{Validate, ValidationError, ValidationErrors};

use crate::core::client::retry::RetryPolicy;
use crate::core::client::synthetic::SyntheticAttributes;
use crate::core::persistence::credentials::CredentialSource;
use crate::domain::aggregate::model::Dimension;
use crate::domain::common::model::{FetchWindow, Provider};

/// Report run configuration, loaded from YAML.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_report_config"))]
pub struct ReportConfigEntity {
    pub window: WindowConfig,

    /// Providers to collect from; one entry per provider.
    #[validate(length(min = 1))]
    pub providers: Vec<ProviderConfig>,

    /// Grouping dimensions in order, e.g. `[provider, service, month]`.
    #[serde(default = "default_group_by")]
    pub group_by: Vec<String>,

    /// Template name (`table`, `narrative`, `html` or one from `template_dir`).
    #[serde(default = "default_template")]
    #[validate(length(min = 1))]
    pub template: String,

    /// Directory of extra templates, loaded alongside the built-ins.
    pub template_dir: Option<PathBuf>,

    /// Output file; stdout when absent.
    pub output: Option<PathBuf>,

    /// JSON export of the aggregated view.
    pub raw_export: Option<PathBuf>,

    /// Fail the run unless every provider returns complete data.
    #[serde(default)]
    pub strict: bool,

    /// Run-level timeout covering all provider fetches.
    #[serde(default = "default_timeout_secs")]
    #[validate(range(min = 1, max = 86_400))]
    pub timeout_secs: u64,

    /// Per-request HTTP timeout.
    #[serde(default = "default_request_timeout_secs")]
    #[validate(range(min = 1, max = 3_600))]
    pub request_timeout_secs: u64,

    #[serde(default)]
    #[validate(nested)]
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowConfig {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct RetryConfig {
    #[serde(default = "default_rate_limit_retries")]
    #[validate(range(max = 20))]
    pub max_rate_limit_retries: u32,

    #[serde(default = "default_transient_retries")]
    #[validate(range(max = 20))]
    pub max_transient_retries: u32,

    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "base_delay_ms", default = "default_base_delay")]
    pub base_delay: Duration,

    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "max_delay_ms", default = "default_max_delay")]
    pub max_delay: Duration,

    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "transient_step_ms", default = "default_transient_step")]
    pub transient_step: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_rate_limit_retries: policy.max_rate_limit_retries,
            max_transient_retries: policy.max_transient_retries,
            base_delay: policy.base_delay,
            max_delay: policy.max_delay,
            transient_step: policy.transient_step,
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(c: &RetryConfig) -> Self {
        RetryPolicy {
            max_rate_limit_retries: c.max_rate_limit_retries,
            max_transient_retries: c.max_transient_retries,
            base_delay: c.base_delay,
            max_delay: c.max_delay,
            transient_step: c.transient_step,
        }
    }
}

/// Tagged union of provider settings; `type` selects the adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProviderConfig {
    Aws(AwsProviderConfig),
    Azure(AzureProviderConfig),
    Gcp(GcpProviderConfig),
    Synthetic(SyntheticProviderConfig),
}

impl ProviderConfig {
    pub fn provider(&self) -> Provider {
        match self {
            ProviderConfig::Aws(_) => Provider::Aws,
            ProviderConfig::Azure(_) => Provider::Azure,
            ProviderConfig::Gcp(_) => Provider::Gcp,
            ProviderConfig::Synthetic(c) => c.provider,
        }
    }

    pub fn credentials(&self) -> Option<&CredentialSource> {
        match self {
            ProviderConfig::Aws(c) => Some(&c.credentials),
            ProviderConfig::Azure(c) => Some(&c.credentials),
            ProviderConfig::Gcp(c) => Some(&c.credentials),
            ProviderConfig::Synthetic(_) => None,
        }
    }
}

impl Validate for ProviderConfig {
    fn validate(&self) -> Result<(), ValidationErrors> {
        match self {
            ProviderConfig::Aws(c) => c.validate(),
            ProviderConfig::Azure(c) => c.validate(),
            ProviderConfig::Gcp(c) => c.validate(),
            ProviderConfig::Synthetic(c) => c.validate(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct AwsProviderConfig {
    /// Billing API base URL.
    #[validate(url)]
    pub endpoint: String,

    /// Restrict to one linked account.
    pub account_id: Option<String>,

    #[serde(flatten)]
    pub credentials: CredentialSource,

    #[serde(default = "default_page_size")]
    #[validate(range(min = 1, max = 10_000))]
    pub page_size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct AzureProviderConfig {
    #[serde(default = "default_azure_endpoint")]
    #[validate(url)]
    pub endpoint: String,

    #[validate(length(min = 1))]
    pub subscription_id: String,

    #[serde(flatten)]
    pub credentials: CredentialSource,

    #[serde(default = "default_page_size")]
    #[validate(range(min = 1, max = 10_000))]
    pub page_size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct GcpProviderConfig {
    #[serde(default = "default_gcp_endpoint")]
    #[validate(url)]
    pub endpoint: String,

    #[validate(length(min = 1))]
    pub billing_account_id: String,

    #[serde(flatten)]
    pub credentials: CredentialSource,

    #[serde(default = "default_page_size")]
    #[validate(range(min = 1, max = 10_000))]
    pub page_size: u32,
}

/// Generated records in the native shape of `provider`; no network access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct SyntheticProviderConfig {
    pub provider: Provider,

    #[serde(default = "default_seed")]
    pub seed: u64,

    #[serde(default = "default_synthetic_rows")]
    #[validate(range(max = 1_000_000))]
    pub rows: usize,

    #[serde(default = "default_page_size")]
    #[validate(range(min = 1, max = 10_000))]
    pub page_size: u32,

    /// Values pinned onto every generated row.
    #[serde(default)]
    pub attributes: Option<SyntheticAttributes>,
}

impl ReportConfigEntity {
    pub fn fetch_window(&self) -> anyhow::Result<FetchWindow> {
        FetchWindow::new(self.window.start, self.window.end)
    }

    pub fn dimensions(&self) -> Result<Vec<Dimension>, crate::errors::AggregateError> {
        Dimension::parse_list(&self.group_by)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from(&self.retry)
    }
}

fn validate_report_config(cfg: &ReportConfigEntity) -> Result<(), ValidationError> {
    if cfg.window.start >= cfg.window.end {
        return Err(ValidationError::new("window_start_after_end"));
    }

    if Dimension::parse_list(&cfg.group_by).is_err() {
        return Err(ValidationError::new("unknown_group_by_dimension"));
    }

    let mut seen = Vec::new();
    for p in &cfg.providers {
        if seen.contains(&p.provider()) {
            return Err(ValidationError::new("duplicate_provider"));
        }
        seen.push(p.provider());

        if let Err(errors) = p.validate() {
            let mut err = ValidationError::new("invalid_provider");
            err.message = Some(format!("{}: {}", p.provider(), errors).into());
            return Err(err);
        }
    }

    Ok(())
}

fn default_group_by() -> Vec<String> {
    vec!["provider".into(), "service".into()]
}

fn default_template() -> String {
    "table".into()
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_rate_limit_retries() -> u32 {
    RetryPolicy::default().max_rate_limit_retries
}

fn default_transient_retries() -> u32 {
    RetryPolicy::default().max_transient_retries
}

fn default_base_delay() -> Duration {
    RetryPolicy::default().base_delay
}

fn default_max_delay() -> Duration {
    RetryPolicy::default().max_delay
}

fn default_transient_step() -> Duration {
    RetryPolicy::default().transient_step
}

fn default_page_size() -> u32 {
    500
}

fn default_azure_endpoint() -> String {
    "https://management.azure.com".into()
}

fn default_gcp_endpoint() -> String {
    "https://cloudbilling.googleapis.com".into()
}

fn default_seed() -> u64 {
    42
}

fn default_synthetic_rows() -> usize {
    100
}
