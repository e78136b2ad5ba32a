use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::core::client::http_client::{classify_transport_error, read_json, require_bearer};
use crate::core::client::{CostAdapter, Page};
use crate::core::persistence::config::report_config_entity::AzureProviderConfig;
use crate::core::persistence::credentials::CredentialHandle;
use crate::domain::common::model::{FetchWindow, Provider, RawRecord};
use crate::domain::normalize::service::usage_start;
use crate::errors::FetchError;

const API_VERSION: &str = "2019-11-01";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageDetailsResponse {
    #[serde(default)]
    value: Vec<RawRecord>,
    next_link: Option<String>,
}

/// Usage details from the Cost Management API; later pages follow `nextLink`.
pub struct AzureCostAdapter {
    config: AzureProviderConfig,
    client: Client,
    credential: Option<CredentialHandle>,
}

impl AzureCostAdapter {
    pub fn new(config: AzureProviderConfig, client: Client, credential: Option<CredentialHandle>) -> Self {
        Self {
            config,
            client,
            credential,
        }
    }

    fn first_page_url(&self) -> String {
        format!(
            "{}/subscriptions/{}/providers/Microsoft.CostManagement/usageDetails",
            self.config.endpoint.trim_end_matches('/'),
            urlencoding::encode(&self.config.subscription_id)
        )
    }

    /// `nextLink` must stay on the configured endpoint's origin; the bearer token goes with it.
    fn checked_next_link(&self, next_link: &str) -> Result<Url, FetchError> {
        let endpoint = parse_url(&self.config.endpoint, "endpoint")?;
        let link = parse_url(next_link, "nextLink")?;
        if link.origin() != endpoint.origin() {
            return Err(FetchError::Schema(format!(
                "nextLink origin {} does not match endpoint origin {}",
                link.origin().ascii_serialization(),
                endpoint.origin().ascii_serialization()
            )));
        }
        Ok(link)
    }
}

fn parse_url(raw: &str, what: &str) -> Result<Url, FetchError> {
    Url::parse(raw).map_err(|e| FetchError::Schema(format!("invalid {} '{}': {}", what, raw, e)))
}

/// Rows may nest their columns under `properties`; lift them to the top level.
fn flatten_row(mut row: RawRecord) -> RawRecord {
    match row.remove("properties") {
        Some(Value::Object(props)) => {
            for (key, value) in props {
                row.entry(key).or_insert(value);
            }
            row
        }
        Some(other) => {
            row.insert("properties".into(), other);
            row
        }
        None => row,
    }
}

#[async_trait]
impl CostAdapter for AzureCostAdapter {
    fn provider(&self) -> Provider {
        Provider::Azure
    }

    async fn fetch_page(&self, window: &FetchWindow, cursor: Option<&str>) -> Result<Page, FetchError> {
        let token = require_bearer(self.credential.as_ref(), Provider::Azure)?;

        let request = match cursor {
            Some(next_link) => self.client.get(self.checked_next_link(next_link)?),
            None => {
                let start = window.start.format("%Y-%m-%d").to_string();
                let end = window.end.format("%Y-%m-%d").to_string();
                let top = self.config.page_size.to_string();
                self.client.get(self.first_page_url()).query(&[
                    ("api-version", API_VERSION),
                    ("startDate", start.as_str()),
                    ("endDate", end.as_str()),
                    ("$top", top.as_str()),
                ])
            }
        };
        debug!(subscription = %self.config.subscription_id, cursor = ?cursor, "Requesting Azure usage page");

        let resp = request
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| classify_transport_error(&e))?;

        let page: UsageDetailsResponse = read_json(resp).await?;
        Ok(Page {
            records: page.value.into_iter().map(flatten_row).collect(),
            next_cursor: page.next_link,
        })
    }

    fn usage_start(&self, raw: &RawRecord) -> Option<DateTime<Utc>> {
        usage_start(raw, Provider::Azure)
    }
}
