use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::core::client::http_client::{classify_transport_error, read_json, require_bearer};
use crate::core::client::{CostAdapter, Page};
use crate::core::persistence::config::report_config_entity::GcpProviderConfig;
use crate::core::persistence::credentials::CredentialHandle;
use crate::domain::common::model::{FetchWindow, Provider, RawRecord};
use crate::domain::normalize::service::usage_start;
use crate::errors::FetchError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CostsResponse {
    #[serde(default)]
    rows: Vec<RawRecord>,
    next_page_token: Option<String>,
}

/// Billing export rows for one billing account.
pub struct GcpCostAdapter {
    config: GcpProviderConfig,
    client: Client,
    credential: Option<CredentialHandle>,
}

impl GcpCostAdapter {
    pub fn new(config: GcpProviderConfig, client: Client, credential: Option<CredentialHandle>) -> Self {
        Self {
            config,
            client,
            credential,
        }
    }

    fn url(&self) -> String {
        format!(
            "{}/v1/billingAccounts/{}/costs",
            self.config.endpoint.trim_end_matches('/'),
            urlencoding::encode(&self.config.billing_account_id)
        )
    }
}

#[async_trait]
impl CostAdapter for GcpCostAdapter {
    fn provider(&self) -> Provider {
        Provider::Gcp
    }

    async fn fetch_page(&self, window: &FetchWindow, cursor: Option<&str>) -> Result<Page, FetchError> {
        let token = require_bearer(self.credential.as_ref(), Provider::Gcp)?;

        let mut query = vec![
            ("startTime", window.start.to_rfc3339_opts(SecondsFormat::Secs, true)),
            ("endTime", window.end.to_rfc3339_opts(SecondsFormat::Secs, true)),
            ("pageSize", self.config.page_size.to_string()),
        ];
        if let Some(c) = cursor {
            query.push(("pageToken", c.to_string()));
        }

        let url = self.url();
        debug!(%url, cursor = ?cursor, "Requesting GCP cost page");

        let resp = self
            .client
            .get(&url)
            .query(&query)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| classify_transport_error(&e))?;

        let page: CostsResponse = read_json(resp).await?;
        Ok(Page {
            records: page.rows,
            next_cursor: page.next_page_token,
        })
    }

    fn usage_start(&self, raw: &RawRecord) -> Option<DateTime<Utc>> {
        usage_start(raw, Provider::Gcp)
    }
}
