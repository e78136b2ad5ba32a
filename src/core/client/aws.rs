use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::client::http_client::{classify_transport_error, read_json, require_bearer};
use crate::core::client::{CostAdapter, Page};
use crate::core::persistence::config::report_config_entity::AwsProviderConfig;
use crate::core::persistence::credentials::CredentialHandle;
use crate::domain::common::model::{FetchWindow, Provider, RawRecord};
use crate::domain::normalize::service::usage_start;
use crate::errors::FetchError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct CostAndUsageRequest<'a> {
    time_period: TimePeriod,
    next_page_token: Option<&'a str>,
    max_results: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    linked_account: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct TimePeriod {
    start: String,
    end: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CostAndUsageResponse {
    #[serde(default)]
    line_items: Vec<RawRecord>,
    next_page_token: Option<String>,
}

/// Cost and Usage line items from a CUR-style billing endpoint.
pub struct AwsCostAdapter {
    config: AwsProviderConfig,
    client: Client,
    credential: Option<CredentialHandle>,
}

impl AwsCostAdapter {
    pub fn new(config: AwsProviderConfig, client: Client, credential: Option<CredentialHandle>) -> Self {
        Self {
            config,
            client,
            credential,
        }
    }

    fn url(&self) -> String {
        format!("{}/cost-and-usage", self.config.endpoint.trim_end_matches('/'))
    }
}

#[async_trait]
impl CostAdapter for AwsCostAdapter {
    fn provider(&self) -> Provider {
        Provider::Aws
    }

    async fn fetch_page(&self, window: &FetchWindow, cursor: Option<&str>) -> Result<Page, FetchError> {
        let token = require_bearer(self.credential.as_ref(), Provider::Aws)?;

        let body = CostAndUsageRequest {
            time_period: TimePeriod {
                start: window.start.to_rfc3339_opts(SecondsFormat::Secs, true),
                end: window.end.to_rfc3339_opts(SecondsFormat::Secs, true),
            },
            next_page_token: cursor,
            max_results: self.config.page_size,
            linked_account: self.config.account_id.as_deref(),
        };

        let url = self.url();
        debug!(%url, cursor = ?cursor, "Requesting AWS cost page");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport_error(&e))?;

        let page: CostAndUsageResponse = read_json(resp).await?;
        Ok(Page {
            records: page.line_items,
            next_cursor: page.next_page_token,
        })
    }

    fn usage_start(&self, raw: &RawRecord) -> Option<DateTime<Utc>> {
        usage_start(raw, Provider::Aws)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::client::fetch_costs;
    use crate::core::client::retry::RetryPolicy;
    use crate::core::persistence::credentials::CredentialSource;
    use chrono::TimeZone;
    use futures::TryStreamExt;
    use mockito::Matcher;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn window() -> FetchWindow {
        FetchWindow::new(
            Utc.with_ymd_and_hms(2026, 9, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 10, 1, 0, 0, 0).unwrap(),
        )
        .unwrap()
    }

    fn adapter(endpoint: String, token: Option<&str>) -> Arc<AwsCostAdapter> {
        let config = AwsProviderConfig {
            endpoint,
            account_id: None,
            credentials: CredentialSource::default(),
            page_size: 2,
        };
        Arc::new(AwsCostAdapter::new(
            config,
            Client::new(),
            token.map(|t| CredentialHandle::new(Provider::Aws, t)),
        ))
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_rate_limit_retries: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            transient_step: Duration::from_millis(1),
            ..RetryPolicy::default()
        }
    }

    fn line_item(day: u32, cost: &str) -> serde_json::Value {
        json!({
            "lineItem/UsageAccountId": "111122223333",
            "product/ProductName": "Amazon Simple Storage Service",
            "lineItem/UnblendedCost": cost,
            "lineItem/CurrencyCode": "USD",
            "lineItem/UsageStartDate": format!("2026-09-{:02}T00:00:00Z", day),
            "lineItem/UsageEndDate": format!("2026-09-{:02}T01:00:00Z", day),
        })
    }

    #[tokio::test]
    async fn follows_next_page_token() {
        let mut server = mockito::Server::new_async().await;

        let first = server
            .mock("POST", "/cost-and-usage")
            .match_header("authorization", "Bearer aws-token-1234")
            .match_body(Matcher::PartialJson(json!({
                "TimePeriod": { "Start": "2026-09-01T00:00:00Z", "End": "2026-10-01T00:00:00Z" },
                "NextPageToken": null,
                "MaxResults": 2
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "LineItems": [line_item(1, "1.50"), line_item(2, "2.50")],
                    "NextPageToken": "page-2"
                })
                .to_string(),
            )
            .expect(1)
            .create_async()
            .await;

        let second = server
            .mock("POST", "/cost-and-usage")
            .match_body(Matcher::PartialJson(json!({ "NextPageToken": "page-2" })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({ "LineItems": [line_item(3, "3.00")] }).to_string())
            .expect(1)
            .create_async()
            .await;

        let records: Vec<RawRecord> =
            fetch_costs(adapter(server.url(), Some("aws-token-1234")), window(), fast_policy())
                .try_collect()
                .await
                .unwrap();

        assert_eq!(records.len(), 3);
        first.assert_async().await;
        second.assert_async().await;
    }

    #[tokio::test]
    async fn unauthorized_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/cost-and-usage")
            .with_status(401)
            .with_body("expired token")
            .expect(1)
            .create_async()
            .await;

        let result: Result<Vec<RawRecord>, FetchError> =
            fetch_costs(adapter(server.url(), Some("aws-token-1234")), window(), fast_policy())
                .try_collect()
                .await;

        assert!(matches!(result, Err(FetchError::Auth(_))));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn rate_limit_is_retried_then_surfaces() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/cost-and-usage")
            .with_status(429)
            .with_body("Throttling")
            .expect(3)
            .create_async()
            .await;

        let result: Result<Vec<RawRecord>, FetchError> =
            fetch_costs(adapter(server.url(), Some("aws-token-1234")), window(), fast_policy())
                .try_collect()
                .await;

        assert!(matches!(result, Err(FetchError::RateLimit { .. })));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn missing_credential_fails_without_request() {
        let server = mockito::Server::new_async().await;
        let err = adapter(server.url(), None)
            .fetch_page(&window(), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "auth");
    }

    #[tokio::test]
    async fn malformed_body_is_schema_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/cost-and-usage")
            .with_status(200)
            .with_body("{\"LineItems\": 42}")
            .create_async()
            .await;

        let err = adapter(server.url(), Some("aws-token-1234"))
            .fetch_page(&window(), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "schema");
    }
}
