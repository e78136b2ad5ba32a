//! Provider billing clients and the shared paginator.

pub mod aws;
pub mod azure;
pub mod gcp;
pub mod http_client;
pub mod retry;
pub mod synthetic;

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use tracing::debug;

use crate::app_state::AppState;
use crate::core::persistence::config::ProviderConfig;
use crate::domain::common::model::{FetchWindow, Provider, RawRecord};
use crate::errors::FetchError;

use self::aws::AwsCostAdapter;
use self::azure::AzureCostAdapter;
use self::gcp::GcpCostAdapter;
use self::retry::{run_with_retry, RetryPolicy};
use self::synthetic::SyntheticAdapter;

/// One page of raw records plus the cursor of the next page, if any.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub records: Vec<RawRecord>,
    pub next_cursor: Option<String>,
}

/// A provider billing API, one page at a time.
#[async_trait]
pub trait CostAdapter: Send + Sync {
    fn provider(&self) -> Provider;

    /// Fetches the page at `cursor`; `None` is the first page.
    async fn fetch_page(&self, window: &FetchWindow, cursor: Option<&str>) -> Result<Page, FetchError>;

    /// Usage start of a raw record, used to drop rows outside the window.
    fn usage_start(&self, raw: &RawRecord) -> Option<DateTime<Utc>>;
}

struct PageCursor {
    cursor: Option<String>,
    page: u32,
    seen: HashSet<String>,
}

/// Lazy stream over every record `adapter` has for `window`.
///
/// Each page is retried under `policy`; a page that still fails ends the stream
/// with that error after all earlier records were yielded. Calling again starts
/// over from the first page.
pub fn fetch_costs(
    adapter: Arc<dyn CostAdapter>,
    window: FetchWindow,
    policy: RetryPolicy,
) -> BoxStream<'static, Result<RawRecord, FetchError>> {
    let start = Some(PageCursor {
        cursor: None,
        page: 1,
        seen: HashSet::new(),
    });

    stream::try_unfold(start, move |state| {
        let adapter = adapter.clone();
        let policy = policy.clone();
        async move {
            let Some(PageCursor { cursor, page, mut seen }) = state else {
                return Ok(None);
            };

            let provider = adapter.provider();
            let label = format!("{} page {}", provider, page);
            let fetched = run_with_retry(&policy, &label, || {
                adapter.fetch_page(&window, cursor.as_deref())
            })
            .await?;

            let received = fetched.records.len();
            let records: Vec<RawRecord> = fetched
                .records
                .into_iter()
                .filter(|raw| match adapter.usage_start(raw) {
                    Some(ts) => window.contains(ts),
                    None => true,
                })
                .collect();

            if records.len() < received {
                debug!(
                    %provider,
                    page,
                    dropped = received - records.len(),
                    "Dropped records outside the fetch window"
                );
            }
            debug!(%provider, page, records = records.len(), "Fetched page");

            let next = match fetched.next_cursor.filter(|c| !c.is_empty()) {
                Some(c) => {
                    if !seen.insert(c.clone()) {
                        return Err(FetchError::Schema(format!(
                            "repeated page cursor '{}' after page {}",
                            c, page
                        )));
                    }
                    Some(PageCursor {
                        cursor: Some(c),
                        page: page + 1,
                        seen,
                    })
                }
                None => None,
            };

            Ok::<_, FetchError>(Some((records, next)))
        }
    })
    .map_ok(|records| stream::iter(records.into_iter().map(Ok)))
    .try_flatten()
    .boxed()
}

/// Dispatches a provider config entry to its adapter.
pub fn build_adapter(config: &ProviderConfig, state: &AppState) -> Arc<dyn CostAdapter> {
    match config {
        ProviderConfig::Aws(c) => Arc::new(AwsCostAdapter::new(
            c.clone(),
            state.http.clone(),
            state.credentials.get(Provider::Aws).cloned(),
        )),
        ProviderConfig::Azure(c) => Arc::new(AzureCostAdapter::new(
            c.clone(),
            state.http.clone(),
            state.credentials.get(Provider::Azure).cloned(),
        )),
        ProviderConfig::Gcp(c) => Arc::new(GcpCostAdapter::new(
            c.clone(),
            state.http.clone(),
            state.credentials.get(Provider::Gcp).cloned(),
        )),
        ProviderConfig::Synthetic(c) => Arc::new(
            SyntheticAdapter::new(c.provider, c.seed, c.rows, c.page_size as usize)
                .with_attributes(c.attributes.clone()),
        ),
    }
}
