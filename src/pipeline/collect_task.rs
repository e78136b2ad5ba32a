use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::task::JoinSet;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::core::client::retry::RetryPolicy;
use crate::core::client::{fetch_costs, CostAdapter};
use crate::domain::common::model::{FetchWindow, Provider, ResourceCostRecord};
use crate::domain::normalize::service::NormalizedBatch;
use crate::domain::report::dto::ProviderCompleteness;

/// One provider's contribution: its status and the records it normalized.
#[derive(Debug)]
pub struct ProviderBatch {
    pub completeness: ProviderCompleteness,
    pub records: Vec<ResourceCostRecord>,
}

/// Fetches and normalizes every record of one provider. Never fails: fetch
/// errors become a `Partial` or `Absent` status.
pub async fn collect_provider(adapter: Arc<dyn CostAdapter>, window: FetchWindow, policy: RetryPolicy) -> ProviderBatch {
    let provider = adapter.provider();
    let mut batch = NormalizedBatch::default();
    let mut failure = None;

    let mut stream = fetch_costs(adapter, window, policy);
    while let Some(item) = stream.next().await {
        match item {
            Ok(raw) => batch.push_raw(&raw, provider),
            Err(e) => {
                error!(%provider, kind = e.kind(), error = %e, "Provider fetch failed");
                failure = Some(e);
                break;
            }
        }
    }

    let completeness = match failure {
        Some(e) if batch.records.is_empty() => ProviderCompleteness::absent(provider, e.to_string()),
        Some(e) => ProviderCompleteness::partial(provider, batch.records.len(), batch.skipped, e.to_string()),
        None if batch.all_rejected() => ProviderCompleteness::absent(
            provider,
            format!("all {} records failed normalization", batch.skipped),
        ),
        None => ProviderCompleteness::complete(provider, batch.records.len(), batch.skipped),
    };

    info!(
        %provider,
        status = completeness.status.as_str(),
        records = completeness.records,
        skipped = completeness.skipped,
        "Provider collection finished"
    );

    ProviderBatch {
        completeness,
        records: batch.records,
    }
}

/// Runs one task per adapter until all finish or `timeout` passes. Providers
/// that never report are `Absent`. Results are in provider order.
pub async fn collect_all(
    adapters: Vec<Arc<dyn CostAdapter>>,
    window: FetchWindow,
    policy: RetryPolicy,
    timeout: Duration,
) -> Vec<ProviderBatch> {
    let expected: Vec<Provider> = adapters.iter().map(|a| a.provider()).collect();

    let mut set = JoinSet::new();
    for adapter in adapters {
        let span = info_span!("provider", provider = %adapter.provider());
        set.spawn(collect_provider(adapter, window, policy.clone()).instrument(span));
    }

    let deadline = Instant::now() + timeout;
    let mut batches: Vec<ProviderBatch> = Vec::with_capacity(expected.len());
    let mut timed_out = false;

    loop {
        match timeout_at(deadline, set.join_next()).await {
            Ok(Some(Ok(batch))) => batches.push(batch),
            Ok(Some(Err(e))) => error!(error = %e, "Provider task did not complete"),
            Ok(None) => break,
            Err(_) => {
                warn!(?timeout, remaining = set.len(), "Run timeout reached; aborting providers");
                set.abort_all();
                timed_out = true;
                break;
            }
        }
    }

    for provider in expected {
        if !batches.iter().any(|b| b.completeness.provider == provider) {
            let reason = if timed_out { "timed out" } else { "collection task failed" };
            debug!(%provider, reason, "Marking provider absent");
            batches.push(ProviderBatch {
                completeness: ProviderCompleteness::absent(provider, reason),
                records: Vec::new(),
            });
        }
    }

    batches.sort_by_key(|b| b.completeness.provider);
    batches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::client::synthetic::SyntheticAdapter;
    use crate::core::client::Page;
    use crate::domain::common::model::RawRecord;
    use crate::domain::report::dto::CompletenessStatus;
    use crate::errors::FetchError;
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use std::sync::atomic::{AtomicBool, Ordering};

    fn window() -> FetchWindow {
        FetchWindow::new(
            Utc.with_ymd_and_hms(2026, 9, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 9, 15, 0, 0, 0).unwrap(),
        )
        .unwrap()
    }

    /// Serves one synthetic page, then fails.
    struct FailsAfterFirstPage {
        inner: SyntheticAdapter,
        served: AtomicBool,
    }

    #[async_trait]
    impl CostAdapter for FailsAfterFirstPage {
        fn provider(&self) -> Provider {
            self.inner.provider()
        }

        async fn fetch_page(&self, window: &FetchWindow, cursor: Option<&str>) -> Result<Page, FetchError> {
            if self.served.swap(true, Ordering::SeqCst) {
                return Err(FetchError::Schema("HTTP 400: bad page token".into()));
            }
            self.inner.fetch_page(window, cursor).await
        }

        fn usage_start(&self, raw: &RawRecord) -> Option<DateTime<Utc>> {
            self.inner.usage_start(raw)
        }
    }

    /// Never answers.
    struct Hangs(Provider);

    #[async_trait]
    impl CostAdapter for Hangs {
        fn provider(&self) -> Provider {
            self.0
        }

        async fn fetch_page(&self, _window: &FetchWindow, _cursor: Option<&str>) -> Result<Page, FetchError> {
            futures::future::pending().await
        }

        fn usage_start(&self, _raw: &RawRecord) -> Option<DateTime<Utc>> {
            None
        }
    }

    #[tokio::test]
    async fn failure_after_a_page_is_partial() {
        let adapter = Arc::new(FailsAfterFirstPage {
            inner: SyntheticAdapter::new(Provider::Azure, 42, 30, 10),
            served: AtomicBool::new(false),
        });

        let batch = collect_provider(adapter, window(), RetryPolicy::default()).await;

        assert_eq!(batch.completeness.status, CompletenessStatus::Partial);
        assert_eq!(batch.records.len(), 10);
        assert!(batch.completeness.reason.unwrap().contains("bad page token"));
    }

    #[tokio::test]
    async fn timeout_marks_slow_providers_absent() {
        let adapters: Vec<Arc<dyn CostAdapter>> = vec![
            Arc::new(Hangs(Provider::Gcp)),
            Arc::new(SyntheticAdapter::new(Provider::Aws, 1, 12, 5)),
        ];

        let batches = collect_all(adapters, window(), RetryPolicy::default(), Duration::from_millis(200)).await;

        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].completeness.provider, Provider::Aws);
        assert_eq!(batches[0].completeness.status, CompletenessStatus::Complete);
        assert_eq!(batches[0].records.len(), 12);
        assert_eq!(batches[1].completeness.provider, Provider::Gcp);
        assert_eq!(batches[1].completeness.status, CompletenessStatus::Absent);
        assert_eq!(batches[1].completeness.reason.as_deref(), Some("timed out"));
    }
}
