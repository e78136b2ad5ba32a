//! Serializable shapes handed to templates and to the raw JSON export.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core::util::cost_util::CostUtil;
use crate::domain::aggregate::model::AggregatedView;
use crate::domain::common::model::Provider;
use crate::errors::AggregateError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletenessStatus {
    Complete,
    /// Fetch failed after some records were delivered; those are kept.
    Partial,
    Absent,
}

impl CompletenessStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompletenessStatus::Complete => "complete",
            CompletenessStatus::Partial => "partial",
            CompletenessStatus::Absent => "absent",
        }
    }
}

/// What one provider contributed to a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCompleteness {
    pub provider: Provider,
    pub status: CompletenessStatus,
    pub records: usize,
    /// Records dropped by normalization; these do not degrade the status.
    pub skipped: usize,
    pub reason: Option<String>,
}

impl ProviderCompleteness {
    pub fn complete(provider: Provider, records: usize, skipped: usize) -> Self {
        Self {
            provider,
            status: CompletenessStatus::Complete,
            records,
            skipped,
            reason: None,
        }
    }

    pub fn partial(provider: Provider, records: usize, skipped: usize, reason: impl Into<String>) -> Self {
        Self {
            provider,
            status: CompletenessStatus::Partial,
            records,
            skipped,
            reason: Some(reason.into()),
        }
    }

    pub fn absent(provider: Provider, reason: impl Into<String>) -> Self {
        Self {
            provider,
            status: CompletenessStatus::Absent,
            records: 0,
            skipped: 0,
            reason: Some(reason.into()),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.status != CompletenessStatus::Complete
    }

    pub fn warning(&self) -> Option<String> {
        let reason = self.reason.as_deref().unwrap_or("unknown error");
        match self.status {
            CompletenessStatus::Complete => None,
            CompletenessStatus::Partial => Some(format!(
                "{} data is partial ({} records before failure): {}",
                self.provider, self.records, reason
            )),
            CompletenessStatus::Absent => Some(format!("{} data is missing: {}", self.provider, reason)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewRow {
    /// e.g. `AWS/S3/USD`
    pub label: String,
    /// Dimension values in `group_by` order.
    pub values: Vec<String>,
    pub currency: String,
    pub amount: Decimal,
    pub amount_display: String,
    pub record_count: u64,
    /// Percent of the currency total, one decimal.
    pub share: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyTotalDto {
    pub currency: String,
    pub amount: Decimal,
    pub amount_display: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderStatusDto {
    pub provider: String,
    pub status: CompletenessStatus,
    pub records: usize,
    pub skipped: usize,
    pub reason: Option<String>,
}

impl From<&ProviderCompleteness> for ProviderStatusDto {
    fn from(c: &ProviderCompleteness) -> Self {
        Self {
            provider: c.provider.as_code().to_string(),
            status: c.status,
            records: c.records,
            skipped: c.skipped,
            reason: c.reason.clone(),
        }
    }
}

/// Everything a template can reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportContextDto {
    pub group_by: Vec<String>,
    pub rows: Vec<ViewRow>,
    pub totals: Vec<CurrencyTotalDto>,
    pub providers: Vec<ProviderStatusDto>,
    pub warnings: Vec<String>,
    pub degraded: bool,
    pub record_count: u64,
}

impl ReportContextDto {
    pub fn build(view: &AggregatedView, completeness: &[ProviderCompleteness]) -> Result<Self, AggregateError> {
        let totals = view.totals_by_currency()?;
        let rows = view_rows(view, &totals);

        let mut sorted: Vec<&ProviderCompleteness> = completeness.iter().collect();
        sorted.sort_by_key(|c| c.provider);

        Ok(Self {
            group_by: view.group_by().iter().map(|d| d.name()).collect(),
            rows,
            totals: totals
                .into_iter()
                .map(|(currency, amount)| CurrencyTotalDto {
                    currency,
                    amount_display: CostUtil::display_amount(amount),
                    amount,
                })
                .collect(),
            providers: sorted.iter().map(|c| ProviderStatusDto::from(*c)).collect(),
            warnings: sorted.iter().filter_map(|c| c.warning()).collect(),
            degraded: sorted.iter().any(|c| c.is_degraded()),
            record_count: view.record_count(),
        })
    }
}

fn view_rows(view: &AggregatedView, totals: &BTreeMap<String, Decimal>) -> Vec<ViewRow> {
    view.iter()
        .map(|(key, bucket)| {
            let total = totals.get(&key.currency).copied().unwrap_or(Decimal::ZERO);
            ViewRow {
                label: key.label(),
                values: key.values.iter().map(|(_, v)| v.clone()).collect(),
                currency: key.currency.clone(),
                amount: bucket.amount,
                amount_display: CostUtil::display_amount(bucket.amount),
                record_count: bucket.record_count,
                share: CostUtil::share_percent(bucket.amount, total),
            }
        })
        .collect()
}

/// JSON export of an aggregated view, written next to (or instead of) the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawViewExport {
    pub group_by: Vec<String>,
    pub rows: Vec<ViewRow>,
    pub providers: Vec<ProviderStatusDto>,
}

impl From<&ReportContextDto> for RawViewExport {
    fn from(ctx: &ReportContextDto) -> Self {
        Self {
            group_by: ctx.group_by.clone(),
            rows: ctx.rows.clone(),
            providers: ctx.providers.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregate::model::Dimension;
    use crate::domain::aggregate::service::aggregate;
    use crate::domain::common::model::ResourceCostRecord;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn record(provider: Provider, amount: Decimal) -> ResourceCostRecord {
        let start = Utc.with_ymd_and_hms(2026, 9, 1, 0, 0, 0).unwrap();
        ResourceCostRecord {
            provider,
            account_id: "a".into(),
            service_name: "svc".into(),
            resource_id: None,
            amount,
            currency: "USD".into(),
            period_start: start,
            period_end: start,
            tags: Default::default(),
            is_credit: false,
        }
    }

    #[test]
    fn rows_carry_share_of_currency_total() {
        let view = aggregate(
            &[record(Provider::Aws, dec!(15)), record(Provider::Azure, dec!(5))],
            &[Dimension::Provider],
        )
        .unwrap();

        let ctx = ReportContextDto::build(&view, &[]).unwrap();

        assert_eq!(ctx.group_by, vec!["provider"]);
        assert_eq!(ctx.rows[0].label, "AWS/USD");
        assert_eq!(ctx.rows[0].share, dec!(75));
        assert_eq!(ctx.rows[1].amount_display, "5.00");
        assert_eq!(ctx.totals[0].amount, dec!(20));
        assert!(!ctx.degraded);
    }

    #[test]
    fn providers_sorted_and_warnings_name_degraded_ones() {
        let view = AggregatedView::new(vec![Dimension::Provider]);
        let completeness = vec![
            ProviderCompleteness::absent(Provider::Gcp, "rate limit exhausted"),
            ProviderCompleteness::complete(Provider::Aws, 10, 1),
            ProviderCompleteness::partial(Provider::Azure, 4, 0, "connection reset"),
        ];

        let ctx = ReportContextDto::build(&view, &completeness).unwrap();

        let order: Vec<&str> = ctx.providers.iter().map(|p| p.provider.as_str()).collect();
        assert_eq!(order, vec!["AWS", "Azure", "GCP"]);
        assert!(ctx.degraded);
        assert_eq!(ctx.warnings.len(), 2);
        assert!(ctx.warnings[0].starts_with("Azure data is partial"));
        assert!(ctx.warnings[1].contains("GCP data is missing: rate limit exhausted"));
    }
}
