//! Single-pass grouping of canonical records into an `AggregatedView`.

use std::borrow::Borrow;

use futures::{Stream, StreamExt};
use tracing::debug;

use crate::domain::aggregate::model::{AggregatedView, AggregationKey, Dimension};
use crate::domain::common::model::ResourceCostRecord;
use crate::errors::AggregateError;

/// Incremental aggregator; memory grows with the number of groups, not records.
#[derive(Debug)]
pub struct Aggregator {
    view: AggregatedView,
}

impl Aggregator {
    pub fn new(group_by: &[Dimension]) -> Self {
        Self {
            view: AggregatedView::new(group_by.to_vec()),
        }
    }

    pub fn push(&mut self, record: &ResourceCostRecord) -> Result<(), AggregateError> {
        let key = AggregationKey::from_record(record, self.view.group_by());
        self.view.add(key, record.amount, 1)
    }

    pub fn finish(self) -> Result<AggregatedView, AggregateError> {
        self.view.check_currencies()?;
        debug!(
            groups = self.view.len(),
            records = self.view.record_count(),
            "Aggregation finished"
        );
        Ok(self.view)
    }
}

pub fn aggregate<I>(records: I, group_by: &[Dimension]) -> Result<AggregatedView, AggregateError>
where
    I: IntoIterator,
    I::Item: Borrow<ResourceCostRecord>,
{
    let mut aggregator = Aggregator::new(group_by);
    for record in records {
        aggregator.push(record.borrow())?;
    }
    aggregator.finish()
}

pub async fn aggregate_stream<S>(records: S, group_by: &[Dimension]) -> Result<AggregatedView, AggregateError>
where
    S: Stream<Item = ResourceCostRecord>,
{
    let mut aggregator = Aggregator::new(group_by);
    futures::pin_mut!(records);
    while let Some(record) = records.next().await {
        aggregator.push(&record)?;
    }
    aggregator.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::common::model::Provider;
    use chrono::{TimeZone, Utc};
    use rand::seq::SliceRandom;
    use rand::SeedableRng;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;

    fn record(provider: Provider, service: &str, amount: Decimal, currency: &str) -> ResourceCostRecord {
        let start = Utc.with_ymd_and_hms(2026, 9, 14, 0, 0, 0).unwrap();
        ResourceCostRecord {
            provider,
            account_id: "acct-1".into(),
            service_name: service.into(),
            resource_id: None,
            amount,
            currency: currency.into(),
            period_start: start,
            period_end: start + chrono::Duration::days(1),
            tags: BTreeMap::new(),
            is_credit: false,
        }
    }

    fn mixed_records() -> Vec<ResourceCostRecord> {
        let mut records = Vec::new();
        for i in 0..30u32 {
            let provider = Provider::ALL[(i % 3) as usize];
            let service = ["S3", "EC2", "Blob", "BigQuery"][(i % 4) as usize];
            let currency = ["USD", "EUR"][(i % 2) as usize];
            records.push(record(provider, service, Decimal::new(i as i64 * 137 + 5, 2), currency));
        }
        records.push(ResourceCostRecord {
            is_credit: true,
            ..record(Provider::Aws, "S3", dec!(-4.25), "USD")
        });
        records
    }

    #[test]
    fn groups_by_provider() {
        let records = vec![
            record(Provider::Aws, "S3", dec!(10.00), "USD"),
            record(Provider::Aws, "EC2", dec!(5.00), "USD"),
            record(Provider::Azure, "Blob", dec!(3.00), "USD"),
        ];

        let view = aggregate(&records, &[Dimension::Provider]).unwrap();

        assert_eq!(view.len(), 2);
        assert_eq!(view.get_by_label("AWS/USD").unwrap().amount, dec!(15.00));
        assert_eq!(view.get_by_label("AWS/USD").unwrap().record_count, 2);
        assert_eq!(view.get_by_label("Azure/USD").unwrap().amount, dec!(3.00));
    }

    #[test]
    fn totals_are_conserved_per_currency() {
        let records = mixed_records();
        let view = aggregate(&records, &[Dimension::Currency, Dimension::Service]).unwrap();

        let mut expected: BTreeMap<String, Decimal> = BTreeMap::new();
        for r in &records {
            *expected.entry(r.currency.clone()).or_default() += r.amount;
        }

        assert_eq!(view.totals_by_currency().unwrap(), expected);
        assert_eq!(view.record_count(), records.len() as u64);
    }

    #[test]
    fn arrival_order_does_not_matter() {
        let records = mixed_records();
        let dims = [Dimension::Provider, Dimension::Service, Dimension::Currency];
        let baseline = aggregate(&records, &dims).unwrap();

        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        for _ in 0..5 {
            let mut shuffled = records.clone();
            shuffled.shuffle(&mut rng);
            assert_eq!(aggregate(&shuffled, &dims).unwrap(), baseline);
        }
    }

    #[test]
    fn empty_input_gives_empty_view() {
        let view = aggregate(Vec::<ResourceCostRecord>::new(), &[Dimension::Provider]).unwrap();
        assert!(view.is_empty());
        assert!(view.totals_by_currency().unwrap().is_empty());
    }

    #[test]
    fn mixed_currency_without_currency_dimension_fails() {
        let records = vec![
            record(Provider::Aws, "S3", dec!(1.00), "USD"),
            record(Provider::Gcp, "S3", dec!(2.00), "EUR"),
        ];

        let err = aggregate(&records, &[Dimension::Service]).unwrap_err();
        assert_eq!(
            err,
            AggregateError::MixedCurrency {
                group: "S3".into(),
                first: "EUR".into(),
                second: "USD".into(),
            }
        );

        let view = aggregate(&records, &[Dimension::Service, Dimension::Currency]).unwrap();
        assert_eq!(view.len(), 2);
    }

    #[test]
    fn overflow_is_reported() {
        let records = vec![
            record(Provider::Aws, "S3", Decimal::MAX, "USD"),
            record(Provider::Aws, "S3", Decimal::MAX, "USD"),
        ];
        assert!(matches!(
            aggregate(&records, &[Dimension::Service]),
            Err(AggregateError::Overflow(_))
        ));
    }

    #[test]
    fn merge_is_commutative() {
        let records = mixed_records();
        let (left, right) = records.split_at(12);
        let dims = [Dimension::Provider, Dimension::Currency];

        let a = aggregate(left, &dims).unwrap();
        let b = aggregate(right, &dims).unwrap();

        let ab = a.clone().merge(b.clone()).unwrap();
        let ba = b.merge(a).unwrap();
        assert_eq!(ab, ba);
        assert_eq!(ab, aggregate(&records, &dims).unwrap());

        let other = AggregatedView::new(vec![Dimension::Service]);
        assert!(matches!(
            ab.merge(other),
            Err(AggregateError::GroupingMismatch(_, _))
        ));
    }

    #[tokio::test]
    async fn stream_and_iterator_agree() {
        let records = mixed_records();
        let dims = [Dimension::Service, Dimension::Currency];

        let from_stream = aggregate_stream(futures::stream::iter(records.clone()), &dims)
            .await
            .unwrap();
        assert_eq!(from_stream, aggregate(&records, &dims).unwrap());
    }
}
