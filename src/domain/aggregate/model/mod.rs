//! Grouping dimensions, aggregation keys and the aggregated view.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::domain::common::model::ResourceCostRecord;
use crate::domain::common::service::PeriodGranularity;
use crate::errors::AggregateError;

/// Placeholder value for a record that lacks the grouped attribute.
pub const NONE_VALUE: &str = "(none)";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Dimension {
    Provider,
    Account,
    Service,
    Resource,
    Currency,
    Period(PeriodGranularity),
    Tag(String),
}

impl Dimension {
    pub fn parse(name: &str) -> Result<Self, AggregateError> {
        let trimmed = name.trim();
        if let Some(key) = trimmed.strip_prefix("tag:") {
            let key = key.trim();
            if key.is_empty() {
                return Err(AggregateError::UnknownDimension(name.to_string()));
            }
            return Ok(Dimension::Tag(key.to_string()));
        }

        match trimmed.to_ascii_lowercase().as_str() {
            "provider" => Ok(Dimension::Provider),
            "account" => Ok(Dimension::Account),
            "service" => Ok(Dimension::Service),
            "resource" => Ok(Dimension::Resource),
            "currency" => Ok(Dimension::Currency),
            "hour" => Ok(Dimension::Period(PeriodGranularity::Hour)),
            "day" => Ok(Dimension::Period(PeriodGranularity::Day)),
            "month" => Ok(Dimension::Period(PeriodGranularity::Month)),
            _ => Err(AggregateError::UnknownDimension(name.to_string())),
        }
    }

    /// Parses names in order, dropping repeats.
    pub fn parse_list<S: AsRef<str>>(names: &[S]) -> Result<Vec<Self>, AggregateError> {
        let mut dims: Vec<Dimension> = Vec::with_capacity(names.len());
        for name in names {
            let dim = Dimension::parse(name.as_ref())?;
            if !dims.contains(&dim) {
                dims.push(dim);
            }
        }
        Ok(dims)
    }

    pub fn name(&self) -> String {
        match self {
            Dimension::Provider => "provider".into(),
            Dimension::Account => "account".into(),
            Dimension::Service => "service".into(),
            Dimension::Resource => "resource".into(),
            Dimension::Currency => "currency".into(),
            Dimension::Period(g) => g.as_str().into(),
            Dimension::Tag(key) => format!("tag:{}", key),
        }
    }

    pub fn value_of(&self, record: &ResourceCostRecord) -> String {
        match self {
            Dimension::Provider => record.provider.as_code().to_string(),
            Dimension::Account => record.account_id.clone(),
            Dimension::Service => record.service_name.clone(),
            Dimension::Resource => record
                .resource_id
                .clone()
                .unwrap_or_else(|| NONE_VALUE.to_string()),
            Dimension::Currency => record.currency.clone(),
            Dimension::Period(g) => g.bucket_label(record.period_start),
            Dimension::Tag(key) => record
                .tags
                .get(key)
                .cloned()
                .unwrap_or_else(|| NONE_VALUE.to_string()),
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl FromStr for Dimension {
    type Err = AggregateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Dimension::parse(s)
    }
}

impl Serialize for Dimension {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.name())
    }
}

impl<'de> Deserialize<'de> for Dimension {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Dimension::parse(&name).map_err(serde::de::Error::custom)
    }
}

pub fn dimension_names(dims: &[Dimension]) -> String {
    dims.iter().map(Dimension::name).collect::<Vec<_>>().join(",")
}

/// Requested dimension values in order, plus the record currency.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AggregationKey {
    pub values: Vec<(Dimension, String)>,
    pub currency: String,
}

impl AggregationKey {
    pub fn from_record(record: &ResourceCostRecord, group_by: &[Dimension]) -> Self {
        Self {
            values: group_by
                .iter()
                .map(|d| (d.clone(), d.value_of(record)))
                .collect(),
            currency: record.currency.clone(),
        }
    }

    /// Label of the requested values only, e.g. `AWS/S3`.
    pub fn group_label(&self) -> String {
        if self.values.is_empty() {
            return "(all)".into();
        }
        self.values
            .iter()
            .map(|(_, v)| v.as_str())
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Group label with the currency appended unless it is already grouped on,
    /// e.g. `AWS/USD`.
    pub fn label(&self) -> String {
        if self.groups_currency() {
            self.group_label()
        } else if self.values.is_empty() {
            self.currency.clone()
        } else {
            format!("{}/{}", self.group_label(), self.currency)
        }
    }

    pub fn value(&self, dim: &Dimension) -> Option<&str> {
        self.values
            .iter()
            .find(|(d, _)| d == dim)
            .map(|(_, v)| v.as_str())
    }

    fn groups_currency(&self) -> bool {
        self.values.iter().any(|(d, _)| *d == Dimension::Currency)
    }

    fn same_group(&self, other: &AggregationKey) -> bool {
        self.values == other.values
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AggregateBucket {
    pub amount: Decimal,
    pub record_count: u64,
}

impl AggregateBucket {
    pub fn add(&mut self, amount: Decimal, records: u64, key: &AggregationKey) -> Result<(), AggregateError> {
        self.amount = self
            .amount
            .checked_add(amount)
            .ok_or_else(|| AggregateError::Overflow(key.label()))?;
        self.record_count += records;
        Ok(())
    }
}

/// Summed cost per aggregation key, in key order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AggregatedView {
    group_by: Vec<Dimension>,
    buckets: BTreeMap<AggregationKey, AggregateBucket>,
}

impl AggregatedView {
    pub fn new(group_by: Vec<Dimension>) -> Self {
        Self {
            group_by,
            buckets: BTreeMap::new(),
        }
    }

    pub fn group_by(&self) -> &[Dimension] {
        &self.group_by
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn get(&self, key: &AggregationKey) -> Option<&AggregateBucket> {
        self.buckets.get(key)
    }

    /// Looks a bucket up by its display label, e.g. `AWS/USD`.
    pub fn get_by_label(&self, label: &str) -> Option<&AggregateBucket> {
        self.buckets
            .iter()
            .find(|(k, _)| k.label() == label)
            .map(|(_, b)| b)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AggregationKey, &AggregateBucket)> {
        self.buckets.iter()
    }

    pub fn record_count(&self) -> u64 {
        self.buckets.values().map(|b| b.record_count).sum()
    }

    pub(crate) fn add(
        &mut self,
        key: AggregationKey,
        amount: Decimal,
        records: u64,
    ) -> Result<(), AggregateError> {
        match self.buckets.get_mut(&key) {
            Some(bucket) => bucket.add(amount, records, &key),
            None => {
                self.buckets.insert(
                    key,
                    AggregateBucket {
                        amount,
                        record_count: records,
                    },
                );
                Ok(())
            }
        }
    }

    pub fn totals_by_currency(&self) -> Result<BTreeMap<String, Decimal>, AggregateError> {
        let mut totals: BTreeMap<String, Decimal> = BTreeMap::new();
        for (key, bucket) in &self.buckets {
            let total = totals.entry(key.currency.clone()).or_default();
            *total = total
                .checked_add(bucket.amount)
                .ok_or_else(|| AggregateError::Overflow(format!("total {}", key.currency)))?;
        }
        Ok(totals)
    }

    /// Combines two views over the same dimensions; order of the operands does not matter.
    pub fn merge(mut self, other: AggregatedView) -> Result<AggregatedView, AggregateError> {
        if self.group_by != other.group_by {
            return Err(AggregateError::GroupingMismatch(
                dimension_names(&self.group_by),
                dimension_names(&other.group_by),
            ));
        }
        for (key, bucket) in other.buckets {
            self.add(key, bucket.amount, bucket.record_count)?;
        }
        self.check_currencies()?;
        Ok(self)
    }

    /// Fails when one requested group holds more than one currency.
    /// Keys sort by values first, so conflicting keys are adjacent.
    pub(crate) fn check_currencies(&self) -> Result<(), AggregateError> {
        let mut prev: Option<&AggregationKey> = None;
        for key in self.buckets.keys() {
            if let Some(p) = prev {
                if p.same_group(key) && p.currency != key.currency {
                    return Err(AggregateError::MixedCurrency {
                        group: key.group_label(),
                        first: p.currency.clone(),
                        second: key.currency.clone(),
                    });
                }
            }
            prev = Some(key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dimension_names() {
        assert_eq!(Dimension::parse("Provider").unwrap(), Dimension::Provider);
        assert_eq!(
            Dimension::parse("month").unwrap(),
            Dimension::Period(PeriodGranularity::Month)
        );
        assert_eq!(
            Dimension::parse("tag:environment").unwrap(),
            Dimension::Tag("environment".into())
        );
        assert!(Dimension::parse("tag:").is_err());
        assert!(matches!(
            Dimension::parse("colour"),
            Err(AggregateError::UnknownDimension(_))
        ));
    }

    #[test]
    fn parse_list_keeps_order_and_drops_repeats() {
        let dims = Dimension::parse_list(&["service", "provider", "service"]).unwrap();
        assert_eq!(dims, vec![Dimension::Service, Dimension::Provider]);
        assert_eq!(dimension_names(&dims), "service,provider");
    }

    #[test]
    fn dimension_serializes_as_its_name() {
        let json = serde_json::to_string(&Dimension::Tag("team".into())).unwrap();
        assert_eq!(json, "\"tag:team\"");
        let back: Dimension = serde_json::from_str("\"day\"").unwrap();
        assert_eq!(back, Dimension::Period(PeriodGranularity::Day));
    }

    #[test]
    fn labels_append_currency_unless_grouped() {
        let key = AggregationKey {
            values: vec![(Dimension::Provider, "AWS".into())],
            currency: "USD".into(),
        };
        assert_eq!(key.label(), "AWS/USD");
        assert_eq!(key.group_label(), "AWS");

        let with_currency = AggregationKey {
            values: vec![
                (Dimension::Provider, "AWS".into()),
                (Dimension::Currency, "EUR".into()),
            ],
            currency: "EUR".into(),
        };
        assert_eq!(with_currency.label(), "AWS/EUR");
        assert_eq!(with_currency.value(&Dimension::Currency), Some("EUR"));

        let ungrouped = AggregationKey {
            values: vec![],
            currency: "JPY".into(),
        };
        assert_eq!(ungrouped.label(), "JPY");
    }
}
