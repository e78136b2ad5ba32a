//! Provider raw record → canonical `ResourceCostRecord` mapping.
//!
//! Every function here is pure: no clock, no I/O, same input → same output.

pub mod aws_normalizer;
pub mod azure_normalizer;
pub mod field_helpers;
pub mod gcp_normalizer;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::domain::common::model::{Provider, RawRecord, ResourceCostRecord};
use crate::errors::SchemaError;

use self::field_helpers::{lookup, parse_timestamp};

pub fn normalize(raw: &RawRecord, provider: Provider) -> Result<ResourceCostRecord, SchemaError> {
    match provider {
        Provider::Aws => aws_normalizer::normalize_aws(raw),
        Provider::Azure => azure_normalizer::normalize_azure(raw),
        Provider::Gcp => gcp_normalizer::normalize_gcp(raw),
    }
}

/// Usage start of a raw record, if present and parseable.
pub fn usage_start(raw: &RawRecord, provider: Provider) -> Option<DateTime<Utc>> {
    let path = match provider {
        Provider::Aws => aws_normalizer::USAGE_START,
        Provider::Azure => azure_normalizer::USAGE_DATE,
        Provider::Gcp => gcp_normalizer::USAGE_START,
    };
    parse_timestamp(lookup(raw, path)?.as_str()?)
}

#[derive(Debug, Default)]
pub struct NormalizedBatch {
    pub records: Vec<ResourceCostRecord>,
    pub skipped: usize,
}

impl NormalizedBatch {
    /// Normalizes one record, logging and counting it when rejected.
    pub fn push_raw(&mut self, raw: &RawRecord, provider: Provider) {
        match normalize(raw, provider) {
            Ok(record) => self.records.push(record),
            Err(e) => {
                warn!(provider = %provider, error = %e, "Skipping malformed record");
                self.skipped += 1;
            }
        }
    }

    /// True when records arrived but none survived normalization.
    pub fn all_rejected(&self) -> bool {
        self.records.is_empty() && self.skipped > 0
    }
}

pub fn normalize_batch<'a, I>(raws: I, provider: Provider) -> NormalizedBatch
where
    I: IntoIterator<Item = &'a RawRecord>,
{
    let mut batch = NormalizedBatch::default();
    for raw in raws {
        batch.push_raw(raw, provider);
    }
    batch
}
