use std::collections::BTreeMap;

use serde_json::Value;

use crate::domain::common::model::{Provider, RawRecord, ResourceCostRecord};
use crate::errors::SchemaError;

use super::field_helpers::{
    check_invariants, optional_str, preserve_extras, required_amount, required_currency,
    required_str, required_timestamp, tag_value,
};

pub const BILLING_ACCOUNT: &str = "billing_account_id";
pub const SERVICE: &str = "service.description";
pub const RESOURCE_GLOBAL_NAME: &str = "resource.global_name";
pub const RESOURCE_NAME: &str = "resource.name";
pub const COST: &str = "cost";
pub const CURRENCY: &str = "currency";
pub const USAGE_START: &str = "usage_start_time";
pub const USAGE_END: &str = "usage_end_time";
pub const COST_TYPE: &str = "cost_type";
pub const LABELS: &str = "labels";

const KNOWN: [&str; 9] = [
    BILLING_ACCOUNT,
    SERVICE,
    RESOURCE_GLOBAL_NAME,
    COST,
    CURRENCY,
    USAGE_START,
    USAGE_END,
    COST_TYPE,
    LABELS,
];

/// Maps one billing-export row (BigQuery export column names).
pub fn normalize_gcp(raw: &RawRecord) -> Result<ResourceCostRecord, SchemaError> {
    let p = Provider::Gcp;

    let cost_type = optional_str(raw, COST_TYPE);
    let is_credit = matches!(cost_type.as_deref(), Some("credit") | Some("adjustment"));

    let mut tags = BTreeMap::new();
    if let Some(Value::Array(labels)) = raw.get(LABELS) {
        for label in labels {
            let key = label.get("key").and_then(Value::as_str);
            let value = label.get("value").and_then(tag_value);
            if let (Some(k), Some(v)) = (key, value) {
                tags.insert(k.to_string(), v);
            }
        }
    }
    preserve_extras(raw, p, &KNOWN, &mut tags);

    let resource_id = optional_str(raw, RESOURCE_GLOBAL_NAME);
    if resource_id.is_none() {
        tags.remove(&format!("{}:{}", p.tag_prefix(), RESOURCE_NAME));
    }
    let resource_id = resource_id.or_else(|| optional_str(raw, RESOURCE_NAME));

    check_invariants(ResourceCostRecord {
        provider: p,
        account_id: required_str(raw, p, BILLING_ACCOUNT)?,
        service_name: required_str(raw, p, SERVICE)?,
        resource_id,
        amount: required_amount(raw, p, COST)?,
        currency: required_currency(raw, p, CURRENCY)?,
        period_start: required_timestamp(raw, p, USAGE_START)?,
        period_end: required_timestamp(raw, p, USAGE_END)?,
        tags,
        is_credit,
    })
}
