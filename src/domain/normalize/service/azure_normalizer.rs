use std::collections::BTreeMap;

use chrono::Duration;
use serde_json::Value;

use crate::domain::common::model::{Provider, RawRecord, ResourceCostRecord};
use crate::errors::SchemaError;

use super::field_helpers::{
    check_invariants, optional_str, preserve_extras, required_amount, required_currency,
    required_str, required_str_any, required_timestamp, tag_value,
};

pub const SUBSCRIPTION: &str = "SubscriptionGuid";
pub const SERVICE_NAME: &str = "ServiceName";
pub const METER_CATEGORY: &str = "MeterCategory";
pub const INSTANCE_ID: &str = "InstanceId";
pub const PRE_TAX_COST: &str = "PreTaxCost";
pub const CURRENCY: &str = "Currency";
pub const USAGE_DATE: &str = "UsageDateTime";
pub const CHARGE_TYPE: &str = "ChargeType";
pub const TAGS: &str = "Tags";

const KNOWN: [&str; 8] = [
    SUBSCRIPTION,
    SERVICE_NAME,
    INSTANCE_ID,
    PRE_TAX_COST,
    CURRENCY,
    USAGE_DATE,
    CHARGE_TYPE,
    TAGS,
];

/// Maps one usage-details row. Rows are daily, so the period spans one day.
pub fn normalize_azure(raw: &RawRecord) -> Result<ResourceCostRecord, SchemaError> {
    let p = Provider::Azure;

    let charge_type = optional_str(raw, CHARGE_TYPE);
    let is_credit = matches!(charge_type.as_deref(), Some("Refund") | Some("Credit"));

    let mut tags = BTreeMap::new();
    if let Some(value) = raw.get(TAGS) {
        merge_tags(p, value, &mut tags);
    }
    preserve_extras(raw, p, &KNOWN, &mut tags);

    let period_start = required_timestamp(raw, p, USAGE_DATE)?;
    let period_end = period_start
        .checked_add_signed(Duration::days(1))
        .ok_or_else(|| SchemaError::malformed(p, USAGE_DATE, "out of range"))?;

    check_invariants(ResourceCostRecord {
        provider: p,
        account_id: required_str(raw, p, SUBSCRIPTION)?,
        service_name: required_str_any(raw, p, &[SERVICE_NAME, METER_CATEGORY])?,
        resource_id: optional_str(raw, INSTANCE_ID),
        amount: required_amount(raw, p, PRE_TAX_COST)?,
        currency: required_currency(raw, p, CURRENCY)?,
        period_start,
        period_end,
        tags,
        is_credit,
    })
}

/// `Tags` arrives either as an object or as a JSON-encoded string of one.
fn merge_tags(provider: Provider, value: &Value, tags: &mut BTreeMap<String, String>) {
    let parsed = match value {
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(v) => v,
            Err(_) => {
                if let Some(v) = tag_value(value) {
                    tags.insert(format!("{}:{}", provider.tag_prefix(), TAGS), v);
                }
                return;
            }
        },
        other => other.clone(),
    };

    match parsed {
        Value::Object(map) => {
            for (key, v) in map {
                if let Some(v) = tag_value(&v) {
                    tags.insert(key, v);
                }
            }
        }
        other => {
            if let Some(v) = tag_value(&other) {
                tags.insert(format!("{}:{}", provider.tag_prefix(), TAGS), v);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn row() -> RawRecord {
        json!({
            "SubscriptionGuid": "9f1c6c5e-0000-4000-8000-1234567890ab",
            "ResourceGroup": "rg-storage",
            "ResourceLocation": "US East",
            "UsageDateTime": "2026-09-03 00:00:00",
            "MeterCategory": "Storage",
            "MeterId": "55f4f8c2-1111-4000-8000-000000000001",
            "UsageQuantity": "0.05",
            "ResourceRate": "0.15",
            "PreTaxCost": "3.00",
            "ServiceName": "Storage",
            "InstanceId": "/subscriptions/9f1c/resourceGroups/rg-storage/providers/Microsoft.Storage/storageAccounts/blob1",
            "Tags": "{\"environment\": \"dev\", \"project\": \"p2\"}",
            "AdditionalInfo": "\"\"",
            "OfferId": "",
            "Currency": "usd"
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    #[test]
    fn maps_usage_detail_row() {
        let record = normalize_azure(&row()).unwrap();

        assert_eq!(record.account_id, "9f1c6c5e-0000-4000-8000-1234567890ab");
        assert_eq!(record.service_name, "Storage");
        assert_eq!(record.amount, dec!(3.00));
        assert_eq!(record.currency, "USD");
        assert_eq!(
            record.period_start,
            Utc.with_ymd_and_hms(2026, 9, 3, 0, 0, 0).unwrap()
        );
        assert_eq!(
            record.period_end,
            Utc.with_ymd_and_hms(2026, 9, 4, 0, 0, 0).unwrap()
        );
        assert_eq!(record.tags.get("environment").map(String::as_str), Some("dev"));
        assert_eq!(record.tags.get("project").map(String::as_str), Some("p2"));
        assert_eq!(
            record.tags.get("azure:ResourceGroup").map(String::as_str),
            Some("rg-storage")
        );
        assert!(!record.tags.contains_key("azure:OfferId"));
    }

    #[test]
    fn blank_tags_are_ignored() {
        let mut raw = row();
        raw.insert(TAGS.into(), json!("\"\""));
        let record = normalize_azure(&raw).unwrap();
        assert!(!record.tags.contains_key("environment"));
        assert!(!record.tags.contains_key("azure:Tags"));
    }

    #[test]
    fn non_json_tags_are_preserved() {
        let mut raw = row();
        raw.insert(TAGS.into(), json!("team=finops"));
        let record = normalize_azure(&raw).unwrap();
        assert_eq!(record.tags.get("azure:Tags").map(String::as_str), Some("team=finops"));
    }

    #[test]
    fn usage_date_at_the_end_of_time_is_schema_error() {
        let mut raw = row();
        raw.insert(USAGE_DATE.into(), json!("+262142-12-31"));

        let err = normalize_azure(&raw).unwrap_err();

        assert_eq!(err.field, USAGE_DATE);
        assert_eq!(err.reason, "out of range");
    }

    #[test]
    fn missing_cost_is_schema_error() {
        let mut raw = row();
        raw.remove(PRE_TAX_COST);
        let err = normalize_azure(&raw).unwrap_err();
        assert_eq!(err.field, PRE_TAX_COST);
    }
}
