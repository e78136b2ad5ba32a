use std::collections::BTreeMap;

use crate::domain::common::model::{Provider, RawRecord, ResourceCostRecord};
use crate::errors::SchemaError;

use super::field_helpers::{
    check_invariants, optional_str, preserve_extras, required_amount, required_currency,
    required_str, required_str_any, required_timestamp,
};

pub const ACCOUNT: &str = "lineItem/UsageAccountId";
pub const PRODUCT_NAME: &str = "product/ProductName";
pub const PRODUCT_CODE: &str = "lineItem/ProductCode";
pub const RESOURCE_ID: &str = "lineItem/ResourceId";
pub const COST: &str = "lineItem/UnblendedCost";
pub const CURRENCY: &str = "lineItem/CurrencyCode";
pub const USAGE_START: &str = "lineItem/UsageStartDate";
pub const USAGE_END: &str = "lineItem/UsageEndDate";
pub const LINE_ITEM_TYPE: &str = "lineItem/LineItemType";

const RESOURCE_TAG_PREFIX: &str = "resourceTags/";

const KNOWN: [&str; 8] = [
    ACCOUNT,
    PRODUCT_NAME,
    RESOURCE_ID,
    COST,
    CURRENCY,
    USAGE_START,
    USAGE_END,
    LINE_ITEM_TYPE,
];

/// Maps one Cost and Usage Report line item.
pub fn normalize_aws(raw: &RawRecord) -> Result<ResourceCostRecord, SchemaError> {
    let p = Provider::Aws;

    let line_item_type = optional_str(raw, LINE_ITEM_TYPE);
    let is_credit = matches!(line_item_type.as_deref(), Some("Credit") | Some("Refund"));

    let mut tags = BTreeMap::new();
    let mut extras = RawRecord::new();
    for (key, value) in raw {
        match key.strip_prefix(RESOURCE_TAG_PREFIX) {
            Some(tag_key) => {
                let tag_key = tag_key.strip_prefix("user:").unwrap_or(tag_key);
                if let Some(v) = value.as_str().filter(|v| !v.trim().is_empty()) {
                    tags.insert(tag_key.to_string(), v.to_string());
                }
            }
            None => {
                extras.insert(key.clone(), value.clone());
            }
        }
    }
    preserve_extras(&extras, p, &KNOWN, &mut tags);

    // ProductCode is consumed as the service name when ProductName is absent.
    if optional_str(raw, PRODUCT_NAME).is_none() {
        tags.remove(&format!("{}:{}", p.tag_prefix(), PRODUCT_CODE));
    }

    check_invariants(ResourceCostRecord {
        provider: p,
        account_id: required_str(raw, p, ACCOUNT)?,
        service_name: required_str_any(raw, p, &[PRODUCT_NAME, PRODUCT_CODE])?,
        resource_id: optional_str(raw, RESOURCE_ID),
        amount: required_amount(raw, p, COST)?,
        currency: required_currency(raw, p, CURRENCY)?,
        period_start: required_timestamp(raw, p, USAGE_START)?,
        period_end: required_timestamp(raw, p, USAGE_END)?,
        tags,
        is_credit,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn line_item() -> RawRecord {
        json!({
            "lineItem/UsageAccountId": "111122223333",
            "product/ProductName": "Amazon Simple Storage Service",
            "lineItem/ProductCode": "AmazonS3",
            "lineItem/ResourceId": "arn:aws:s3:::reports-bucket",
            "lineItem/UnblendedCost": "10.00",
            "lineItem/CurrencyCode": "USD",
            "lineItem/UsageStartDate": "2026-09-01T00:00:00Z",
            "lineItem/UsageEndDate": "2026-09-01T01:00:00Z",
            "lineItem/LineItemType": "Usage",
            "lineItem/Operation": "PutObject",
            "resourceTags/user:environment": "prod",
            "resourceTags/user:project": ""
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    #[test]
    fn maps_cur_columns() {
        let record = normalize_aws(&line_item()).unwrap();

        assert_eq!(record.account_id, "111122223333");
        assert_eq!(record.service_name, "Amazon Simple Storage Service");
        assert_eq!(record.resource_id.as_deref(), Some("arn:aws:s3:::reports-bucket"));
        assert_eq!(record.amount, dec!(10.00));
        assert!(!record.is_credit);
        assert_eq!(record.tags.get("environment").map(String::as_str), Some("prod"));
        assert!(!record.tags.contains_key("project"));
        assert_eq!(
            record.tags.get("aws:lineItem/Operation").map(String::as_str),
            Some("PutObject")
        );
        assert_eq!(
            record.tags.get("aws:lineItem/ProductCode").map(String::as_str),
            Some("AmazonS3")
        );
    }

    #[test]
    fn falls_back_to_product_code() {
        let mut raw = line_item();
        raw.remove(PRODUCT_NAME);
        let record = normalize_aws(&raw).unwrap();
        assert_eq!(record.service_name, "AmazonS3");
    }

    #[test]
    fn credits_may_be_negative() {
        let mut raw = line_item();
        raw.insert(COST.into(), json!("-4.50"));
        assert!(normalize_aws(&raw).is_err());

        raw.insert(LINE_ITEM_TYPE.into(), json!("Credit"));
        let record = normalize_aws(&raw).unwrap();
        assert!(record.is_credit);
        assert_eq!(record.amount, dec!(-4.50));
    }

    #[test]
    fn missing_end_is_rejected() {
        let mut raw = line_item();
        raw.remove(USAGE_END);
        let err = normalize_aws(&raw).unwrap_err();
        assert_eq!(err.field, USAGE_END);
    }
}
