//! Seeded generator of provider-native billing rows, and an adapter serving them.
//!
//! Rows follow each provider's export columns: one row per instance per day,
//! a small pool of instances, and `environment`/`project` tags on some of them.

use std::collections::BTreeMap;
use std::ops::Range;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use crate::core::client::{CostAdapter, Page};
use crate::domain::common::model::{FetchWindow, Provider, RawRecord};
use crate::domain::normalize::service::usage_start;
use crate::errors::FetchError;

const ENVIRONMENTS: [&str; 5] = ["dev", "ci", "qa", "stage", "prod"];
const PROJECTS: [&str; 3] = ["p1", "p2", "p3"];

/// (product name, product code, resource id prefix)
const AWS_SERVICES: [(&str, &str, Option<&str>); 7] = [
    ("Amazon Elastic Compute Cloud", "AmazonEC2", Some("i-")),
    ("Amazon Elastic Compute Cloud", "AmazonEC2", Some("vol-")),
    ("Amazon Relational Database Service", "AmazonRDS", Some("arn:aws:rds:us-east-1:db:")),
    ("Amazon Route 53", "AmazonRoute53", Some("arn:aws:route53:::hostedzone/")),
    ("Amazon Simple Storage Service", "AmazonS3", Some("arn:aws:s3:::")),
    ("Amazon Virtual Private Cloud", "AmazonVPC", Some("vpc-")),
    ("AWS Data Transfer", "AWSDataTransfer", None),
];

/// (service name, resource provider, resource type)
const AZURE_SERVICES: [(&str, &str, &str); 4] = [
    ("SQL Database", "Microsoft.Sql", "servers"),
    ("Storage", "Microsoft.Storage", "storageAccounts"),
    ("Virtual Machines", "Microsoft.Compute", "virtualMachines"),
    ("Virtual Network", "Microsoft.Network", "publicIPAddresses"),
];

const AZURE_LOCATIONS: [&str; 7] = [
    "US East",
    "US North Central",
    "US South Central",
    "US West",
    "US Central",
    "US East 2",
    "US West 2",
];

/// (service description, service id)
const GCP_SERVICES: [(&str, &str); 4] = [
    ("Compute Engine", "6F81-5844-456A"),
    ("Cloud Storage", "95FF-2EF5-5EA1"),
    ("BigQuery", "24E6-581D-38E5"),
    ("Cloud SQL", "9662-B51E-5089"),
];

/// Fixed values pinned onto every generated row. Any attribute set narrows the
/// instance pool to one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntheticAttributes {
    pub service_name: Option<String>,
    /// Written verbatim as the resource / instance id column.
    pub instance_id: Option<String>,
    /// Azure `MeterId`, GCP `sku.id`.
    pub meter_id: Option<String>,
    pub usage_quantity: Option<Decimal>,
    pub resource_rate: Option<Decimal>,
    /// Cost column; defaults to quantity * rate.
    pub pre_tax_cost: Option<Decimal>,
    pub tags: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone)]
struct Instance {
    service: usize,
    service_name: Option<String>,
    resource: String,
    /// Verbatim id from attributes; replaces the composed resource path.
    pinned_id: Option<String>,
    location: &'static str,
    tags: BTreeMap<String, String>,
    rate: Decimal,
}

pub struct SyntheticGenerator {
    provider: Provider,
    seed: u64,
    attributes: Option<SyntheticAttributes>,
}

impl SyntheticGenerator {
    pub fn new(provider: Provider, seed: u64) -> Self {
        Self {
            provider,
            seed,
            attributes: None,
        }
    }

    pub fn with_attributes(mut self, attributes: Option<SyntheticAttributes>) -> Self {
        self.attributes = attributes;
        self
    }

    /// Exactly `rows` records, all starting inside `window`. Same seed, same rows.
    pub fn generate(&self, window: &FetchWindow, rows: usize) -> Vec<RawRecord> {
        self.generate_range(window, 0..rows)
    }

    /// Rows `range` of the sequence `generate` would produce. Each row depends
    /// only on the seed, the window and its index.
    pub fn generate_range(&self, window: &FetchWindow, range: Range<usize>) -> Vec<RawRecord> {
        let base_seed = self.seed ^ provider_salt(self.provider);
        let mut rng = StdRng::seed_from_u64(base_seed);
        let account = self.account_id(&mut rng);

        let pool = if self.attributes.is_some() {
            1
        } else {
            rng.gen_range(2..=8usize)
        };
        let instances: Vec<Instance> = (0..pool).map(|_| self.instance(&mut rng)).collect();

        let span = window.end - window.start;
        let days = ((span.num_seconds() + 86_399) / 86_400).max(1) as usize;

        range
            .map(|index| {
                let mut row_rng = StdRng::seed_from_u64(row_seed(base_seed, index));
                let instance = &instances[index % pool];
                let start = window.start + Duration::days(((index / pool) % days) as i64);
                let usage = self.usage(&mut row_rng, instance.rate);
                match self.provider {
                    Provider::Aws => aws_row(&mut row_rng, &account, instance, usage, start),
                    Provider::Azure => azure_row(&mut row_rng, &account, instance, usage, self.meter_id(), start),
                    Provider::Gcp => gcp_row(&mut row_rng, &account, instance, usage, self.meter_id(), start),
                }
            })
            .collect()
    }

    fn meter_id(&self) -> Option<&str> {
        self.attributes.as_ref()?.meter_id.as_deref()
    }

    fn account_id(&self, rng: &mut StdRng) -> String {
        match self.provider {
            Provider::Aws => format!("{:012}", rng.gen_range(100_000_000_000u64..999_999_999_999)),
            Provider::Azure => Uuid::from_u128(rng.gen()).to_string(),
            Provider::Gcp => {
                let hex = format!("{:018X}", rng.gen::<u128>() >> 56);
                format!("{}-{}-{}", &hex[0..6], &hex[6..12], &hex[12..18])
            }
        }
    }

    fn instance(&self, rng: &mut StdRng) -> Instance {
        let service = match self.provider {
            Provider::Aws => rng.gen_range(0..AWS_SERVICES.len()),
            Provider::Azure => rng.gen_range(0..AZURE_SERVICES.len()),
            Provider::Gcp => rng.gen_range(0..GCP_SERVICES.len()),
        };

        let name = format!("{}-{:06x}", words(rng), rng.gen_range(0..0xFF_FFFFu32));
        let resource = match self.provider {
            Provider::Aws => match AWS_SERVICES[service].2 {
                Some(prefix) => format!("{}{}", prefix, name),
                None => String::new(),
            },
            Provider::Azure => name,
            Provider::Gcp => name,
        };

        let mut tags = BTreeMap::new();
        if rng.gen_bool(0.5) {
            let env = ENVIRONMENTS.choose(rng).copied().unwrap_or("dev");
            let project = PROJECTS.choose(rng).copied().unwrap_or("p1");
            tags.insert("environment".to_string(), env.to_string());
            tags.insert("project".to_string(), project.to_string());
        }

        let mut instance = Instance {
            service,
            service_name: None,
            resource,
            pinned_id: None,
            location: AZURE_LOCATIONS.choose(rng).copied().unwrap_or("US East"),
            tags,
            rate: Decimal::new(rng.gen_range(12_000..19_000), 5),
        };

        if let Some(attrs) = &self.attributes {
            instance.service_name = attrs.service_name.clone();
            if let Some(id) = &attrs.instance_id {
                instance.resource = id.clone();
                instance.pinned_id = Some(id.clone());
            }
            if let Some(tags) = &attrs.tags {
                instance.tags = tags.clone();
            }
            if let Some(rate) = attrs.resource_rate {
                instance.rate = rate;
            }
        }
        instance
    }

    /// Usage quantity in `[0.000002, 0.09)` and its cost at `rate`, unless pinned.
    fn usage(&self, rng: &mut StdRng, rate: Decimal) -> Usage {
        let drawn = Decimal::new(rng.gen_range(2..90_000), 6);
        let attrs = self.attributes.as_ref();
        let quantity = attrs.and_then(|a| a.usage_quantity).unwrap_or(drawn);
        let cost = attrs.and_then(|a| a.pre_tax_cost).unwrap_or(quantity * rate);
        Usage { quantity, rate, cost }
    }
}

#[derive(Debug, Clone, Copy)]
struct Usage {
    quantity: Decimal,
    rate: Decimal,
    cost: Decimal,
}

fn row_seed(base: u64, index: usize) -> u64 {
    base ^ (index as u64).wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

fn provider_salt(provider: Provider) -> u64 {
    match provider {
        Provider::Aws => 0xA305,
        Provider::Azure => 0xA2E0,
        Provider::Gcp => 0x6C90,
    }
}

fn words(rng: &mut StdRng) -> &'static str {
    const WORDS: [&str; 8] = ["alpha", "ledger", "orbit", "harbor", "cinder", "maple", "quartz", "tundra"];
    WORDS.choose(rng).copied().unwrap_or("alpha")
}

fn aws_row(rng: &mut StdRng, account: &str, instance: &Instance, usage: Usage, start: DateTime<Utc>) -> RawRecord {
    let (product_name, product_code, _) = AWS_SERVICES[instance.service];
    let product_name = instance.service_name.as_deref().unwrap_or(product_name);
    let credit = rng.gen_ratio(1, 25);
    let (line_type, amount) = if credit { ("Credit", -usage.cost) } else { ("Usage", usage.cost) };

    let mut row = json!({
        "identity/LineItemId": Uuid::from_u128(rng.gen()).to_string(),
        "bill/PayerAccountId": account,
        "lineItem/UsageAccountId": account,
        "lineItem/LineItemType": line_type,
        "lineItem/UsageStartDate": start.to_rfc3339(),
        "lineItem/UsageEndDate": (start + Duration::days(1)).to_rfc3339(),
        "lineItem/ProductCode": product_code,
        "lineItem/UsageAmount": usage.quantity.to_string(),
        "lineItem/UnblendedRate": usage.rate.to_string(),
        "lineItem/UnblendedCost": amount.to_string(),
        "lineItem/CurrencyCode": "USD",
        "product/ProductName": product_name,
        "product/region": "us-east-1",
    });

    if let Value::Object(map) = &mut row {
        if !instance.resource.is_empty() {
            map.insert("lineItem/ResourceId".into(), json!(instance.resource));
        }
        for (key, value) in &instance.tags {
            map.insert(format!("resourceTags/user:{}", key), json!(value));
        }
    }
    into_record(row)
}

fn azure_row(
    rng: &mut StdRng,
    account: &str,
    instance: &Instance,
    usage: Usage,
    meter_id: Option<&str>,
    start: DateTime<Utc>,
) -> RawRecord {
    let (service_name, resource_provider, resource_type) = AZURE_SERVICES[instance.service];
    let service_name = instance.service_name.as_deref().unwrap_or(service_name);
    let resource_group = format!("rg-{}", words(rng));
    let meter_id = match meter_id {
        Some(id) => id.to_string(),
        None => Uuid::from_u128(rng.gen()).to_string(),
    };

    let tags = if instance.tags.is_empty() {
        String::new()
    } else {
        json!(instance.tags).to_string()
    };
    let instance_id = instance.pinned_id.clone().unwrap_or_else(|| {
        format!(
            "/subscriptions/{}/resourceGroups/{}/providers/{}/{}/{}",
            account, resource_group, resource_provider, resource_type, instance.resource
        )
    });

    into_record(json!({
        "SubscriptionGuid": account,
        "ResourceGroup": resource_group,
        "ResourceLocation": instance.location,
        "UsageDateTime": start.format("%Y-%m-%d %H:%M:%S").to_string(),
        "MeterCategory": service_name,
        "MeterId": meter_id,
        "MeterRegion": instance.location,
        "UsageQuantity": usage.quantity.to_string(),
        "ResourceRate": usage.rate.to_string(),
        "PreTaxCost": usage.cost.to_string(),
        "ConsumedService": resource_provider,
        "ResourceType": format!("{}/{}", resource_provider, resource_type),
        "InstanceId": instance_id,
        "Tags": tags,
        "ServiceName": service_name,
        "Currency": "USD",
    }))
}

fn gcp_row(
    rng: &mut StdRng,
    account: &str,
    instance: &Instance,
    usage: Usage,
    meter_id: Option<&str>,
    start: DateTime<Utc>,
) -> RawRecord {
    let (description, service_id) = GCP_SERVICES[instance.service];
    let description = instance.service_name.as_deref().unwrap_or(description);
    let sku = match meter_id {
        Some(id) => id.to_string(),
        None => format!("{:04X}-{:04X}-{:04X}", rng.gen::<u16>(), rng.gen::<u16>(), rng.gen::<u16>()),
    };
    let project = instance.tags.get("project").map(String::as_str).unwrap_or("shared");
    let global_name = instance.pinned_id.clone().unwrap_or_else(|| {
        format!("//{}.googleapis.com/{}", service_id.to_ascii_lowercase(), instance.resource)
    });

    let labels: Vec<Value> = instance
        .tags
        .iter()
        .map(|(key, value)| json!({ "key": key, "value": value }))
        .collect();

    into_record(json!({
        "billing_account_id": account,
        "service": { "id": service_id, "description": description },
        "sku": { "id": sku },
        "project": { "id": format!("project-{}", project) },
        "resource": {
            "name": instance.resource,
            "global_name": global_name,
        },
        "labels": labels,
        "usage": { "amount": usage.quantity.to_string() },
        "cost": usage.cost.to_string(),
        "currency": "USD",
        "cost_type": "regular",
        "usage_start_time": start.to_rfc3339(),
        "usage_end_time": (start + Duration::days(1)).to_rfc3339(),
    }))
}

fn into_record(value: Value) -> RawRecord {
    match value {
        Value::Object(map) => map,
        _ => RawRecord::new(),
    }
}

/// Serves generated rows page by page; the cursor is the row offset.
pub struct SyntheticAdapter {
    generator: SyntheticGenerator,
    rows: usize,
    page_size: usize,
}

impl SyntheticAdapter {
    pub fn new(provider: Provider, seed: u64, rows: usize, page_size: usize) -> Self {
        Self {
            generator: SyntheticGenerator::new(provider, seed),
            rows,
            page_size: page_size.max(1),
        }
    }

    pub fn with_attributes(mut self, attributes: Option<SyntheticAttributes>) -> Self {
        self.generator = self.generator.with_attributes(attributes);
        self
    }
}

#[async_trait]
impl CostAdapter for SyntheticAdapter {
    fn provider(&self) -> Provider {
        self.generator.provider
    }

    async fn fetch_page(&self, window: &FetchWindow, cursor: Option<&str>) -> Result<Page, FetchError> {
        let offset = match cursor {
            Some(c) => c
                .parse::<usize>()
                .map_err(|_| FetchError::Schema(format!("invalid synthetic cursor '{}'", c)))?,
            None => 0,
        };

        let start = offset.min(self.rows);
        let end = offset.saturating_add(self.page_size).min(self.rows);
        let records = self.generator.generate_range(window, start..end);

        debug!(provider = %self.provider(), offset, records = records.len(), "Generated synthetic page");

        Ok(Page {
            records,
            next_cursor: (end < self.rows).then(|| end.to_string()),
        })
    }

    fn usage_start(&self, raw: &RawRecord) -> Option<DateTime<Utc>> {
        usage_start(raw, self.generator.provider)
    }
}
