use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bucket width used when grouping records by time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodGranularity {
    Hour,
    Day,
    Month,
}

impl PeriodGranularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeriodGranularity::Hour => "hour",
            PeriodGranularity::Day => "day",
            PeriodGranularity::Month => "month",
        }
    }

    /// Label of the bucket `ts` falls into. Labels sort chronologically.
    pub fn bucket_label(&self, ts: DateTime<Utc>) -> String {
        match self {
            PeriodGranularity::Hour => ts.format("%Y-%m-%dT%H:00Z").to_string(),
            PeriodGranularity::Day => ts.format("%Y-%m-%d").to_string(),
            PeriodGranularity::Month => ts.format("%Y-%m").to_string(),
        }
    }
}
