//! Shared domain services/utils (time bucketing)

pub mod period_granularity;

pub use period_granularity::PeriodGranularity;
