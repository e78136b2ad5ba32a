use std::time::Duration;

use thiserror::Error;

use crate::domain::common::model::Provider;

/// Failure of a single provider fetch (one page request or the whole adapter).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Rate limited: {message}")]
    RateLimit {
        message: String,
        /// Server-suggested wait (`Retry-After`), used as a backoff floor.
        retry_after: Option<Duration>,
    },

    #[error("Transient network error: {0}")]
    TransientNetwork(String),

    #[error("Schema error: {0}")]
    Schema(String),
}

impl FetchError {
    pub fn rate_limit(message: impl Into<String>) -> Self {
        FetchError::RateLimit {
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Auth(_) => "auth",
            FetchError::RateLimit { .. } => "rate_limit",
            FetchError::TransientNetwork(_) => "transient_network",
            FetchError::Schema(_) => "schema",
        }
    }
}

/// A raw record that cannot be mapped onto the canonical schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{provider} record rejected: {field}: {reason}")]
pub struct SchemaError {
    pub provider: Provider,
    pub field: String,
    pub reason: String,
}

impl SchemaError {
    pub fn missing(provider: Provider, field: &str) -> Self {
        Self {
            provider,
            field: field.to_string(),
            reason: "missing".into(),
        }
    }

    pub fn malformed(provider: Provider, field: &str, reason: impl Into<String>) -> Self {
        Self {
            provider,
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggregateError {
    #[error("Mixed currencies ({first}, {second}) in group '{group}'; add 'currency' to group_by")]
    MixedCurrency {
        group: String,
        first: String,
        second: String,
    },

    #[error("Decimal overflow while summing group '{0}'")]
    Overflow(String),

    #[error("Unknown grouping dimension '{0}'")]
    UnknownDimension(String),

    #[error("Cannot merge views grouped by [{0}] and [{1}]")]
    GroupingMismatch(String, String),
}

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Template not found: {0}")]
    NotFound(String),

    #[error("Template '{name}' failed to render: {message}")]
    Render { name: String, message: String },

    #[error("Template setup failed: {0}")]
    Setup(String),
}

/// Run-level failure; anything here maps to the fatal exit code.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Strict mode: incomplete data from {0}")]
    StrictMode(String),

    #[error(transparent)]
    Aggregate(#[from] AggregateError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("Output error: {0}")]
    Output(String),
}

/// Helper for mapping any unknown error into an output error
pub fn output_error<E: ToString>(err: E) -> RunError {
    RunError::Output(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_error_names_field() {
        let err = SchemaError::missing(Provider::Azure, "PreTaxCost");
        assert_eq!(err.to_string(), "Azure record rejected: PreTaxCost: missing");
    }

    #[test]
    fn mixed_currency_suggests_fix() {
        let err = AggregateError::MixedCurrency {
            group: "service=Storage".into(),
            first: "EUR".into(),
            second: "USD".into(),
        };
        assert!(err.to_string().contains("add 'currency' to group_by"));
    }

    #[test]
    fn fetch_error_kinds() {
        assert_eq!(FetchError::rate_limit("slow down").kind(), "rate_limit");
        assert_eq!(FetchError::Auth("denied".into()).kind(), "auth");
    }
}
