use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::core::persistence::credentials::CredentialHandle;
use crate::domain::common::model::Provider;
use crate::errors::FetchError;

const USER_AGENT: &str = concat!("cloudcost/", env!("CARGO_PKG_VERSION"));

/// Creates the shared HTTP client used by every provider adapter in a run.
pub fn build_http_client(request_timeout: Duration) -> Result<Client> {
    let client = Client::builder()
        .user_agent(USER_AGENT)
        .timeout(request_timeout)
        .build()
        .context("Failed to build HTTP client")?;

    debug!(?request_timeout, "HTTP client initialized");
    Ok(client)
}

/// Bearer token for `provider`, or an auth failure when none was resolved.
pub fn require_bearer(credential: Option<&CredentialHandle>, provider: Provider) -> Result<&str, FetchError> {
    credential
        .map(CredentialHandle::bearer)
        .ok_or_else(|| FetchError::Auth(format!("no credential configured for {}", provider)))
}

pub fn classify_transport_error(err: &reqwest::Error) -> FetchError {
    if err.is_decode() {
        FetchError::Schema(format!("undecodable response body: {}", err))
    } else {
        // Timeouts, connection resets and DNS failures are all worth another try.
        FetchError::TransientNetwork(err.to_string())
    }
}

/// Maps a non-success status onto the fetch error taxonomy.
pub fn classify_status(status: StatusCode, headers: &HeaderMap, body: &str) -> FetchError {
    let detail = format!("HTTP {}: {}", status.as_u16(), trim_body(body, 300));

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => FetchError::Auth(detail),
        StatusCode::TOO_MANY_REQUESTS => FetchError::RateLimit {
            message: detail,
            retry_after: parse_retry_after(headers),
        },
        StatusCode::REQUEST_TIMEOUT => FetchError::TransientNetwork(detail),
        s if s.is_server_error() => FetchError::TransientNetwork(detail),
        _ => FetchError::Schema(detail),
    }
}

/// Checks the status of `resp` and decodes its JSON body.
pub async fn read_json<T: DeserializeOwned>(resp: Response) -> Result<T, FetchError> {
    let status = resp.status();
    if !status.is_success() {
        let headers = resp.headers().clone();
        let body = resp.text().await.unwrap_or_default();
        return Err(classify_status(status, &headers, &body));
    }

    let text = resp
        .text()
        .await
        .map_err(|e| classify_transport_error(&e))?;

    serde_json::from_str(&text)
        .map_err(|e| FetchError::Schema(format!("unexpected page shape: {}", e)))
}

/// Only the delta-seconds form is honored.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn trim_body(s: &str, max_len: usize) -> String {
    let s = s.trim();
    if s.len() <= max_len {
        s.to_string()
    } else {
        let mut end = max_len;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...<truncated>", &s[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn statuses_map_to_error_kinds() {
        let empty = HeaderMap::new();
        assert_eq!(classify_status(StatusCode::UNAUTHORIZED, &empty, "").kind(), "auth");
        assert_eq!(classify_status(StatusCode::FORBIDDEN, &empty, "").kind(), "auth");
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, &empty, "").kind(),
            "rate_limit"
        );
        assert_eq!(
            classify_status(StatusCode::BAD_GATEWAY, &empty, "").kind(),
            "transient_network"
        );
        assert_eq!(classify_status(StatusCode::BAD_REQUEST, &empty, "").kind(), "schema");
    }

    #[test]
    fn retry_after_seconds_are_parsed() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("12"));

        match classify_status(StatusCode::TOO_MANY_REQUESTS, &headers, "slow down") {
            FetchError::RateLimit { retry_after, message } => {
                assert_eq!(retry_after, Some(Duration::from_secs(12)));
                assert!(message.contains("slow down"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn missing_credential_is_auth_error() {
        let err = require_bearer(None, Provider::Azure).unwrap_err();
        assert_eq!(err.kind(), "auth");

        let handle = CredentialHandle::new(Provider::Azure, "tok");
        assert_eq!(require_bearer(Some(&handle), Provider::Azure), Ok("tok"));
    }

    #[test]
    fn long_bodies_are_truncated() {
        let body = "x".repeat(1000);
        assert!(trim_body(&body, 10).ends_with("...<truncated>"));
        assert_eq!(trim_body(" ok ", 10), "ok");
    }
}
