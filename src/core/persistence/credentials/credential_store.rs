use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::common::model::Provider;

/// Where a provider's token comes from. A file wins over the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialSource {
    /// Environment variable name; defaults to `CLOUDCOST_<PROVIDER>_TOKEN`.
    pub credentials_env: Option<String>,
    /// File whose trimmed contents are the token.
    pub credentials_file: Option<PathBuf>,
}

/// Opaque per-provider credential. Never printed in full.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialHandle {
    provider: Provider,
    token: String,
}

impl CredentialHandle {
    pub fn new(provider: Provider, token: impl Into<String>) -> Self {
        Self {
            provider,
            token: token.into(),
        }
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn bearer(&self) -> &str {
        &self.token
    }

    /// Mask the token for safe display (keeps last 4 chars).
    pub fn masked(&self) -> String {
        let t = &self.token;
        if t.len() <= 8 {
            "***".into()
        } else {
            let mut start = t.len() - 4;
            while !t.is_char_boundary(start) {
                start += 1;
            }
            format!("***{}", &t[start..])
        }
    }
}

impl fmt::Debug for CredentialHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialHandle")
            .field("provider", &self.provider)
            .field("token", &self.masked())
            .finish()
    }
}

pub fn default_env_var(provider: Provider) -> String {
    format!("CLOUDCOST_{}_TOKEN", provider.tag_prefix().to_ascii_uppercase())
}

/// Credentials resolved once per run and handed to adapter construction.
#[derive(Debug, Default, Clone)]
pub struct CredentialStore {
    handles: HashMap<Provider, CredentialHandle>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, handle: CredentialHandle) {
        self.handles.insert(handle.provider(), handle);
    }

    pub fn get(&self, provider: Provider) -> Option<&CredentialHandle> {
        self.handles.get(&provider)
    }

    /// Resolves each `(provider, source)` pair; unresolved providers are left out
    /// and will fail with an auth error when fetched.
    pub fn resolve<'a, I>(sources: I) -> Self
    where
        I: IntoIterator<Item = (Provider, &'a CredentialSource)>,
    {
        let mut store = Self::new();
        for (provider, source) in sources {
            match resolve_one(provider, source) {
                Ok(Some(handle)) => {
                    debug!(%provider, token = %handle.masked(), "Credential resolved");
                    store.insert(handle);
                }
                Ok(None) => warn!(%provider, "No credential found"),
                Err(e) => warn!(%provider, error = %e, "Failed to read credential"),
            }
        }
        store
    }
}

pub fn resolve_one(provider: Provider, source: &CredentialSource) -> Result<Option<CredentialHandle>> {
    if let Some(path) = &source.credentials_file {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read credentials file {}", path.display()))?;
        let token = raw.trim();
        if token.is_empty() {
            return Err(anyhow!("Credentials file {} is empty", path.display()));
        }
        return Ok(Some(CredentialHandle::new(provider, token)));
    }

    let var = source
        .credentials_env
        .clone()
        .unwrap_or_else(|| default_env_var(provider));

    Ok(std::env::var(&var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(|token| CredentialHandle::new(provider, token)))
}
