//! Provider Policy: resolves a Git repo URL to an allowed [`GitProvider`]
//! and looks up its credential.
//!
//! Loaded once at startup from `GIT_PROVIDERS` and passed down explicitly —
//! never re-read from the environment once resolved.

use arsvc_schemas::GitProvider;
use url::Url;

pub const ENV_GIT_PROVIDERS: &str = "GIT_PROVIDERS";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("scheme_not_https: only https repository URLs are allowed")]
    SchemeNotHttps,
    #[error("host_not_configured: host '{0}' is not configured")]
    HostNotConfigured(String),
    #[error("org_not_allowed: org '{org}' is not in the allowed list for {host}")]
    OrgNotAllowed { host: String, org: String },
    #[error("credential_missing: environment variable '{0}' is not set or empty")]
    CredentialMissing(String),
    #[error("invalid_url: {0}")]
    InvalidUrl(String),
}

/// The full set of configured Git providers, loaded once at startup and
/// treated as immutable for the lifetime of the process.
#[derive(Debug, Clone, Default)]
pub struct GitProviders {
    providers: Vec<GitProvider>,
}

impl GitProviders {
    pub fn new(providers: Vec<GitProvider>) -> Self {
        Self { providers }
    }

    /// Parse `GIT_PROVIDERS` from the environment. An unset or empty
    /// variable yields an empty (not an error) provider set.
    pub fn from_env() -> anyhow::Result<Self> {
        let raw = std::env::var(ENV_GIT_PROVIDERS).unwrap_or_default();
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> anyhow::Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        let providers: Vec<GitProvider> = serde_json::from_str(raw)?;
        Ok(Self::new(providers))
    }

    /// Resolve `repo_url` to the configured provider that is allowed to
    /// serve it: https scheme, exact host match, first non-empty path
    /// segment present in the provider's org allowlist.
    pub fn resolve(&self, repo_url: &str) -> Result<&GitProvider, PolicyError> {
        let parsed =
            Url::parse(repo_url).map_err(|e| PolicyError::InvalidUrl(e.to_string()))?;

        if parsed.scheme() != "https" {
            return Err(PolicyError::SchemeNotHttps);
        }

        let host = parsed.host_str().unwrap_or_default().to_string();

        let provider = self
            .providers
            .iter()
            .find(|p| p.host == host)
            .ok_or_else(|| PolicyError::HostNotConfigured(host.clone()))?;

        let org = parsed
            .path_segments()
            .and_then(|mut segs| segs.find(|s| !s.is_empty()))
            .unwrap_or_default()
            .to_string();

        if !provider.orgs.iter().any(|o| o == &org) {
            return Err(PolicyError::OrgNotAllowed { host, org });
        }

        Ok(provider)
    }
}

/// Look up the credential for a provider record. Blank values are treated
/// as missing.
pub fn credential(provider: &GitProvider) -> Result<String, PolicyError> {
    match std::env::var(&provider.credential_env) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(PolicyError::CredentialMissing(provider.credential_env.clone())),
    }
}
