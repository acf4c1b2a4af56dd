//! TOML configuration for [`FetchPolicy`].

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::policy::FetchPolicy;

/// Fetch settings as read from a `fetch-jail.toml` file.
///
/// Every field is optional; anything missing keeps the [`FetchPolicy`]
/// default. A config can only ever tighten the hostname blocklist and can
/// only add `http` next to the always-allowed `https`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FetchConfig {
    /// Extra schemes to allow besides `https`. Only `http` is accepted.
    pub allowed_schemes: Vec<String>,
    pub max_redirects: Option<u32>,
    /// Body size cap in bytes.
    pub max_bytes: Option<u64>,
    /// Per-request deadline in seconds.
    pub request_timeout_secs: Option<u64>,
    /// Deadline for the whole download, redirects and body included.
    pub overall_timeout_secs: Option<u64>,
    /// Hostnames blocked on top of the defaults. Subdomains are blocked too.
    pub blocked_hostnames: Vec<String>,
}

impl FetchConfig {
    /// Parse a TOML document.
    pub fn parse(data: &str) -> Result<Self> {
        let cfg: FetchConfig = toml::from_str(data).context("invalid fetch config")?;
        Ok(cfg)
    }

    /// Build the immutable policy this config describes.
    pub fn into_policy(self) -> Result<FetchPolicy> {
        let mut policy = FetchPolicy::default();

        for scheme in &self.allowed_schemes {
            let scheme = scheme.to_ascii_lowercase();
            if scheme != "http" && scheme != "https" {
                bail!("scheme '{}' cannot be allowed (only http and https)", scheme);
            }
            policy = policy.allow_scheme(&scheme);
        }

        if let Some(max) = self.max_redirects {
            policy = policy.with_max_redirects(max);
        }
        if let Some(max) = self.max_bytes {
            if max == 0 {
                bail!("max_bytes must be greater than zero");
            }
            policy = policy.with_max_bytes(max);
        }
        if let Some(secs) = self.request_timeout_secs {
            if secs == 0 {
                bail!("request_timeout_secs must be greater than zero");
            }
            policy = policy.with_request_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = self.overall_timeout_secs {
            if secs == 0 {
                bail!("overall_timeout_secs must be greater than zero");
            }
            policy = policy.with_overall_timeout(Duration::from_secs(secs));
        }
        for host in &self.blocked_hostnames {
            policy = policy.block_hostname(host);
        }

        Ok(policy)
    }
}

/// Load a config file from disk.
pub fn load(path: &Path) -> Result<FetchConfig> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let cfg = FetchConfig::parse(&data)
        .with_context(|| format!("failed to parse config {}", path.display()))?;
    tracing::debug!("loaded fetch config from {}", path.display());
    Ok(cfg)
}
