//! Fetch policy: the limits and allow/deny sets for one fetch.
//!
//! A [`FetchPolicy`] is an immutable value passed explicitly into every call.
//! Builder methods consume `self`, so a policy shared between concurrent
//! fetches cannot drift.

use std::collections::BTreeSet;
use std::time::Duration;

/// Redirect hops followed before giving up.
pub const DEFAULT_MAX_REDIRECTS: u32 = 5;

/// Largest body accepted, in bytes (20 MiB).
pub const DEFAULT_MAX_BYTES: u64 = 20 * 1024 * 1024;

/// Deadline for each individual request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Hostnames blocked by default. Subdomains are blocked too.
pub const DEFAULT_BLOCKED_HOSTNAMES: &[&str] = &[
    "localhost",
    "metadata.google.internal",
    "metadata.goog",
    "metadata.azure.internal",
    "instance-data",
];

/// Schemes a policy may ever allow.
const PERMITTED_SCHEMES: &[&str] = &["https", "http"];

/// Limits and allow/deny sets applied to one fetch.
///
/// The default allows only `https`, follows at most 5 redirects, accepts at
/// most 20 MiB and gives each request 30 seconds.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use fetch_jail::FetchPolicy;
///
/// let policy = FetchPolicy::default()
///     .with_max_bytes(5 * 1024 * 1024)
///     .with_request_timeout(Duration::from_secs(10))
///     .block_hostname("internal.example.com");
///
/// assert!(policy.allows_scheme("https"));
/// assert!(!policy.allows_scheme("http"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchPolicy {
    allowed_schemes: BTreeSet<String>,
    max_redirects: u32,
    max_bytes: u64,
    request_timeout: Duration,
    overall_timeout: Option<Duration>,
    blocked_hostnames: BTreeSet<String>,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            allowed_schemes: BTreeSet::from(["https".to_string()]),
            max_redirects: DEFAULT_MAX_REDIRECTS,
            max_bytes: DEFAULT_MAX_BYTES,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            overall_timeout: None,
            blocked_hostnames: DEFAULT_BLOCKED_HOSTNAMES
                .iter()
                .map(|h| h.to_string())
                .collect(),
        }
    }
}

impl FetchPolicy {
    /// Allow an additional scheme.
    ///
    /// Only `http` and `https` can ever be allowed; anything else is ignored.
    pub fn allow_scheme(mut self, scheme: &str) -> Self {
        let scheme = scheme.to_ascii_lowercase();
        if PERMITTED_SCHEMES.contains(&scheme.as_str()) {
            self.allowed_schemes.insert(scheme);
        }
        self
    }

    pub fn with_max_redirects(mut self, max_redirects: u32) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    /// Set the body size cap. Zero is raised to one byte.
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes.max(1);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Bound the whole fetch (every hop plus the body) in addition to the
    /// per-request timeout.
    pub fn with_overall_timeout(mut self, timeout: Duration) -> Self {
        self.overall_timeout = Some(timeout);
        self
    }

    /// Block a hostname and its subdomains. Matching is case-insensitive.
    pub fn block_hostname(mut self, host: &str) -> Self {
        let host = host.trim().trim_end_matches('.').to_ascii_lowercase();
        if !host.is_empty() {
            self.blocked_hostnames.insert(host);
        }
        self
    }

    pub fn allows_scheme(&self, scheme: &str) -> bool {
        self.allowed_schemes.contains(&scheme.to_ascii_lowercase())
    }

    pub fn allowed_schemes(&self) -> &BTreeSet<String> {
        &self.allowed_schemes
    }

    pub fn max_redirects(&self) -> u32 {
        self.max_redirects
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn overall_timeout(&self) -> Option<Duration> {
        self.overall_timeout
    }

    pub fn blocked_hostnames(&self) -> &BTreeSet<String> {
        &self.blocked_hostnames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let policy = FetchPolicy::default();
        assert!(policy.allows_scheme("https"));
        assert!(!policy.allows_scheme("http"));
        assert_eq!(policy.max_redirects(), 5);
        assert_eq!(policy.max_bytes(), 20 * 1024 * 1024);
        assert_eq!(policy.request_timeout(), Duration::from_secs(30));
        assert_eq!(policy.overall_timeout(), None);
        assert!(policy.blocked_hostnames().contains("localhost"));
    }

    #[test]
    fn test_allow_scheme_only_http_family() {
        let policy = FetchPolicy::default()
            .allow_scheme("HTTP")
            .allow_scheme("file")
            .allow_scheme("gopher");

        assert!(policy.allows_scheme("http"));
        assert!(!policy.allows_scheme("file"));
        assert!(!policy.allows_scheme("gopher"));
        assert_eq!(policy.allowed_schemes().len(), 2);
    }

    #[test]
    fn test_max_bytes_never_zero() {
        assert_eq!(FetchPolicy::default().with_max_bytes(0).max_bytes(), 1);
    }

    #[test]
    fn test_block_hostname_normalizes() {
        let policy = FetchPolicy::default().block_hostname(" Internal.Example.COM. ");
        assert!(policy.blocked_hostnames().contains("internal.example.com"));

        let unchanged = FetchPolicy::default().block_hostname("   ");
        assert_eq!(unchanged, FetchPolicy::default());
    }

    #[test]
    fn test_builder_chaining() {
        let policy = FetchPolicy::default()
            .with_max_redirects(0)
            .with_request_timeout(Duration::from_millis(250))
            .with_overall_timeout(Duration::from_secs(2));

        assert_eq!(policy.max_redirects(), 0);
        assert_eq!(policy.request_timeout(), Duration::from_millis(250));
        assert_eq!(policy.overall_timeout(), Some(Duration::from_secs(2)));
    }
}
