//! URL validation against a [`FetchPolicy`]. Never performs I/O.

use crate::blocklist::{classify, is_hostname_blocked, HostVerdict};
use crate::error::Error;
use crate::policy::FetchPolicy;
use crate::safe_url::ParsedUrl;

/// Validate a URL string against the policy.
///
/// This is the single entry point every fetch site goes through. It:
/// 1. Parses the URL (empty or malformed input is [`Error::InvalidUrl`])
/// 2. Checks the scheme against the policy ([`Error::UnsupportedScheme`])
/// 3. Checks the host against the policy's hostname blocklist
/// 4. Classifies the host literal as written and as normalised
///    ([`Error::BlockedHost`] if either is restricted)
///
/// # Example
///
/// ```rust
/// use fetch_jail::{validate, Error, FetchPolicy};
///
/// let policy = FetchPolicy::default();
/// assert!(validate("https://example.com/x", &policy).is_ok());
/// assert!(matches!(
///     validate("https://169.254.169.254/", &policy),
///     Err(Error::BlockedHost { .. })
/// ));
/// ```
pub fn validate(url: &str, policy: &FetchPolicy) -> Result<ParsedUrl, Error> {
    let parsed = ParsedUrl::parse(url)?;
    check(&parsed, policy)?;
    Ok(parsed)
}

/// Apply the policy to an already parsed URL, e.g. a resolved redirect target.
pub fn check(url: &ParsedUrl, policy: &FetchPolicy) -> Result<(), Error> {
    if !policy.allows_scheme(url.scheme()) {
        return Err(Error::UnsupportedScheme {
            url: url.as_str().to_string(),
            scheme: url.scheme().to_string(),
        });
    }

    if let Some(entry) = is_hostname_blocked(url.host(), policy.blocked_hostnames()) {
        return Err(Error::blocked_host(
            url.as_str(),
            url.host(),
            format!("hostname {} is blocked", entry),
        ));
    }

    let literals = url.raw_host().into_iter().chain(std::iter::once(url.host()));
    for literal in literals {
        if let HostVerdict::Restricted(reason) = classify(literal) {
            return Err(Error::blocked_host(url.as_str(), literal, reason));
        }
    }

    Ok(())
}
