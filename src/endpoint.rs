//! Loopback-only endpoints for talking to a locally hosted API.
//!
//! The fetcher refuses loopback hosts outright. A caller that must reach a
//! local service holds a [`LoopbackEndpoint`] instead, which refuses anything
//! that is *not* loopback.

use std::fmt;

use url::Url;

use crate::error::Error;
use crate::safe_url::ParsedUrl;

const LOOPBACK_HOSTS: &[&str] = &["localhost", "127.0.0.1", "[::1]"];

const SCHEMES: &[&str] = &["http", "https"];

/// Base URL of a service on this machine.
///
/// # Example
///
/// ```rust
/// use fetch_jail::LoopbackEndpoint;
///
/// let api = LoopbackEndpoint::parse("http://127.0.0.1:7860").unwrap();
/// let status = api.join("/sdapi/v1/progress").unwrap();
/// assert_eq!(status.as_str(), "http://127.0.0.1:7860/sdapi/v1/progress");
///
/// assert!(LoopbackEndpoint::parse("http://example.com").is_err());
/// ```
#[derive(Debug, Clone)]
pub struct LoopbackEndpoint {
    base: ParsedUrl,
}

impl LoopbackEndpoint {
    /// Parse a base URL, accepting only `localhost`, `127.0.0.1` and `[::1]`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidUrl`] for malformed input, [`Error::UnsupportedScheme`]
    /// for anything but `http`/`https`, [`Error::BlockedHost`] for any other host.
    pub fn parse(input: &str) -> Result<Self, Error> {
        let base = ParsedUrl::parse(input)?;
        ensure_loopback(&base)?;
        Ok(Self { base })
    }

    pub fn url(&self) -> &Url {
        self.base.as_url()
    }

    pub fn host(&self) -> &str {
        self.base.host()
    }

    /// Resolve `path` against the base. The result must stay on the same host.
    pub fn join(&self, path: &str) -> Result<Url, Error> {
        let joined = self.base.join(path)?;
        ensure_loopback(&joined)?;

        if joined.host() != self.base.host() || joined.as_url().port() != self.url().port() {
            return Err(Error::blocked_host(
                joined.as_str(),
                joined.host(),
                "endpoint path must stay on the endpoint host",
            ));
        }
        Ok(joined.into_url())
    }
}

impl fmt::Display for LoopbackEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.base.as_str())
    }
}

fn ensure_loopback(url: &ParsedUrl) -> Result<(), Error> {
    if !SCHEMES.contains(&url.scheme()) {
        return Err(Error::UnsupportedScheme {
            url: url.as_str().to_string(),
            scheme: url.scheme().to_string(),
        });
    }

    // The literal as written must be loopback too, so `0177.0.0.1` and
    // friends are refused even though they normalise to 127.0.0.1.
    let literals = url.raw_host().into_iter().chain(std::iter::once(url.host()));
    for literal in literals {
        if !LOOPBACK_HOSTS.contains(&literal) {
            return Err(Error::blocked_host(
                url.as_str(),
                literal,
                "endpoint must be loopback",
            ));
        }
    }
    Ok(())
}
