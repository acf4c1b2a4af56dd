//! # fetch_jail
//!
//! SSRF-safe fetching of remote resources.
//!
//! `fetch_jail` downloads a caller-supplied URL to a local file without letting
//! that URL, or any redirect it triggers, reach loopback, private, link-local
//! or cloud-metadata addresses. Every redirect hop is resolved and validated
//! before it is requested, bodies are capped while streaming, and the
//! destination file is replaced atomically or not at all.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fetch_jail::{download, FetchPolicy};
//!
//! # async fn example() -> Result<(), fetch_jail::Error> {
//! let policy = FetchPolicy::default().with_max_bytes(5 * 1024 * 1024);
//! let saved = download("https://cdn.example.com/image.png", "out/image.png", &policy).await?;
//! println!("saved {} bytes from {}", saved.bytes, saved.final_url);
//! # Ok(())
//! # }
//! ```
//!
//! Validation alone never touches the network:
//!
//! ```rust
//! use fetch_jail::{validate, FetchPolicy};
//!
//! assert!(validate("https://example.com/", &FetchPolicy::default()).is_ok());
//! assert!(validate("https://0x7f000001/", &FetchPolicy::default()).is_err());
//! ```

mod blocklist;
pub mod config;
mod download;
mod endpoint;
mod error;
mod fetch;
mod policy;
mod safe_url;
mod validate;
mod writer;

#[cfg(feature = "fetch")]
mod transport;

pub use blocklist::{classify, HostVerdict};
pub use download::{download_with, Downloaded};
pub use endpoint::LoopbackEndpoint;
pub use error::{Error, ErrorKind};
pub use fetch::{fetch_with, BodyStream, FetchResult, FetchedBody, HttpResponse, Transport};
pub use policy::{
    FetchPolicy, DEFAULT_BLOCKED_HOSTNAMES, DEFAULT_MAX_BYTES, DEFAULT_MAX_REDIRECTS,
    DEFAULT_REQUEST_TIMEOUT,
};
pub use safe_url::ParsedUrl;
pub use validate::{check, validate};
pub use writer::{write_atomically, Written, STAGING_PREFIX};

#[cfg(feature = "fetch")]
pub use download::{download, download_sync};
#[cfg(feature = "fetch")]
pub use fetch::fetch;
#[cfg(feature = "fetch")]
pub use transport::ReqwestTransport;

/// Re-exported so [`Transport`] can be implemented outside this crate.
pub use async_trait::async_trait;
