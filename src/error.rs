//! Error types for fetch_jail.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Every way a fetch can fail. All variants are terminal; nothing is retried.
#[derive(Debug, Error)]
pub enum Error {
    /// Empty input or URL syntax error.
    #[error("Invalid URL: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Scheme is not in the policy's allowed set.
    #[error("Unsupported scheme '{scheme}' in {url}")]
    UnsupportedScheme { url: String, scheme: String },

    /// Hostname or IP literal matched a restricted rule.
    #[error("SSRF blocked: {host} - {reason}")]
    BlockedHost {
        url: String,
        host: String,
        reason: String,
    },

    /// A redirect response came without a `Location` header.
    #[error("Redirect ({status}) without Location header from {url}")]
    MissingLocation { url: String, status: u16 },

    /// Redirect chain longer than the policy allows.
    #[error("Too many redirects (max {max})")]
    TooManyRedirects { url: String, max: u32 },

    /// Terminal non-2xx, non-redirect response.
    #[error("HTTP error {status} from {url}")]
    HttpError { url: String, status: u16 },

    /// Declared or streamed body size went over the cap.
    #[error("Response from {url} exceeds {limit} bytes (got {received})")]
    SizeExceeded {
        url: String,
        limit: u64,
        received: u64,
    },

    /// A single request ran past its deadline.
    #[error("Request to {url} timed out after {after:?}")]
    Timeout { url: String, after: Duration },

    /// Connection, TLS or body-stream failure that is not a timeout.
    #[error("Transport error for {url}: {message}")]
    Transport { url: String, message: String },

    /// Filesystem failure while staging or committing the download.
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Field-less mirror of [`Error`] for callers that only branch on the failure kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidUrl,
    UnsupportedScheme,
    BlockedHost,
    MissingLocation,
    TooManyRedirects,
    HttpError,
    SizeExceeded,
    Timeout,
    Transport,
    Io,
}

impl Error {
    /// The failure kind, without its diagnostic payload.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidUrl { .. } => ErrorKind::InvalidUrl,
            Error::UnsupportedScheme { .. } => ErrorKind::UnsupportedScheme,
            Error::BlockedHost { .. } => ErrorKind::BlockedHost,
            Error::MissingLocation { .. } => ErrorKind::MissingLocation,
            Error::TooManyRedirects { .. } => ErrorKind::TooManyRedirects,
            Error::HttpError { .. } => ErrorKind::HttpError,
            Error::SizeExceeded { .. } => ErrorKind::SizeExceeded,
            Error::Timeout { .. } => ErrorKind::Timeout,
            Error::Transport { .. } => ErrorKind::Transport,
            Error::Io { .. } => ErrorKind::Io,
        }
    }

    pub(crate) fn invalid_url(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn blocked_host(
        url: impl Into<String>,
        host: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::BlockedHost {
            url: url.into(),
            host: host.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn size_exceeded(url: impl Into<String>, limit: u64, received: u64) -> Self {
        Self::SizeExceeded {
            url: url.into(),
            limit,
            received,
        }
    }

    pub(crate) fn transport(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            url: url.into(),
            message: message.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_matches_variant() {
        assert_eq!(
            Error::invalid_url("", "empty URL").kind(),
            ErrorKind::InvalidUrl
        );
        assert_eq!(
            Error::blocked_host("https://[::1]/", "[::1]", "IPv6 loopback").kind(),
            ErrorKind::BlockedHost
        );
        assert_eq!(
            Error::size_exceeded("https://example.com/", 10, 11).kind(),
            ErrorKind::SizeExceeded
        );
    }

    #[test]
    fn test_blocked_host_message_names_rule() {
        let err = Error::blocked_host("https://10.0.0.1/", "10.0.0.1", "private IPv4 range");
        let msg = err.to_string();
        assert!(msg.contains("10.0.0.1"), "{}", msg);
        assert!(msg.contains("private IPv4 range"), "{}", msg);
    }

    #[test]
    fn test_io_error_keeps_source() {
        use std::error::Error as _;

        let err = Error::io(
            "/tmp/out.png",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.to_string().contains("/tmp/out.png"));
        assert!(err.source().is_some());
    }
}
