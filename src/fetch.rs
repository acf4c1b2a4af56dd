//! Fetching with manual redirect handling.
//!
//! The transport never follows redirects itself. Every `Location` is resolved
//! against the current URL and validated against the policy before the next
//! request is made.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::Stream;
use tokio::time::{Instant, Sleep};
use tracing::{debug, warn};
use url::Url;

use crate::error::Error;
use crate::policy::FetchPolicy;
use crate::safe_url::ParsedUrl;
use crate::validate::{check, validate};

/// Statuses treated as redirects.
const REDIRECT_STATUSES: [u16; 5] = [301, 302, 303, 307, 308];

/// Response body as delivered by a [`Transport`].
pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, Error>> + Send>>;

/// One HTTP response, before any policy is applied to it.
pub struct HttpResponse {
    pub status: u16,
    /// Raw `Location` header, if present.
    pub location: Option<String>,
    /// Declared `Content-Length`, if present.
    pub content_length: Option<u64>,
    pub body: BodyStream,
}

/// Byte-stream transport used by the fetcher.
///
/// Implementations must issue exactly one GET and must not follow redirects.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &Url, timeout: Duration) -> Result<HttpResponse, Error>;
}

/// Result of a fetch that reached a 2xx response.
#[derive(Debug)]
pub struct FetchResult {
    /// Chain of validated URLs that were requested, the original first.
    pub chain: Vec<ParsedUrl>,
    pub status: u16,
    pub content_length: Option<u64>,
    /// Body, capped at the policy's `max_bytes` and the request deadline.
    pub body: FetchedBody,
}

impl FetchResult {
    /// URL that produced the body.
    pub fn final_url(&self) -> &ParsedUrl {
        // chain always holds at least the original URL
        &self.chain[self.chain.len() - 1]
    }

    pub fn redirects(&self) -> u32 {
        (self.chain.len() - 1) as u32
    }
}

/// Fetch a URL through `transport`, following redirects safely.
///
/// Each hop is validated against `policy` before it is requested. Returns once
/// a 2xx response arrives; its declared length is checked here and the actual
/// length is enforced while the body is read.
///
/// # Errors
///
/// Any validation error for the first URL or a redirect target, plus
/// [`Error::MissingLocation`], [`Error::TooManyRedirects`],
/// [`Error::HttpError`], [`Error::SizeExceeded`], [`Error::Timeout`] and
/// [`Error::Transport`].
pub async fn fetch_with<T>(transport: &T, url: &str, policy: &FetchPolicy) -> Result<FetchResult, Error>
where
    T: Transport + ?Sized,
{
    let mut current = validate(url, policy)?;
    let mut chain = vec![current.clone()];
    let mut redirects: u32 = 0;

    loop {
        let timeout = policy.request_timeout();
        let deadline = Instant::now() + timeout;
        let response = send(transport, &current, timeout).await?;
        debug!(url = %current.as_str(), status = response.status, hop = redirects, "response");

        if REDIRECT_STATUSES.contains(&response.status) {
            let location = response
                .location
                .as_deref()
                .ok_or_else(|| Error::MissingLocation {
                    url: current.as_str().to_string(),
                    status: response.status,
                })?;

            // Resolve relative URLs
            let next = current.join(location)?;

            redirects += 1;
            if redirects > policy.max_redirects() {
                return Err(Error::TooManyRedirects {
                    url: url.to_string(),
                    max: policy.max_redirects(),
                });
            }

            if let Err(err) = check(&next, policy) {
                warn!(from = %current.as_str(), to = %next.as_str(), error = %err, "redirect blocked");
                return Err(err);
            }

            current = next;
            chain.push(current.clone());
            continue;
        }

        if !(200..300).contains(&response.status) {
            return Err(Error::HttpError {
                url: current.as_str().to_string(),
                status: response.status,
            });
        }

        if let Some(declared) = response.content_length {
            if declared > policy.max_bytes() {
                return Err(Error::size_exceeded(current.as_str(), policy.max_bytes(), declared));
            }
        }

        let body = FetchedBody::new(
            current.as_str(),
            response.body,
            policy.max_bytes(),
            deadline,
            timeout,
        );

        return Ok(FetchResult {
            chain,
            status: response.status,
            content_length: response.content_length,
            body,
        });
    }
}

/// Fetch with the default reqwest transport.
#[cfg(feature = "fetch")]
pub async fn fetch(url: &str, policy: &FetchPolicy) -> Result<FetchResult, Error> {
    let transport = crate::transport::ReqwestTransport::new()?;
    fetch_with(&transport, url, policy).await
}

async fn send<T>(transport: &T, url: &ParsedUrl, timeout: Duration) -> Result<HttpResponse, Error>
where
    T: Transport + ?Sized,
{
    match tokio::time::timeout(timeout, transport.get(url.as_url(), timeout)).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout {
            url: url.as_str().to_string(),
            after: timeout,
        }),
    }
}

/// Response body that fails once it grows past the size cap or outlives the
/// request deadline. The error is yielded once, then the stream ends.
pub struct FetchedBody {
    url: String,
    inner: BodyStream,
    limit: u64,
    received: u64,
    deadline: Pin<Box<Sleep>>,
    timeout: Duration,
    finished: bool,
}

impl fmt::Debug for FetchedBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchedBody")
            .field("url", &self.url)
            .field("limit", &self.limit)
            .field("received", &self.received)
            .field("timeout", &self.timeout)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl FetchedBody {
    fn new(url: &str, inner: BodyStream, limit: u64, deadline: Instant, timeout: Duration) -> Self {
        Self {
            url: url.to_string(),
            inner,
            limit,
            received: 0,
            deadline: Box::pin(tokio::time::sleep_until(deadline)),
            timeout,
            finished: false,
        }
    }

    /// Bytes yielded so far.
    pub fn received(&self) -> u64 {
        self.received
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    fn fail(&mut self, err: Error) -> Poll<Option<Result<Bytes, Error>>> {
        self.finished = true;
        Poll::Ready(Some(Err(err)))
    }
}

impl Stream for FetchedBody {
    type Item = Result<Bytes, Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }

        let item = match this.inner.as_mut().poll_next(cx) {
            Poll::Ready(item) => item,
            Poll::Pending => {
                if this.deadline.as_mut().poll(cx).is_ready() {
                    let err = Error::Timeout {
                        url: this.url.clone(),
                        after: this.timeout,
                    };
                    return this.fail(err);
                }
                return Poll::Pending;
            }
        };

        match item {
            Some(Ok(chunk)) => {
                this.received += chunk.len() as u64;
                if this.received > this.limit {
                    let err = Error::size_exceeded(this.url.as_str(), this.limit, this.received);
                    return this.fail(err);
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            Some(Err(err)) => this.fail(err),
            None => {
                this.finished = true;
                Poll::Ready(None)
            }
        }
    }
}
