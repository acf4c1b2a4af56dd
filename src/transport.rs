//! reqwest-backed [`Transport`].

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::LOCATION;
use reqwest::redirect::Policy as RedirectPolicy;
use reqwest::Client;
use url::Url;

use crate::error::Error;
use crate::fetch::{HttpResponse, Transport};

/// HTTPS transport with redirect-following disabled at the client level.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, Error> {
        let client = Client::builder()
            .redirect(RedirectPolicy::none())
            .user_agent(concat!("fetch_jail/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::transport("", e.to_string()))?;
        Ok(Self { client })
    }

    /// Wrap an existing client.
    ///
    /// The client must be built with `redirect(Policy::none())`; a client
    /// that follows redirects itself bypasses per-hop validation.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, url: &Url, timeout: Duration) -> Result<HttpResponse, Error> {
        let response = self
            .client
            .get(url.clone())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| map_error(url.as_str(), e, timeout))?;

        let status = response.status().as_u16();
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|h| h.to_str().ok())
            .map(str::to_string);
        let content_length = response.content_length();

        let body_url = url.to_string();
        let body = response
            .bytes_stream()
            .map(move |chunk| chunk.map_err(|e| map_error(&body_url, e, timeout)));

        Ok(HttpResponse {
            status,
            location,
            content_length,
            body: Box::pin(body),
        })
    }
}

fn map_error(url: &str, err: reqwest::Error, timeout: Duration) -> Error {
    if err.is_timeout() {
        Error::Timeout {
            url: url.to_string(),
            after: timeout,
        }
    } else {
        Error::transport(url, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_builds_client() {
        assert!(ReqwestTransport::new().is_ok());
    }
}
