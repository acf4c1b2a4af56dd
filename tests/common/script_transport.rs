//! In-memory HTTP transport for integration tests.
//!
//! Replies are scripted per absolute URL. Unscripted URLs answer 404. Every
//! request is recorded so tests can assert which hops were actually made.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use bytes::Bytes;
use fetch_jail::{async_trait, BodyStream, Error, HttpResponse, Transport};
use futures_util::stream;
use url::Url;

#[derive(Debug, Clone)]
pub enum Reply {
    Redirect { status: u16, location: String },
    Ok { body: Vec<u8>, chunk: usize, declared: Option<u64> },
    Status(u16),
}

impl Reply {
    pub fn redirect(status: u16, location: &str) -> Self {
        Reply::Redirect {
            status,
            location: location.to_string(),
        }
    }

    /// 200 with an honest Content-Length, streamed in 1 KiB chunks.
    pub fn ok(body: &[u8]) -> Self {
        Reply::Ok {
            body: body.to_vec(),
            chunk: 1024,
            declared: Some(body.len() as u64),
        }
    }

    /// 200 without Content-Length.
    pub fn ok_chunked(body: &[u8]) -> Self {
        Reply::Ok {
            body: body.to_vec(),
            chunk: 1024,
            declared: None,
        }
    }
}

#[derive(Default)]
pub struct ScriptTransport {
    replies: HashMap<String, Reply>,
    requested: Mutex<Vec<String>>,
}

impl ScriptTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, url: &str, reply: Reply) -> Self {
        self.replies.insert(url.to_string(), reply);
        self
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptTransport {
    async fn get(&self, url: &Url, _timeout: Duration) -> Result<HttpResponse, Error> {
        self.requested.lock().unwrap().push(url.to_string());
        let empty = || -> BodyStream { Box::pin(stream::empty()) };

        let response = match self.replies.get(url.as_str()).cloned() {
            Some(Reply::Redirect { status, location }) => HttpResponse {
                status,
                location: Some(location),
                content_length: None,
                body: empty(),
            },
            Some(Reply::Ok {
                body,
                chunk,
                declared,
            }) => {
                let chunks: Vec<Result<Bytes, Error>> = body
                    .chunks(chunk.max(1))
                    .map(|c| Ok(Bytes::copy_from_slice(c)))
                    .collect();
                HttpResponse {
                    status: 200,
                    location: None,
                    content_length: declared,
                    body: Box::pin(stream::iter(chunks)),
                }
            }
            Some(Reply::Status(status)) => HttpResponse {
                status,
                location: None,
                content_length: None,
                body: empty(),
            },
            None => HttpResponse {
                status: 404,
                location: None,
                content_length: None,
                body: empty(),
            },
        };
        Ok(response)
    }
}
