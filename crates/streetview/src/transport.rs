//! HTTP seam for the metadata RPC.
//!
//! Timeouts and retries belong to the client behind this trait, not to the
//! fetcher.

use reqwest::header::CONTENT_TYPE;
use std::future::Future;
use std::time::Duration;

/// Outcome of a request that reached the server.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    /// Parsed JSON body; `None` for non-200 statuses and empty or `null` bodies.
    pub body: Option<serde_json::Value>,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("response body is not JSON: {0}")]
    Body(#[from] serde_json::Error),
}

pub trait Transport: Send + Sync + 'static {
    /// POSTs `body` with content type `application/json+protobuf`.
    fn post_json(
        &self,
        url: &str,
        body: String,
    ) -> impl Future<Output = Result<HttpResponse, TransportError>> + Send;
}

#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Transport for ReqwestTransport {
    async fn post_json(&self, url: &str, body: String) -> Result<HttpResponse, TransportError> {
        let resp = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json+protobuf")
            .body(body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        let bytes = resp.bytes().await?;

        // Error pages are often HTML; only successful bodies are parsed.
        let body = if status != 200 || bytes.iter().all(u8::is_ascii_whitespace) {
            None
        } else {
            match serde_json::from_slice::<serde_json::Value>(&bytes)? {
                serde_json::Value::Null => None,
                v => Some(v),
            }
        };

        Ok(HttpResponse { status, body })
    }
}
