use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use crate::error::TransportError;

pub const STATUS_ACCEPTED: u16 = 204;
pub const STATUS_MALFORMED: u16 = 400;

/// One-shot upload of a finalized batch. Returns the HTTP status; anything
/// that prevented a response is a `TransportError`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post(&self, url: &str, body: Vec<u8>, headers: &[(String, String)]) -> Result<u16, TransportError>;
}

#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout) // a timed out upload is retried at the next heartbeat
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(&self, url: &str, body: Vec<u8>, headers: &[(String, String)]) -> Result<u16, TransportError> {
        let size = body.len();
        let mut request = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                debug!("POST {} ({} bytes) -> {}", url, size, status);
                Ok(status)
            }
            Err(e) if e.is_timeout() => Err(TransportError::Timeout),
            Err(e) => Err(TransportError::Network(e.to_string())),
        }
    }
}
