//! Client-side HTTP binding.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;

use super::handlers::call::MSGPACK_CONTENT_TYPE;
use crate::client::TransportError;
use crate::traits::Transport;

/// Posts call envelopes to `{base_url}/call`.
///
/// The underlying `reqwest::Client` pools connections; one transport can be
/// shared by any number of concurrent calls.
pub struct HttpTransport {
    http: reqwest::Client,
    call_url: String,
    closed: AtomicBool,
}

impl HttpTransport {
    /// Transport for the server at `base_url`, e.g. `http://127.0.0.1:8080`.
    #[must_use]
    pub fn new(base_url: &str) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Like [`new`](Self::new) but reusing a configured `reqwest::Client`.
    #[must_use]
    pub fn with_client(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            http,
            call_url: format!("{}/call", base_url.trim_end_matches('/')),
            closed: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn call_url(&self) -> &str {
        &self.call_url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn call(&self, body: Bytes) -> Result<Bytes, TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        let resp = self
            .http
            .post(&self.call_url)
            .header(CONTENT_TYPE, MSGPACK_CONTENT_TYPE)
            .body(body)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }
        Ok(resp.bytes().await?)
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
