// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use std::sync::Arc;
use tracing::debug;

use crate::config::ShipperConfig;
use crate::error::TransportError;
use crate::http::get_client;

pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Delivers one serialized payload to the backend.
///
/// This is the only thing the dispatcher knows about the network. Retries,
/// spooling or fan-out belong in a wrapper implementing this same trait.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends `body` and returns the success status, or why it failed.
    async fn send(&self, body: Vec<u8>, content_type: &str) -> Result<StatusCode, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, body: Vec<u8>, content_type: &str) -> Result<StatusCode, TransportError> {
        (**self).send(body, content_type).await
    }
}

/// POSTs payloads to `<base>/loki/api/v1/push`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTransport {
    #[must_use]
    pub fn new(config: &ShipperConfig) -> Self {
        Self::with_client(get_client(config), config.push_endpoint())
    }

    #[must_use]
    pub fn with_client(client: reqwest::Client, endpoint: String) -> Self {
        HttpTransport { client, endpoint }
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, body: Vec<u8>, content_type: &str) -> Result<StatusCode, TransportError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await
            .map_err(|source| TransportError::Request {
                url: self.endpoint.clone(),
                source,
            })?;

        let status = resp.status();
        if status.is_success() {
            debug!("LOKI | Push accepted with {}", status);
            return Ok(status);
        }

        // Loki explains rejections (out-of-order entries, rate limits) in the body.
        let body = resp.text().await.unwrap_or_default();
        Err(TransportError::Status { status, body })
    }
}
