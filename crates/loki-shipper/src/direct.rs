// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Unbuffered sender: one push request per line.
//!
//! Useful for short-lived tools that log a handful of lines and cannot keep a
//! dispatcher task around. Unlike the batching shipper, the level becomes a
//! stream label, so each level lands in its own stream.

use reqwest::StatusCode;
use std::sync::Arc;
use tracing::{debug, error};

use crate::buffer::now_ns;
use crate::config::ShipperConfig;
use crate::entry::{Level, LogEntry};
use crate::error::{ShipperError, TransportError};
use crate::payload::{encode_entries, Labels};
use crate::transport::{HttpTransport, Transport, CONTENT_TYPE_JSON};

pub struct DirectSender {
    transport: Arc<dyn Transport>,
    labels: Labels,
    verbose: bool,
}

impl DirectSender {
    #[must_use]
    pub fn new(config: &ShipperConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            labels: config.static_labels.clone(),
            verbose: config.verbose,
        }
    }

    /// Validates `config` and sends over HTTP.
    ///
    /// # Errors
    ///
    /// [`ShipperError::Config`] if the configuration is invalid.
    pub fn from_config(config: &ShipperConfig) -> Result<Self, ShipperError> {
        config.validate()?;
        Ok(Self::new(config, Arc::new(HttpTransport::new(config))))
    }

    /// Adds or replaces a label on every following request.
    pub fn add_label(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        if self.verbose {
            debug!("LOKI | Added label {}={}", key, value);
        }
        self.labels.insert(key, value);
    }

    /// Pushes `message` right away under the static labels plus `level`.
    ///
    /// # Errors
    ///
    /// The [`TransportError`] of the push. Nothing is retried.
    pub async fn send_log(
        &self,
        level: Level,
        message: impl Into<String>,
    ) -> Result<StatusCode, TransportError> {
        let mut labels = self.labels.clone();
        labels.insert("level".to_string(), level.to_string());
        let entry = LogEntry {
            timestamp_ns: now_ns(),
            message: message.into(),
            level: None,
        };

        let body = encode_entries(&labels, std::slice::from_ref(&entry))?;
        if self.verbose {
            debug!("LOKI | Sending {} bytes", body.len());
        }

        let result = self.transport.send(body, CONTENT_TYPE_JSON).await;
        if let Err(e) = &result {
            error!("LOKI | Failed to push {} line: {}", level, e);
        }
        result
    }

    /// # Errors
    ///
    /// See [`DirectSender::send_log`].
    pub async fn debug(&self, message: impl Into<String>) -> Result<StatusCode, TransportError> {
        self.send_log(Level::Debug, message).await
    }

    /// # Errors
    ///
    /// See [`DirectSender::send_log`].
    pub async fn info(&self, message: impl Into<String>) -> Result<StatusCode, TransportError> {
        self.send_log(Level::Info, message).await
    }

    /// # Errors
    ///
    /// See [`DirectSender::send_log`].
    pub async fn warn(&self, message: impl Into<String>) -> Result<StatusCode, TransportError> {
        self.send_log(Level::Warn, message).await
    }

    /// # Errors
    ///
    /// See [`DirectSender::send_log`].
    pub async fn error(&self, message: impl Into<String>) -> Result<StatusCode, TransportError> {
        self.send_log(Level::Error, message).await
    }
}
