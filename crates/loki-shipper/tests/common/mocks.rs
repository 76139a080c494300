// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Mock transports that record what the dispatcher sends

use async_trait::async_trait;
use loki_shipper::{Transport, TransportError};
use reqwest::StatusCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Records every pushed body, decoded, in arrival order.
#[derive(Default)]
pub struct RecordingTransport {
    bodies: Mutex<Vec<serde_json::Value>>,
    delay: Option<Duration>,
}

#[allow(dead_code)]
impl RecordingTransport {
    /// Sleeps before answering, to keep the dispatcher busy.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn dispatch_count(&self) -> usize {
        self.bodies.lock().unwrap().len()
    }

    /// Lines of every dispatched batch, one inner vector per batch.
    pub fn batches(&self) -> Vec<Vec<String>> {
        self.bodies
            .lock()
            .unwrap()
            .iter()
            .map(|body| {
                body["streams"][0]["values"]
                    .as_array()
                    .unwrap()
                    .iter()
                    .map(|value| value[1].as_str().unwrap().to_string())
                    .collect()
            })
            .collect()
    }

    pub fn lines(&self) -> Vec<String> {
        self.batches().into_iter().flatten().collect()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, body: Vec<u8>, _content_type: &str) -> Result<StatusCode, TransportError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.bodies
            .lock()
            .unwrap()
            .push(serde_json::from_slice(&body).unwrap());
        Ok(StatusCode::NO_CONTENT)
    }
}

/// Fails the first `failures` pushes with a 500, then accepts.
#[derive(Default)]
pub struct FlakyTransport {
    failures: usize,
    calls: AtomicUsize,
    pub inner: RecordingTransport,
}

#[allow(dead_code)]
impl FlakyTransport {
    pub fn failing_first(failures: usize) -> Self {
        Self {
            failures,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for FlakyTransport {
    async fn send(&self, body: Vec<u8>, content_type: &str) -> Result<StatusCode, TransportError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(TransportError::Status {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                body: "ingester unavailable".to_string(),
            });
        }
        self.inner.send(body, content_type).await
    }
}

/// Panics on every push.
#[derive(Default)]
#[allow(dead_code)]
pub struct PanickingTransport {
    calls: AtomicUsize,
}

#[allow(dead_code)]
impl PanickingTransport {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for PanickingTransport {
    async fn send(&self, _body: Vec<u8>, _content_type: &str) -> Result<StatusCode, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        panic!("push handler crashed");
    }
}
