// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Background task that turns buffered entries into push requests.
//!
//! # State machine
//!
//! ```text
//!            ┌──────────────────────────────────────┐
//!            v                                      │
//!   ┌─────────────┐  wake   ┌──────────┐  batch  ┌─────────────┐
//!   │   Waiting   │ ──────> │ Draining │ ──────> │ Dispatching │
//!   └─────────────┘         └────┬─────┘         └─────────────┘
//!            ^       empty       │
//!            └───────────────────┤
//!                                │ shutdown requested and buffer empty
//!                                v
//!                         ┌────────────┐
//!                         │ Terminated │
//!                         └────────────┘
//! ```
//!
//! There is exactly one dispatcher per shipper, so batches leave in the order
//! they were drained and a failed push never blocks the next one. Delivery is
//! at-most-once: a batch that fails is reported and dropped.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::buffer::EntryBuffer;
use crate::entry::Batch;
use crate::error::TransportError;
use crate::payload::{encode_batch, Labels};
use crate::stats::ShipperStats;
use crate::transport::{Transport, CONTENT_TYPE_JSON};
use crate::trigger::{FlushTrigger, WakeReason};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    Waiting,
    Draining,
    Dispatching,
    Terminated,
}

pub struct BatchDispatcher {
    buffer: Arc<EntryBuffer>,
    trigger: Arc<FlushTrigger>,
    transport: Arc<dyn Transport>,
    labels: Labels,
    verbose: bool,
    stats: Arc<ShipperStats>,
    state_tx: watch::Sender<DispatcherState>,
}

impl BatchDispatcher {
    pub(crate) fn new(
        buffer: Arc<EntryBuffer>,
        trigger: Arc<FlushTrigger>,
        transport: Arc<dyn Transport>,
        labels: Labels,
        verbose: bool,
        stats: Arc<ShipperStats>,
        state_tx: watch::Sender<DispatcherState>,
    ) -> Self {
        Self {
            buffer,
            trigger,
            transport,
            labels,
            verbose,
            stats,
            state_tx,
        }
    }

    /// Runs until shutdown was requested and the buffer is drained.
    pub async fn run(self) {
        loop {
            self.state_tx.send_replace(DispatcherState::Waiting);
            let reason = self.trigger.wait().await;
            if self.verbose {
                debug!("LOKI | Dispatcher woke up: {:?}", reason);
            }

            self.state_tx.send_replace(DispatcherState::Draining);
            if self.trigger.is_shutdown_requested() && self.buffer.close_if_empty() {
                break;
            }

            let Some(batch) = self.buffer.drain_if_ready() else {
                continue;
            };

            self.state_tx.send_replace(DispatcherState::Dispatching);
            self.dispatch(batch, reason).await;
        }

        debug!("LOKI | Buffer drained, dispatcher terminated");
        self.state_tx.send_replace(DispatcherState::Terminated);
    }

    async fn dispatch(&self, batch: Batch, reason: WakeReason) {
        let count = batch.len();
        if self.verbose {
            info!("LOKI | Pushing batch of {} entries ({:?})", count, reason);
        }

        match self.send(&batch).await {
            Ok(status) => {
                self.stats.record_sent(count);
                if self.verbose {
                    info!("LOKI | Batch of {} entries accepted: {}", count, status);
                }
            }
            Err(e) => {
                self.stats.record_failed(count);
                error!("LOKI | Failed to push batch of {} entries: {}", count, e);
            }
        }
    }

    async fn send(&self, batch: &Batch) -> Result<reqwest::StatusCode, TransportError> {
        let body = encode_batch(&self.labels, batch)?;
        let transport = Arc::clone(&self.transport);
        // A panicking transport fails this batch, not the dispatcher.
        tokio::spawn(async move { transport.send(body, CONTENT_TYPE_JSON).await })
            .await
            .map_err(|e| TransportError::Panicked(e.to_string()))?
    }
}
