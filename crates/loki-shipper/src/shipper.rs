// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Shipper assembly and the handle producers hold.
//!
//! ```text
//!   ShipperHandle (cloned per producer)
//!       │ append ────────────> EntryBuffer
//!       │ notify_size ───────> FlushTrigger ──> BatchDispatcher ──> Transport
//!       │ initiate_shutdown ─>      │                 │
//!       └ await_drained <─────────── watch<DispatcherState>
//! ```

use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, warn};

use crate::buffer::EntryBuffer;
use crate::config::ShipperConfig;
use crate::dispatcher::{BatchDispatcher, DispatcherState};
use crate::entry::Level;
use crate::error::ShipperError;
use crate::stats::{ShipperStats, StatsSnapshot};
use crate::transport::{HttpTransport, Transport};
use crate::trigger::FlushTrigger;

pub struct LokiShipper;

impl LokiShipper {
    /// Validates `config` and spawns the dispatcher on the current tokio
    /// runtime, pushing through `transport`.
    ///
    /// # Errors
    ///
    /// [`ShipperError::Config`] if the configuration is invalid; nothing is
    /// started in that case.
    ///
    /// # Panics
    ///
    /// If called outside of a tokio runtime.
    pub fn start(
        config: ShipperConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<ShipperHandle, ShipperError> {
        config.validate()?;

        let buffer = Arc::new(EntryBuffer::new());
        let trigger = Arc::new(FlushTrigger::new(config.flush_interval));
        let stats = Arc::new(ShipperStats::default());
        let (state_tx, state_rx) = watch::channel(DispatcherState::Waiting);

        let dispatcher = BatchDispatcher::new(
            Arc::clone(&buffer),
            Arc::clone(&trigger),
            transport,
            config.static_labels,
            config.verbose,
            Arc::clone(&stats),
            state_tx,
        );
        let task = tokio::spawn(dispatcher.run());

        {
            let buffer = Arc::clone(&buffer);
            let stats = Arc::clone(&stats);
            tokio::spawn(async move {
                if let Err(e) = task.await {
                    error!("LOKI | Dispatcher task failed: {}", e);
                    abandon(&buffer, &stats);
                }
            });
        }

        debug!(
            "LOKI | Shipper started: batch size {}, flush interval {:?}",
            config.batch_size, config.flush_interval
        );

        Ok(ShipperHandle {
            buffer,
            trigger,
            stats,
            state_rx,
            batch_size: config.batch_size,
        })
    }

    /// Validates `config` and starts a shipper pushing over HTTP.
    ///
    /// # Errors
    ///
    /// See [`LokiShipper::start`].
    pub fn from_config(config: ShipperConfig) -> Result<ShipperHandle, ShipperError> {
        let transport = HttpTransport::new(&config);
        debug!("LOKI | Pushing to {}", transport.endpoint());
        Self::start(config, Arc::new(transport))
    }
}

/// Closes the buffer of a shipper whose dispatcher is gone and counts what
/// it still held as dropped.
fn abandon(buffer: &EntryBuffer, stats: &ShipperStats) {
    if let Some(count) = buffer.abandon() {
        stats.record_abandoned(count);
        error!(
            "LOKI | Dispatcher stopped without draining, {} buffered entries dropped",
            count
        );
    }
}

/// Producer side of a running shipper. Cheap to clone and share.
#[derive(Clone)]
pub struct ShipperHandle {
    buffer: Arc<EntryBuffer>,
    trigger: Arc<FlushTrigger>,
    stats: Arc<ShipperStats>,
    state_rx: watch::Receiver<DispatcherState>,
    batch_size: usize,
}

impl ShipperHandle {
    /// Buffers a line for the next batch. Never blocks on the network.
    ///
    /// # Errors
    ///
    /// [`ShipperError::Terminated`] after the shipper finished draining; the
    /// line is dropped.
    pub fn append(&self, message: impl Into<String>) -> Result<(), ShipperError> {
        self.push(message.into(), None)
    }

    /// Like [`ShipperHandle::append`], with the level sent as structured metadata.
    ///
    /// # Errors
    ///
    /// See [`ShipperHandle::append`].
    pub fn append_with_level(
        &self,
        level: Level,
        message: impl Into<String>,
    ) -> Result<(), ShipperError> {
        self.push(message.into(), Some(level))
    }

    fn push(&self, message: String, level: Option<Level>) -> Result<(), ShipperError> {
        match self.buffer.append(message, level) {
            Ok(len) => {
                if len >= self.batch_size {
                    self.trigger.notify_size();
                }
                Ok(())
            }
            Err(e) => {
                self.stats.record_rejected();
                warn!("LOKI | Entry appended after shutdown was dropped");
                Err(e)
            }
        }
    }

    /// Asks the dispatcher to flush what is buffered and stop.
    ///
    /// Returns immediately. Entries appended before the dispatcher's final
    /// drain are still sent.
    pub fn initiate_shutdown(&self) {
        if !self.trigger.is_shutdown_requested() {
            debug!("LOKI | Shutdown requested");
        }
        self.trigger.request_shutdown();
    }

    /// Waits until every buffered entry was dispatched and the dispatcher
    /// stopped. Any number of callers may wait at once.
    ///
    /// If the dispatcher died instead, the buffer is closed and whatever it
    /// still held is logged and counted as dropped.
    pub async fn await_drained(&self) {
        let mut state_rx = self.state_rx.clone();
        if state_rx
            .wait_for(|state| *state == DispatcherState::Terminated)
            .await
            .is_err()
        {
            abandon(&self.buffer, &self.stats);
        }
    }

    /// [`ShipperHandle::initiate_shutdown`] followed by
    /// [`ShipperHandle::await_drained`].
    pub async fn shutdown(&self) {
        self.initiate_shutdown();
        self.await_drained().await;
    }

    #[must_use]
    pub fn state(&self) -> DispatcherState {
        *self.state_rx.borrow()
    }

    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.state() == DispatcherState::Terminated
    }

    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Number of entries waiting for the next batch.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}
