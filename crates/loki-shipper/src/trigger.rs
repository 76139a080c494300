// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Why the dispatcher woke up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeReason {
    Shutdown,
    SizeReached,
    IntervalElapsed,
}

/// Wakes the dispatcher on whichever comes first: the buffer reaching the
/// batch size, the flush interval elapsing, or a shutdown request.
#[derive(Debug)]
pub struct FlushTrigger {
    size_reached: Notify,
    shutdown: CancellationToken,
    flush_interval: Duration,
}

impl FlushTrigger {
    #[must_use]
    pub fn new(flush_interval: Duration) -> Self {
        Self {
            size_reached: Notify::new(),
            shutdown: CancellationToken::new(),
            flush_interval,
        }
    }

    /// Signals that the buffer reached the batch size.
    ///
    /// If the dispatcher is not waiting right now, the signal is kept and the
    /// next `wait` returns immediately.
    pub fn notify_size(&self) {
        self.size_reached.notify_one();
    }

    /// Requests shutdown. Calling it again has no effect.
    pub fn request_shutdown(&self) {
        self.shutdown.cancel();
    }

    #[must_use]
    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub async fn wait(&self) -> WakeReason {
        tokio::select! {
            biased;

            () = self.shutdown.cancelled() => WakeReason::Shutdown,
            () = self.size_reached.notified() => WakeReason::SizeReached,
            () = tokio::time::sleep(self.flush_interval) => WakeReason::IntervalElapsed,
        }
    }
}
