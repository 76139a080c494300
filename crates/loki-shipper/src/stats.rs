// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::atomic::{AtomicU64, Ordering};

/// Running counters shared by the handle and the dispatcher.
#[derive(Debug, Default)]
pub struct ShipperStats {
    batches_sent: AtomicU64,
    batches_failed: AtomicU64,
    entries_sent: AtomicU64,
    entries_dropped: AtomicU64,
    entries_rejected: AtomicU64,
}

/// Point-in-time copy of [`ShipperStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub batches_sent: u64,
    pub batches_failed: u64,
    pub entries_sent: u64,
    /// Entries lost because their batch failed to send, or because the
    /// dispatcher stopped before draining them.
    pub entries_dropped: u64,
    /// Entries refused because the shipper had already terminated.
    pub entries_rejected: u64,
}

impl ShipperStats {
    pub(crate) fn record_sent(&self, entries: usize) {
        self.batches_sent.fetch_add(1, Ordering::Relaxed);
        self.entries_sent.fetch_add(entries as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self, entries: usize) {
        self.batches_failed.fetch_add(1, Ordering::Relaxed);
        self.entries_dropped
            .fetch_add(entries as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_abandoned(&self, entries: usize) {
        self.entries_dropped
            .fetch_add(entries as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.entries_rejected.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            batches_sent: self.batches_sent.load(Ordering::Relaxed),
            batches_failed: self.batches_failed.load(Ordering::Relaxed),
            entries_sent: self.entries_sent.load(Ordering::Relaxed),
            entries_dropped: self.entries_dropped.load(Ordering::Relaxed),
            entries_rejected: self.entries_rejected.load(Ordering::Relaxed),
        }
    }
}
