// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Shared buffer of pending log entries.
//!
//! Producers append from any thread; the dispatcher is the only consumer and
//! detaches the whole sequence at once. The mutex is held for O(1) work only:
//! pushing one entry, or swapping the vector for an empty one.
//!
//! ```text
//!   producer ─┐
//!   producer ─┼──> append ──> [ e0 e1 e2 ... ] ──> drain_if_ready ──> Batch
//!   producer ─┘
//! ```

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::entry::{Batch, Level, LogEntry};
use crate::error::ShipperError;

#[derive(Debug, Default)]
struct BufferState {
    entries: Vec<LogEntry>,
    /// Last timestamp handed out; keeps timestamps strictly increasing even
    /// when the wall clock stalls or steps back.
    last_timestamp_ns: i64,
    /// Set by the terminating drain. Appends are refused from then on.
    closed: bool,
}

#[derive(Debug, Default)]
pub struct EntryBuffer {
    state: Mutex<BufferState>,
}

impl EntryBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BufferState> {
        // A panicking producer cannot leave the vector half-written, so the
        // data behind a poisoned lock is still consistent.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends an entry stamped with the current time.
    ///
    /// Returns the buffer length after the append so the caller can decide
    /// whether the size threshold was reached.
    ///
    /// # Errors
    ///
    /// [`ShipperError::Terminated`] once the final drain closed the buffer.
    pub fn append(
        &self,
        message: impl Into<String>,
        level: Option<Level>,
    ) -> Result<usize, ShipperError> {
        let mut state = self.lock();
        if state.closed {
            return Err(ShipperError::Terminated);
        }

        let timestamp_ns = now_ns().max(state.last_timestamp_ns.saturating_add(1));
        state.last_timestamp_ns = timestamp_ns;
        state.entries.push(LogEntry {
            timestamp_ns,
            message: message.into(),
            level,
        });
        Ok(state.entries.len())
    }

    /// Detaches every pending entry, or returns `None` when there is nothing
    /// to send.
    pub fn drain_if_ready(&self) -> Option<Batch> {
        let mut state = self.lock();
        if state.entries.is_empty() {
            return None;
        }
        Some(Batch::from(std::mem::take(&mut state.entries)))
    }

    /// Closes the buffer if it is empty. Returns whether it is now closed.
    ///
    /// Checking emptiness and closing happen under one lock hold, so no
    /// append can land between the last drain and termination.
    pub fn close_if_empty(&self) -> bool {
        let mut state = self.lock();
        if state.entries.is_empty() {
            state.closed = true;
        }
        state.closed
    }

    /// Closes the buffer and discards what it still holds. Used when the
    /// dispatcher is gone and nothing will ever drain it again.
    ///
    /// Returns the number of discarded entries, or `None` if the buffer was
    /// already closed.
    pub fn abandon(&self) -> Option<usize> {
        let mut state = self.lock();
        if state.closed {
            return None;
        }
        state.closed = true;
        Some(std::mem::take(&mut state.entries).len())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub(crate) fn now_ns() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}
