// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! JSON body for the Loki push endpoint.
//!
//! ```json
//! {
//!   "streams": [
//!     {
//!       "stream": { "job": "my-app" },
//!       "values": [
//!         ["1700000000000000000", "plain line"],
//!         ["1700000000000000001", "line with level", { "level": "error" }]
//!       ]
//!     }
//!   ]
//! }
//! ```
//!
//! Every batch becomes one stream carrying the shipper's fixed label set.
//! An entry's level travels as structured metadata in the optional third
//! element of its value, so entries of different levels never split a batch
//! into several streams.

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

use crate::entry::{Batch, LogEntry};

/// Stream labels, kept sorted so payloads are deterministic.
pub type Labels = BTreeMap<String, String>;

#[derive(Debug, Serialize)]
pub struct PushRequest<'a> {
    pub streams: Vec<PushStream<'a>>,
}

#[derive(Debug, Serialize)]
pub struct PushStream<'a> {
    pub stream: &'a Labels,
    pub values: Vec<PushValue<'a>>,
}

/// One `[timestamp, line]` or `[timestamp, line, metadata]` tuple.
#[derive(Debug)]
pub struct PushValue<'a>(pub &'a LogEntry);

impl Serialize for PushValue<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let entry = self.0;
        let len = if entry.level.is_some() { 3 } else { 2 };
        let mut seq = serializer.serialize_seq(Some(len))?;
        seq.serialize_element(&entry.timestamp_ns.to_string())?;
        seq.serialize_element(&entry.message)?;
        if let Some(level) = entry.level {
            seq.serialize_element(&LevelMetadata(level.as_str()))?;
        }
        seq.end()
    }
}

struct LevelMetadata(&'static str);

impl Serialize for LevelMetadata {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry("level", self.0)?;
        map.end()
    }
}

/// Serializes a batch as a single stream under `labels`, in append order.
///
/// # Errors
///
/// Only if serde_json fails to write, which does not happen for these types
/// in practice.
pub fn encode_batch(labels: &Labels, batch: &Batch) -> Result<Vec<u8>, serde_json::Error> {
    encode_entries(labels, batch.entries())
}

/// Serializes entries as a single stream under `labels`.
///
/// # Errors
///
/// See [`encode_batch`].
pub fn encode_entries(labels: &Labels, entries: &[LogEntry]) -> Result<Vec<u8>, serde_json::Error> {
    let request = PushRequest {
        streams: vec![PushStream {
            stream: labels,
            values: entries.iter().map(PushValue).collect(),
        }],
    };
    serde_json::to_vec(&request)
}
