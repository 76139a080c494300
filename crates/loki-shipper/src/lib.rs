// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! # Loki shipper
//!
//! Client-side batching for the Grafana Loki push API.
//!
//! Producers append lines through a [`ShipperHandle`] without ever touching
//! the network. A single background dispatcher turns the buffer into push
//! requests when it reaches the batch size, when the flush interval elapses,
//! or when shutdown is requested, whichever comes first.
//!
//! - [`shipper`]: assembly and the producer handle
//! - [`buffer`], [`trigger`], [`dispatcher`]: the batching engine
//! - [`payload`], [`transport`]: wire format and delivery
//! - [`direct`]: unbuffered one-request-per-line sender
//! - [`query`]: readiness check and `query_range`
//! - [`layer`]: `tracing` integration
//!
//! Delivery is at-most-once. Entries still buffered when the process is
//! killed without a graceful shutdown are lost.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]
#![deny(unused_extern_crates)]

pub mod buffer;
pub mod config;
pub mod direct;
pub mod dispatcher;
pub mod entry;
pub mod error;
pub mod http;
pub mod layer;
pub mod payload;
pub mod query;
pub mod shipper;
pub mod stats;
pub mod transport;
pub mod trigger;

pub use config::ShipperConfig;
pub use direct::DirectSender;
pub use dispatcher::DispatcherState;
pub use entry::{Batch, Level, LogEntry};
pub use error::{ConfigError, ShipperError, TransportError};
pub use layer::LokiLayer;
pub use query::{Direction, QueriedEntry, QueryClient, QueryPage, QueryRequest};
pub use shipper::{LokiShipper, ShipperHandle};
pub use stats::StatsSnapshot;
pub use transport::{HttpTransport, Transport};
