// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Shared mocks and helpers for the integration tests

pub mod mocks;

use loki_shipper::ShipperConfig;
use std::time::Duration;

/// Configuration for a shipper that is never meant to reach a real Loki.
#[allow(dead_code)]
pub fn test_config(batch_size: usize, flush_interval: Duration) -> ShipperConfig {
    let mut config = ShipperConfig::new("http://localhost:3100", "integration");
    config.batch_size = batch_size;
    config.flush_interval = flush_interval;
    config
}
