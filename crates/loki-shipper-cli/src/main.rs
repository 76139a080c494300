// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

//! Ships stdin to Loki, one entry per line.
//!
//! Configuration comes from the `LOKI_*` environment variables read by
//! [`ShipperConfig::from_env`]. A line starting with `[level] ` carries that
//! level. With `LOKI_DIRECT=true` every line is pushed on its own instead of
//! being batched.

use std::env;
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use loki_shipper::{DirectSender, Level, LokiShipper, ShipperConfig, ShipperHandle};

#[tokio::main]
pub async fn main() {
    let config = ShipperConfig::from_env();
    let verbose = config.as_ref().is_ok_and(|c| c.verbose);

    let log_level = if verbose {
        "debug".to_string()
    } else {
        env::var("LOKI_LOG_LEVEL")
            .map(|val| val.to_lowercase())
            .unwrap_or("info".to_string())
    };
    let env_filter = format!("h2=off,hyper=off,rustls=off,{}", log_level);

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .with_writer(std::io::stderr)
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}. Shutting down.", e);
            return;
        }
    };

    let direct = env::var("LOKI_DIRECT")
        .map(|val| val.to_lowercase() == "true")
        .unwrap_or(false);

    if direct {
        run_direct(&config).await;
    } else {
        run_batched(config).await;
    }
}

async fn run_batched(config: ShipperConfig) {
    let handle = match LokiShipper::from_config(config) {
        Ok(handle) => handle,
        Err(e) => {
            error!("Unable to start shipper: {}", e);
            return;
        }
    };
    info!("Shipping stdin to Loki");

    let mut lines = BufReader::new(io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => append_line(&handle, &line),
                Ok(None) => break,
                Err(e) => {
                    error!("Failed to read stdin: {}", e);
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                debug!("Interrupted, flushing buffered entries");
                break;
            }
        }
    }

    handle.shutdown().await;
    let stats = handle.stats();
    info!(
        "Shipped {} entries in {} batches, {} dropped",
        stats.entries_sent, stats.batches_sent, stats.entries_dropped
    );
}

fn append_line(handle: &ShipperHandle, line: &str) {
    let result = match split_level(line) {
        (Some(level), message) => handle.append_with_level(level, message),
        (None, message) => handle.append(message),
    };
    if let Err(e) = result {
        error!("Dropped line: {}", e);
    }
}

async fn run_direct(config: &ShipperConfig) {
    let sender = match DirectSender::from_config(config) {
        Ok(sender) => sender,
        Err(e) => {
            error!("Unable to start sender: {}", e);
            return;
        }
    };

    let mut lines = BufReader::new(io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let (level, message) = split_level(&line);
                // Failures are logged by the sender.
                let _ = sender
                    .send_log(level.unwrap_or(Level::Info), message)
                    .await;
            }
            Ok(None) => break,
            Err(e) => {
                error!("Failed to read stdin: {}", e);
                break;
            }
        }
    }
}

/// Splits a `[level] message` line. Lines without a known level prefix are
/// returned whole.
fn split_level(line: &str) -> (Option<Level>, &str) {
    line.strip_prefix('[')
        .and_then(|rest| rest.split_once("] "))
        .and_then(|(level, message)| level.parse::<Level>().ok().map(|level| (Some(level), message)))
        .unwrap_or((None, line))
}
