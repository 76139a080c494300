// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! `tracing` layer that ships application events through a shipper.
//!
//! ```rust,ignore
//! use tracing_subscriber::prelude::*;
//!
//! let handle = LokiShipper::from_config(ShipperConfig::from_env()?)?;
//! tracing_subscriber::registry()
//!     .with(tracing_subscriber::fmt::layer())
//!     .with(LokiLayer::new(handle.clone()))
//!     .init();
//!
//! tracing::info!(user = 42, "logged in");   // ships "logged in user=42 target=my_app"
//! ```

use std::fmt::{self, Write};
use tracing::field::{Field, Visit};
use tracing_core::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

use crate::entry::Level;
use crate::shipper::ShipperHandle;

/// Targets whose events would otherwise be shipped while shipping.
const IGNORED_TARGETS: &[&str] = &["loki_shipper", "reqwest", "hyper", "h2", "rustls"];

#[derive(Clone)]
pub struct LokiLayer {
    handle: ShipperHandle,
}

impl LokiLayer {
    #[must_use]
    pub fn new(handle: ShipperHandle) -> Self {
        Self { handle }
    }
}

impl<S> Layer<S> for LokiLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if is_ignored(metadata.target()) {
            return;
        }

        let mut visitor = LineVisitor::default();
        event.record(&mut visitor);
        visitor.push_field("target", format_args!("{}", metadata.target()));

        // Rejection after shutdown is already counted by the handle.
        let _ = self
            .handle
            .append_with_level(Level::from(*metadata.level()), visitor.finish());
    }
}

fn is_ignored(target: &str) -> bool {
    IGNORED_TARGETS.iter().any(|ignored| {
        target == *ignored
            || target
                .strip_prefix(ignored)
                .is_some_and(|rest| rest.starts_with("::"))
    })
}

/// Renders `message` first, then the other fields as `key=value`, then the
/// event's `target` so the calling module can be found from the line.
#[derive(Default)]
struct LineVisitor {
    message: String,
    fields: String,
}

impl LineVisitor {
    fn finish(self) -> String {
        match (self.message.is_empty(), self.fields.is_empty()) {
            (_, true) => self.message,
            (true, false) => self.fields,
            (false, false) => format!("{} {}", self.message, self.fields),
        }
    }

    fn push_field(&mut self, name: &str, value: fmt::Arguments<'_>) {
        if !self.fields.is_empty() {
            self.fields.push(' ');
        }
        let _ = write!(self.fields, "{name}={value}");
    }
}

impl Visit for LineVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            self.push_field(field.name(), format_args!("{value}"));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{value:?}");
        } else {
            self.push_field(field.name(), format_args!("{value:?}"));
        }
    }
}
