// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use regex::Regex;
use reqwest::Url;
use std::env;
use std::sync::OnceLock;
use std::time::Duration;

use crate::error::ConfigError;
use crate::payload::Labels;

pub const PUSH_PATH: &str = "/loki/api/v1/push";
pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(5000);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_JOB: &str = "loki-shipper";

/// Configuration for a [`crate::shipper::LokiShipper`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShipperConfig {
    /// Base URL of the Loki instance, e.g. `http://localhost:3100`. A full
    /// push URL ending in `/loki/api/v1/push` is accepted as well.
    pub push_url: String,
    /// Buffer length that triggers a flush before the interval elapses.
    pub batch_size: usize,
    pub flush_interval: Duration,
    /// Labels attached to every stream this shipper pushes.
    pub static_labels: Labels,
    /// Emit per-batch diagnostics. Never changes what is shipped.
    pub verbose: bool,
    /// Timeout for a single push request.
    pub timeout: Duration,
    pub https_proxy: Option<String>,
}

impl ShipperConfig {
    /// Creates a configuration with the default batching settings and a
    /// single `job` label set to `app_name`.
    #[must_use]
    pub fn new(push_url: impl Into<String>, app_name: &str) -> Self {
        Self {
            push_url: push_url.into(),
            batch_size: DEFAULT_BATCH_SIZE,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            static_labels: Labels::from([("job".to_string(), app_name.to_string())]),
            verbose: false,
            timeout: DEFAULT_TIMEOUT,
            https_proxy: None,
        }
    }

    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.static_labels.insert(key.into(), value.into());
        self
    }

    /// Create configuration from environment variables
    ///
    /// # Errors
    ///
    /// See [`ShipperConfig::from_lookup`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds and validates a configuration from a variable lookup.
    ///
    /// | variable | meaning |
    /// |---|---|
    /// | `LOKI_PUSH_URL` | base URL, required |
    /// | `LOKI_BATCH_SIZE` | entries per size-triggered flush |
    /// | `LOKI_FLUSH_INTERVAL_MS` | flush interval in milliseconds |
    /// | `LOKI_JOB` | value of the `job` label |
    /// | `LOKI_LABELS` | extra labels, `key:value,key2:value2` |
    /// | `LOKI_VERBOSE` | `true` to emit per-batch diagnostics |
    /// | `LOKI_TIMEOUT_MS` | push request timeout in milliseconds |
    /// | `LOKI_PROXY_HTTPS`, `HTTPS_PROXY` | proxy for HTTPS requests |
    ///
    /// # Errors
    ///
    /// A [`ConfigError`] for a missing URL, unparsable numbers or labels, or
    /// anything [`ShipperConfig::validate`] rejects.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let push_url = lookup("LOKI_PUSH_URL")
            .filter(|url| !url.trim().is_empty())
            .ok_or(ConfigError::MissingPushUrl)?;
        let job = lookup("LOKI_JOB").unwrap_or_else(|| DEFAULT_JOB.to_string());

        let mut config = Self::new(push_url.trim(), &job);

        if let Some(value) = lookup("LOKI_BATCH_SIZE") {
            config.batch_size = parse_number("LOKI_BATCH_SIZE", &value)?;
        }
        if let Some(value) = lookup("LOKI_FLUSH_INTERVAL_MS") {
            config.flush_interval =
                Duration::from_millis(parse_number("LOKI_FLUSH_INTERVAL_MS", &value)?);
        }
        if let Some(value) = lookup("LOKI_TIMEOUT_MS") {
            config.timeout = Duration::from_millis(parse_number("LOKI_TIMEOUT_MS", &value)?);
        }
        if let Some(value) = lookup("LOKI_LABELS") {
            config.static_labels.extend(parse_labels(&value)?);
        }
        config.verbose = lookup("LOKI_VERBOSE")
            .map(|val| matches!(val.to_lowercase().as_str(), "true" | "1" | "yes"))
            .unwrap_or(false);
        config.https_proxy = lookup("LOKI_PROXY_HTTPS").or_else(|| lookup("HTTPS_PROXY"));

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// The first problem found, as a [`ConfigError`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = Url::parse(&self.push_url).map_err(|e| ConfigError::InvalidPushUrl {
            url: self.push_url.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidPushUrl {
                url: self.push_url.clone(),
                reason: format!("unsupported scheme '{}'", url.scheme()),
            });
        }
        if url.host_str().is_none() {
            return Err(ConfigError::InvalidPushUrl {
                url: self.push_url.clone(),
                reason: "missing host".to_string(),
            });
        }

        if self.batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        if self.flush_interval.is_zero() {
            return Err(ConfigError::ZeroFlushInterval);
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }

        if let Some(name) = self.static_labels.keys().find(|k| !is_valid_label_name(k)) {
            return Err(ConfigError::InvalidLabel(name.clone()));
        }

        Ok(())
    }

    /// Base URL with any trailing slash or push path removed.
    #[must_use]
    pub fn base_url(&self) -> &str {
        let trimmed = self.push_url.trim_end_matches('/');
        trimmed.strip_suffix(PUSH_PATH).unwrap_or(trimmed)
    }

    #[must_use]
    pub fn push_endpoint(&self) -> String {
        format!("{}{PUSH_PATH}", self.base_url())
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        name: name.to_string(),
        value: value.to_string(),
    })
}

fn parse_labels(value: &str) -> Result<Labels, ConfigError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once(':') {
            Some((k, v)) if !k.trim().is_empty() => {
                Ok((k.trim().to_string(), v.trim().to_string()))
            }
            _ => Err(ConfigError::InvalidValue {
                name: "LOKI_LABELS".to_string(),
                value: pair.to_string(),
            }),
        })
        .collect()
}

fn is_valid_label_name(name: &str) -> bool {
    static LABEL_NAME: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::expect_used)]
    let re = LABEL_NAME
        .get_or_init(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").expect("label regex is valid"));
    re.is_match(name)
}
