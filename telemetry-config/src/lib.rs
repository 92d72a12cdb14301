//! Configuration for the telemetry publisher.
//!
//! Values come from the process environment (see [`TelemetryConfig::from_env`])
//! or from any key lookup, and are adjusted with builder-style setters.

#![warn(missing_docs, clippy::pedantic)]

use std::env;
use std::fmt;
use std::num::NonZeroUsize;
use std::str::FromStr;
use std::time::Duration;

use http::Uri;
use thiserror::Error;
use tracing::debug;

/// Collector base URL, e.g. `https://collector.internal`.
pub const COLLECTOR_URL_ENV: &str = "TELEMETRY_COLLECTOR_URL";
/// Bearer token sent with each batch.
pub const AUTH_TOKEN_ENV: &str = "TELEMETRY_AUTH_TOKEN";
/// Master switch (`true`/`false`, `1`/`0`, `yes`/`no`, `on`/`off`).
pub const ENABLED_ENV: &str = "TELEMETRY_ENABLED";
/// Events per batch.
pub const BATCH_SIZE_ENV: &str = "TELEMETRY_BATCH_SIZE";
/// Timer-driven flush period in milliseconds.
pub const FLUSH_INTERVAL_ENV: &str = "TELEMETRY_FLUSH_INTERVAL_MS";
/// Queue capacity.
pub const MAX_QUEUE_SIZE_ENV: &str = "TELEMETRY_MAX_QUEUE_SIZE";
/// Per-attempt delivery timeout in milliseconds.
pub const TIMEOUT_ENV: &str = "TELEMETRY_TIMEOUT_MS";
/// Whether a failed batch gets one more attempt.
pub const RETRY_ONCE_ENV: &str = "TELEMETRY_RETRY_ONCE";
/// Pause before the retry in milliseconds.
pub const RETRY_DELAY_ENV: &str = "TELEMETRY_RETRY_DELAY_MS";
/// Bound on waiting for the flush loop at shutdown, in milliseconds.
pub const SHUTDOWN_TIMEOUT_ENV: &str = "TELEMETRY_SHUTDOWN_TIMEOUT_MS";
/// Path appended to the collector base URL.
pub const COLLECTOR_PATH_ENV: &str = "TELEMETRY_COLLECTOR_PATH";
/// Envelope `source` value identifying this process.
pub const SOURCE_ENV: &str = "TELEMETRY_SOURCE";

const DEFAULT_PATH: &str = "/v1/events/batch";
const DEFAULT_SOURCE: &str = "chat-service";
const DEFAULT_BATCH_SIZE: NonZeroUsize = non_zero(20);
const DEFAULT_MAX_QUEUE_SIZE: NonZeroUsize = non_zero(1000);

const fn non_zero(n: usize) -> NonZeroUsize {
    match NonZeroUsize::new(n) {
        Some(n) => n,
        None => NonZeroUsize::MIN,
    }
}

/// Result alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A variable was present but could not be parsed.
    #[error("invalid value `{value}` for {key}: {reason}")]
    InvalidValue {
        /// Variable name.
        key: &'static str,
        /// Raw value as found.
        value: String,
        /// Parse failure description.
        reason: String,
    },
    /// The assembled configuration is inconsistent.
    #[error("invalid telemetry configuration: {0}")]
    Invalid(&'static str),
}

/// Publisher and collector settings.
#[derive(Clone)]
pub struct TelemetryConfig {
    collector_url: Option<String>,
    collector_path: String,
    auth_token: Option<String>,
    enabled: bool,
    batch_size: NonZeroUsize,
    flush_interval: Duration,
    max_queue_size: NonZeroUsize,
    delivery_timeout: Duration,
    retry_once: bool,
    retry_delay: Duration,
    shutdown_timeout: Duration,
    source: String,
}

impl fmt::Debug for TelemetryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelemetryConfig")
            .field("collector_url", &self.collector_url)
            .field("collector_path", &self.collector_path)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .field("enabled", &self.enabled)
            .field("batch_size", &self.batch_size)
            .field("flush_interval", &self.flush_interval)
            .field("max_queue_size", &self.max_queue_size)
            .field("delivery_timeout", &self.delivery_timeout)
            .field("retry_once", &self.retry_once)
            .field("retry_delay", &self.retry_delay)
            .field("shutdown_timeout", &self.shutdown_timeout)
            .field("source", &self.source)
            .finish()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            collector_url: None,
            collector_path: DEFAULT_PATH.to_owned(),
            auth_token: None,
            enabled: false,
            batch_size: DEFAULT_BATCH_SIZE,
            flush_interval: Duration::from_secs(2),
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
            delivery_timeout: Duration::from_secs(3),
            retry_once: true,
            retry_delay: Duration::from_millis(200),
            shutdown_timeout: Duration::from_secs(5),
            source: DEFAULT_SOURCE.to_owned(),
        }
    }
}

impl TelemetryConfig {
    /// Creates an enabled configuration pointing at the given collector.
    #[must_use]
    pub fn new(collector_url: impl Into<String>) -> Self {
        Self {
            collector_url: Some(collector_url.into()),
            enabled: true,
            ..Self::default()
        }
    }

    /// Loads configuration from the process environment.
    ///
    /// Telemetry stays disabled unless a collector URL is present; setting
    /// `TELEMETRY_ENABLED=false` disables it even then.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] when a variable cannot be parsed.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Loads configuration through an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] when a value cannot be parsed.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };

        let mut cfg = Self::default();
        cfg.collector_url = get(COLLECTOR_URL_ENV);
        cfg.auth_token = get(AUTH_TOKEN_ENV);
        cfg.enabled = match get(ENABLED_ENV) {
            Some(raw) => parse_bool(ENABLED_ENV, &raw)?,
            None => cfg.collector_url.is_some(),
        };
        if let Some(raw) = get(BATCH_SIZE_ENV) {
            cfg.batch_size = parse_number(BATCH_SIZE_ENV, &raw)?;
        }
        if let Some(raw) = get(FLUSH_INTERVAL_ENV) {
            cfg.flush_interval = parse_millis(FLUSH_INTERVAL_ENV, &raw)?;
        }
        if let Some(raw) = get(MAX_QUEUE_SIZE_ENV) {
            cfg.max_queue_size = parse_number(MAX_QUEUE_SIZE_ENV, &raw)?;
        }
        if let Some(raw) = get(TIMEOUT_ENV) {
            cfg.delivery_timeout = parse_millis(TIMEOUT_ENV, &raw)?;
        }
        if let Some(raw) = get(RETRY_ONCE_ENV) {
            cfg.retry_once = parse_bool(RETRY_ONCE_ENV, &raw)?;
        }
        if let Some(raw) = get(RETRY_DELAY_ENV) {
            cfg.retry_delay = parse_millis(RETRY_DELAY_ENV, &raw)?;
        }
        if let Some(raw) = get(SHUTDOWN_TIMEOUT_ENV) {
            cfg.shutdown_timeout = parse_millis(SHUTDOWN_TIMEOUT_ENV, &raw)?;
        }
        if let Some(path) = get(COLLECTOR_PATH_ENV) {
            cfg.collector_path = path;
        }
        if let Some(source) = get(SOURCE_ENV) {
            cfg.source = source;
        }

        debug!(config = ?cfg, "telemetry configuration loaded");
        Ok(cfg)
    }

    /// Overrides the collector base URL.
    #[must_use]
    pub fn with_collector_url(mut self, url: impl Into<String>) -> Self {
        self.collector_url = Some(url.into());
        self
    }

    /// Overrides the collector path.
    #[must_use]
    pub fn with_collector_path(mut self, path: impl Into<String>) -> Self {
        self.collector_path = path.into();
        self
    }

    /// Supplies the bearer token.
    #[must_use]
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Turns the publisher on or off.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Sets the number of events per batch.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: NonZeroUsize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Sets the timer-driven flush period.
    #[must_use]
    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    /// Sets the queue capacity.
    #[must_use]
    pub fn with_max_queue_size(mut self, size: NonZeroUsize) -> Self {
        self.max_queue_size = size;
        self
    }

    /// Sets the per-attempt delivery timeout.
    #[must_use]
    pub fn with_delivery_timeout(mut self, timeout: Duration) -> Self {
        self.delivery_timeout = timeout;
        self
    }

    /// Enables or disables the single retry.
    #[must_use]
    pub fn with_retry_once(mut self, retry_once: bool) -> Self {
        self.retry_once = retry_once;
        self
    }

    /// Sets the pause before the retry.
    #[must_use]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Sets how long `stop` waits for the flush loop.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Sets the envelope `source` value.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Returns the collector base URL.
    #[must_use]
    pub fn collector_url(&self) -> Option<&str> {
        self.collector_url.as_deref()
    }

    /// Returns the path appended to the base URL.
    #[must_use]
    pub fn collector_path(&self) -> &str {
        &self.collector_path
    }

    /// Returns the bearer token.
    #[must_use]
    pub fn auth_token(&self) -> Option<&str> {
        self.auth_token.as_deref()
    }

    /// Returns whether publishing is enabled.
    #[must_use]
    pub const fn enabled(&self) -> bool {
        self.enabled
    }

    /// Returns the batch size.
    #[must_use]
    pub const fn batch_size(&self) -> NonZeroUsize {
        self.batch_size
    }

    /// Returns the flush interval.
    #[must_use]
    pub const fn flush_interval(&self) -> Duration {
        self.flush_interval
    }

    /// Returns the queue capacity.
    #[must_use]
    pub const fn max_queue_size(&self) -> NonZeroUsize {
        self.max_queue_size
    }

    /// Returns the per-attempt delivery timeout.
    #[must_use]
    pub const fn delivery_timeout(&self) -> Duration {
        self.delivery_timeout
    }

    /// Returns whether a failed batch is retried once.
    #[must_use]
    pub const fn retry_once(&self) -> bool {
        self.retry_once
    }

    /// Returns the pause before the retry.
    #[must_use]
    pub const fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    /// Returns the shutdown wait bound.
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    /// Returns the envelope source.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Returns the full batch endpoint, joining base URL and path.
    #[must_use]
    pub fn endpoint(&self) -> Option<String> {
        let base = self.collector_url.as_deref()?.trim_end_matches('/');
        let path = self.collector_path.trim_start_matches('/');
        Some(format!("{base}/{path}"))
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a duration is zero, the batch is
    /// larger than the queue, the source is empty, or an enabled configuration
    /// lacks a usable http(s) collector URL.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.flush_interval.is_zero() {
            return Err(ConfigError::Invalid("flush interval must be greater than zero"));
        }
        if self.delivery_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "delivery timeout must be greater than zero",
            ));
        }
        if self.shutdown_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "shutdown timeout must be greater than zero",
            ));
        }
        if self.batch_size > self.max_queue_size {
            return Err(ConfigError::Invalid(
                "batch size cannot exceed max queue size",
            ));
        }
        if self.source.trim().is_empty() {
            return Err(ConfigError::Invalid("source cannot be empty"));
        }
        if let Some(url) = self.collector_url.as_deref() {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::Invalid(
                    "collector URL must start with http:// or https://",
                ));
            }
            let endpoint = self.endpoint().unwrap_or_default();
            if endpoint.parse::<Uri>().is_err() {
                return Err(ConfigError::Invalid("collector endpoint is not a valid URI"));
            }
        } else if self.enabled {
            return Err(ConfigError::Invalid(
                "telemetry is enabled but no collector URL is configured",
            ));
        }
        Ok(())
    }
}

fn parse_bool(key: &'static str, raw: &str) -> ConfigResult<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: raw.to_owned(),
            reason: "expected a boolean".into(),
        }),
    }
}

fn parse_number<T>(key: &'static str, raw: &str) -> ConfigResult<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    raw.parse::<T>().map_err(|err| ConfigError::InvalidValue {
        key,
        value: raw.to_owned(),
        reason: err.to_string(),
    })
}

fn parse_millis(key: &'static str, raw: &str) -> ConfigResult<Duration> {
    parse_number::<u64>(key, raw).map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_disabled_and_valid() {
        let cfg = TelemetryConfig::from_lookup(lookup(&[])).unwrap();
        assert!(!cfg.enabled());
        assert_eq!(cfg.batch_size().get(), 20);
        assert_eq!(cfg.max_queue_size().get(), 1000);
        assert!(cfg.retry_once());
        cfg.validate().unwrap();
    }

    #[test]
    fn url_presence_enables_by_default() {
        let cfg = TelemetryConfig::from_lookup(lookup(&[(
            COLLECTOR_URL_ENV,
            "https://collector.example",
        )]))
        .unwrap();
        assert!(cfg.enabled());
        assert_eq!(
            cfg.endpoint().as_deref(),
            Some("https://collector.example/v1/events/batch")
        );
    }

    #[test]
    fn explicit_flag_overrides_url_presence() {
        let cfg = TelemetryConfig::from_lookup(lookup(&[
            (COLLECTOR_URL_ENV, "https://collector.example"),
            (ENABLED_ENV, "off"),
        ]))
        .unwrap();
        assert!(!cfg.enabled());
    }

    #[test]
    fn parses_numeric_overrides() {
        let cfg = TelemetryConfig::from_lookup(lookup(&[
            (COLLECTOR_URL_ENV, "http://localhost:9000/"),
            (BATCH_SIZE_ENV, "50"),
            (FLUSH_INTERVAL_ENV, "750"),
            (MAX_QUEUE_SIZE_ENV, "5000"),
            (TIMEOUT_ENV, "1500"),
            (RETRY_ONCE_ENV, "false"),
            (SOURCE_ENV, "gateway-1"),
            (AUTH_TOKEN_ENV, "secret"),
        ]))
        .unwrap();
        assert_eq!(cfg.batch_size().get(), 50);
        assert_eq!(cfg.flush_interval(), Duration::from_millis(750));
        assert_eq!(cfg.max_queue_size().get(), 5000);
        assert_eq!(cfg.delivery_timeout(), Duration::from_millis(1500));
        assert!(!cfg.retry_once());
        assert_eq!(cfg.source(), "gateway-1");
        assert_eq!(cfg.auth_token(), Some("secret"));
        assert_eq!(
            cfg.endpoint().as_deref(),
            Some("http://localhost:9000/v1/events/batch")
        );
        cfg.validate().unwrap();
    }

    #[test]
    fn rejects_unparseable_values() {
        let err = TelemetryConfig::from_lookup(lookup(&[(BATCH_SIZE_ENV, "0")])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: BATCH_SIZE_ENV,
                ..
            }
        ));

        let err = TelemetryConfig::from_lookup(lookup(&[(ENABLED_ENV, "maybe")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: ENABLED_ENV, .. }));
    }

    #[test]
    fn validation_catches_inconsistencies() {
        let enabled_without_url = TelemetryConfig::default().with_enabled(true);
        assert!(enabled_without_url.validate().is_err());

        let bad_scheme = TelemetryConfig::new("collector.example");
        assert!(bad_scheme.validate().is_err());

        let batch_too_big = TelemetryConfig::new("https://c.example")
            .with_batch_size(NonZeroUsize::new(10).unwrap())
            .with_max_queue_size(NonZeroUsize::new(5).unwrap());
        assert_eq!(
            batch_too_big.validate().unwrap_err(),
            ConfigError::Invalid("batch size cannot exceed max queue size")
        );

        let zero_interval = TelemetryConfig::new("https://c.example")
            .with_flush_interval(Duration::ZERO);
        assert!(zero_interval.validate().is_err());
    }

    #[test]
    fn debug_redacts_token() {
        let cfg = TelemetryConfig::new("https://c.example").with_auth_token("hunter2");
        let rendered = format!("{cfg:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }
}
