// ── Runtime controller configuration ──
//
// These types describe *how* to talk to one OpenSprinkler controller.
// They carry the credential and the timing knobs but never touch disk;
// the CLI (via sprinkly-config) constructs a `ControllerConfig` and hands
// it in.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::error::CoreError;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_ERROR_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(120);
pub const DEFAULT_ZONE_DURATION_SECS: u32 = 60;
pub const DEFAULT_RAIN_DELAY_HOURS: u32 = 1;
pub const DEFAULT_COMMAND_RETRIES: u32 = 3;
pub const DEFAULT_COMMAND_RETRY_CAP: Duration = Duration::from_secs(2);
pub const DEFAULT_MQTT_PORT: u16 = 1883;

/// Push-channel (MQTT) settings.
///
/// Broker host and port are optional: when unset, the values the
/// controller reports in `settings.mqtt` are used.
#[derive(Debug, Clone)]
pub struct PushSettings {
    pub enabled: bool,
    pub broker_host: Option<String>,
    pub broker_port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    pub topic_prefix: String,
    pub client_id: String,
}

impl Default for PushSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            broker_host: None,
            broker_port: None,
            username: None,
            password: None,
            topic_prefix: sprinkly_api::push::DEFAULT_TOPIC_PREFIX.into(),
            client_id: "sprinkly".into(),
        }
    }
}

/// Configuration for one controller instance.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// `host[:port]` or a full `http://` URL.
    pub host: String,
    /// Device password, sent as `pw` on every request.
    pub password: SecretString,
    /// Delay between successful polls.
    pub poll_interval: Duration,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Base delay for poll and command backoff.
    pub error_interval: Duration,
    /// Upper bound on poll backoff.
    pub max_backoff: Duration,
    /// Run time used when an intent doesn't specify one (seconds).
    pub default_zone_duration: u32,
    pub default_rain_delay_hours: u32,
    /// Retries after the first attempt for transport-level command failures.
    pub command_retries: u32,
    /// Upper bound on the delay between command retries.
    pub command_retry_cap: Duration,
    pub push: Option<PushSettings>,
}

impl ControllerConfig {
    pub fn new(host: impl Into<String>, password: SecretString) -> Self {
        Self {
            host: host.into(),
            password,
            poll_interval: DEFAULT_POLL_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            error_interval: DEFAULT_ERROR_INTERVAL,
            max_backoff: DEFAULT_MAX_BACKOFF,
            default_zone_duration: DEFAULT_ZONE_DURATION_SECS,
            default_rain_delay_hours: DEFAULT_RAIN_DELAY_HOURS,
            command_retries: DEFAULT_COMMAND_RETRIES,
            command_retry_cap: DEFAULT_COMMAND_RETRY_CAP,
            push: None,
        }
    }

    /// Reject configurations the engine cannot start with.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.host.trim().is_empty() {
            return Err(CoreError::config("no host configured"));
        }
        if self.password.expose_secret().is_empty() {
            return Err(CoreError::config("no password configured"));
        }
        if self.poll_interval.is_zero() {
            return Err(CoreError::config("poll interval must be greater than zero"));
        }
        if self.error_interval.is_zero() {
            return Err(CoreError::config("error interval must be greater than zero"));
        }
        Ok(())
    }

    /// Push settings, if configured and enabled.
    pub fn push_settings(&self) -> Option<&PushSettings> {
        self.push.as_ref().filter(|p| p.enabled)
    }
}
