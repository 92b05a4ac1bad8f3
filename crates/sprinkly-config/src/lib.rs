//! Shared configuration for the sprinkly CLI.
//!
//! TOML profiles, credential resolution (env + keyring + plaintext),
//! and translation to `sprinkly_core::ControllerConfig`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use sprinkly_core::config::{
    DEFAULT_COMMAND_RETRIES, DEFAULT_ERROR_INTERVAL, DEFAULT_MAX_BACKOFF, DEFAULT_POLL_INTERVAL,
    DEFAULT_RAIN_DELAY_HOURS, DEFAULT_REQUEST_TIMEOUT, DEFAULT_ZONE_DURATION_SECS,
};
use sprinkly_core::{ControllerConfig, PushSettings};

/// Keyring service name for stored device passwords.
pub const KEYRING_SERVICE: &str = "sprinkly";

/// Environment variable consulted before the keyring.
pub const PASSWORD_ENV: &str = "SPRINKLY_PASSWORD";

const ENV_PREFIX: &str = "SPRINKLY_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{name}' not found")]
    UnknownProfile { name: String },

    #[error("no password configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named controller profiles.
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Look up a profile by name, falling back to `default_profile`.
    pub fn profile(&self, name: Option<&str>) -> Result<(String, &Profile), ConfigError> {
        let name = name
            .map(str::to_owned)
            .or_else(|| self.default_profile.clone())
            .unwrap_or_else(|| "default".into());
        match self.profiles.get(&name) {
            Some(profile) => Ok((name, profile)),
            None => Err(ConfigError::UnknownProfile { name }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Delay between polls in seconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            timeout: default_timeout(),
            poll_interval: default_poll_interval(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT.as_secs()
}
fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL.as_secs()
}

/// A named controller profile.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct Profile {
    /// Controller address (e.g., "192.168.1.20" or "http://os.local:8080").
    pub host: String,

    /// Device password (plaintext -- prefer keyring or env var).
    pub password: Option<String>,

    /// Environment variable name containing the password.
    pub password_env: Option<String>,

    /// Override request timeout (seconds).
    pub timeout: Option<u64>,

    /// Override poll interval (seconds).
    pub poll_interval: Option<u64>,

    /// Base retry delay after a failure (seconds).
    pub error_interval: Option<u64>,

    /// Upper bound on poll backoff (seconds).
    pub max_backoff: Option<u64>,

    /// Default zone/program run time (seconds).
    pub zone_duration: Option<u32>,

    /// Default rain delay (hours).
    pub rain_delay_hours: Option<u32>,

    /// Retries for commands that fail in transport.
    pub command_retries: Option<u32>,

    /// MQTT push channel.
    pub mqtt: Option<MqttProfile>,
}

/// MQTT settings for a profile.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct MqttProfile {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Broker host; the controller's own MQTT settings are used when unset.
    pub broker: Option<String>,

    pub port: Option<u16>,

    pub username: Option<String>,

    pub password: Option<String>,

    pub topic_prefix: Option<String>,

    pub client_id: Option<String>,
}

fn default_true() -> bool {
    true
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "sprinkly", "sprinkly").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("sprinkly");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load the full Config from `path` + environment.
///
/// A missing file is not an error; the defaults and environment still apply.
/// Environment keys nest on `__`, e.g. `SPRINKLY_DEFAULTS__OUTPUT=json`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__").ignore(&["password"]));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if loading fails.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write it to `path`.
pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve the device password from the credential chain.
pub fn resolve_password(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    // 1. Profile's password_env, then the global env var
    let env_names = profile.password_env.iter().map(String::as_str).chain([PASSWORD_ENV]);
    for env_name in env_names {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(SecretString::from(val));
        }
    }

    // 2. System keyring
    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/password")) {
        if let Ok(secret) = entry.get_password() {
            return Ok(SecretString::from(secret));
        }
    }

    // 3. Plaintext in config
    if let Some(ref pw) = profile.password {
        return Ok(SecretString::from(pw.clone()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

/// Build a `ControllerConfig` from a profile, resolving the password.
pub fn profile_to_controller_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<ControllerConfig, ConfigError> {
    let password = resolve_password(profile, profile_name)?;
    build_controller_config(profile, password, defaults)
}

/// Build a `ControllerConfig` from a profile with an already-resolved password.
pub fn build_controller_config(
    profile: &Profile,
    password: SecretString,
    defaults: &Defaults,
) -> Result<ControllerConfig, ConfigError> {
    if profile.host.trim().is_empty() {
        return Err(ConfigError::Validation {
            field: "host".into(),
            reason: "must not be empty".into(),
        });
    }

    let poll_interval = profile.poll_interval.unwrap_or(defaults.poll_interval);
    if poll_interval == 0 {
        return Err(ConfigError::Validation {
            field: "poll_interval".into(),
            reason: "must be at least 1 second".into(),
        });
    }

    let mut config = ControllerConfig::new(profile.host.trim(), password);
    config.poll_interval = Duration::from_secs(poll_interval);
    config.request_timeout = Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout));
    config.error_interval = profile
        .error_interval
        .map_or(DEFAULT_ERROR_INTERVAL, Duration::from_secs);
    config.max_backoff = profile
        .max_backoff
        .map_or(DEFAULT_MAX_BACKOFF, Duration::from_secs);
    config.default_zone_duration = profile.zone_duration.unwrap_or(DEFAULT_ZONE_DURATION_SECS);
    config.default_rain_delay_hours = profile.rain_delay_hours.unwrap_or(DEFAULT_RAIN_DELAY_HOURS);
    config.command_retries = profile.command_retries.unwrap_or(DEFAULT_COMMAND_RETRIES);
    config.push = profile.mqtt.as_ref().map(push_settings);
    Ok(config)
}

fn push_settings(mqtt: &MqttProfile) -> PushSettings {
    let defaults = PushSettings::default();
    PushSettings {
        enabled: mqtt.enabled,
        broker_host: mqtt.broker.clone(),
        broker_port: mqtt.port,
        username: mqtt.username.clone(),
        password: mqtt.password.clone().map(SecretString::from),
        topic_prefix: mqtt.topic_prefix.clone().unwrap_or(defaults.topic_prefix),
        client_id: mqtt.client_id.clone().unwrap_or(defaults.client_id),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;

    const SAMPLE: &str = r#"
default_profile = "garden"

[defaults]
output = "json"

[profiles.garden]
host = "192.168.1.20"
password = "opendoor"
zone_duration = 300

[profiles.garden.mqtt]
broker = "broker.lan"
topic_prefix = "os-garden"

[profiles.patio]
host = "os-patio.local:8080"
"#;

    fn load(contents: &str) -> Config {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, contents).unwrap();
        load_config_from(&path).unwrap()
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.default_profile.as_deref(), Some("default"));
        assert_eq!(config.defaults.output, "table");
        assert_eq!(config.defaults.timeout, 15);
        assert!(config.profiles.is_empty());
    }

    #[test]
    fn profiles_load_from_toml() {
        let config = load(SAMPLE);
        assert_eq!(config.defaults.output, "json");
        assert_eq!(config.defaults.poll_interval, 5);

        let (name, profile) = config.profile(None).unwrap();
        assert_eq!(name, "garden");
        assert_eq!(profile.host, "192.168.1.20");
        assert_eq!(profile.zone_duration, Some(300));

        let mqtt = profile.mqtt.as_ref().unwrap();
        assert!(mqtt.enabled);
        assert_eq!(mqtt.broker.as_deref(), Some("broker.lan"));
    }

    #[test]
    fn unknown_profile_is_an_error() {
        let config = load(SAMPLE);
        assert!(matches!(
            config.profile(Some("orchard")),
            Err(ConfigError::UnknownProfile { .. })
        ));
    }

    #[test]
    fn controller_config_applies_overrides_and_defaults() {
        let config = load(SAMPLE);
        let (_, profile) = config.profile(Some("garden")).unwrap();
        let cfg =
            build_controller_config(profile, SecretString::from("pw"), &config.defaults).unwrap();

        assert_eq!(cfg.host, "192.168.1.20");
        assert_eq!(cfg.password.expose_secret(), "pw");
        assert_eq!(cfg.default_zone_duration, 300);
        assert_eq!(cfg.default_rain_delay_hours, 1);
        assert_eq!(cfg.poll_interval, Duration::from_secs(5));
        assert_eq!(cfg.request_timeout, Duration::from_secs(15));

        let push = cfg.push.unwrap();
        assert_eq!(push.broker_host.as_deref(), Some("broker.lan"));
        assert_eq!(push.topic_prefix, "os-garden");
        assert_eq!(push.client_id, "sprinkly");
    }

    #[test]
    fn blank_host_is_rejected() {
        let profile = Profile {
            host: "  ".into(),
            ..Profile::default()
        };
        let result = build_controller_config(&profile, SecretString::from("pw"), &Defaults::default());
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn save_round_trips_profiles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = load(SAMPLE);

        save_config_to(&config, &path).unwrap();
        assert_eq!(load_config_from(&path).unwrap(), config);
    }
}
