//! Bridges `sprinkly-config` profiles and global CLI flags into a
//! `ControllerConfig`.
//!
//! Flags win over the profile; with no profile at all, `--host` and
//! `--password` alone are enough.

use secrecy::SecretString;

use sprinkly_config::{Config, Profile};
use sprinkly_core::ControllerConfig;

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Name of the profile this invocation targets.
pub fn active_profile_name(global: &GlobalOpts, cfg: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| cfg.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Comma-separated profile names for diagnostics.
pub fn available_profiles(cfg: &Config) -> String {
    if cfg.profiles.is_empty() {
        "(none)".into()
    } else {
        cfg.profiles.keys().cloned().collect::<Vec<_>>().join(", ")
    }
}

/// Build a `ControllerConfig` from the config file, profile, and CLI overrides.
pub fn build_controller_config(
    global: &GlobalOpts,
    cfg: &Config,
) -> Result<(String, ControllerConfig), CliError> {
    let profile_name = active_profile_name(global, cfg);

    let mut profile = match cfg.profiles.get(&profile_name) {
        Some(profile) => profile.clone(),
        // An explicitly requested profile must exist.
        None if global.profile.is_some() => {
            return Err(CliError::ProfileNotFound {
                name: profile_name,
                available: available_profiles(cfg),
            });
        }
        None if global.host.is_none() => {
            return Err(CliError::NoConfig {
                path: sprinkly_config::config_path().display().to_string(),
            });
        }
        None => Profile::default(),
    };

    if let Some(ref host) = global.host {
        profile.host.clone_from(host);
    }
    if let Some(timeout) = global.timeout {
        profile.timeout = Some(timeout);
    }

    let password = match global.password {
        Some(ref pw) => SecretString::from(pw.clone()),
        None => sprinkly_config::resolve_password(&profile, &profile_name)?,
    };

    let config = sprinkly_config::build_controller_config(&profile, password, &cfg.defaults)?;
    Ok((profile_name, config))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::cli::{ColorMode, OutputFormat};
    use std::time::Duration;

    fn global() -> GlobalOpts {
        GlobalOpts {
            profile: None,
            host: None,
            password: None,
            output: OutputFormat::Table,
            color: ColorMode::Never,
            verbose: 0,
            log_json: false,
            quiet: false,
            timeout: None,
        }
    }

    fn with_profile() -> Config {
        let mut cfg = Config::default();
        cfg.profiles.insert(
            "default".into(),
            Profile {
                host: "10.0.0.5".into(),
                password: Some("opendoor".into()),
                poll_interval: Some(10),
                ..Profile::default()
            },
        );
        cfg
    }

    #[test]
    fn flags_alone_are_enough() {
        let mut g = global();
        g.host = Some("192.168.1.20".into());
        g.password = Some("opendoor".into());

        let (name, config) = build_controller_config(&g, &Config::default()).unwrap();
        assert_eq!(name, "default");
        assert_eq!(config.host, "192.168.1.20");
    }

    #[test]
    fn host_flag_overrides_profile() {
        let mut g = global();
        g.host = Some("os.local".into());
        g.password = Some("other".into());
        g.timeout = Some(3);

        let (_, config) = build_controller_config(&g, &with_profile()).unwrap();
        assert_eq!(config.host, "os.local");
        assert_eq!(config.poll_interval, Duration::from_secs(10));
        assert_eq!(config.request_timeout, Duration::from_secs(3));
    }

    #[test]
    fn missing_everything_is_no_config() {
        let err = build_controller_config(&global(), &Config::default()).unwrap_err();
        assert!(matches!(err, CliError::NoConfig { .. }));
    }

    #[test]
    fn unknown_explicit_profile_lists_available() {
        let mut g = global();
        g.profile = Some("garden".into());
        let err = build_controller_config(&g, &with_profile()).unwrap_err();
        match err {
            CliError::ProfileNotFound { name, available } => {
                assert_eq!(name, "garden");
                assert_eq!(available, "default");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
