//! Config subcommand handlers.

use tabled::Tabled;

use sprinkly_config::{Config, KEYRING_SERVICE};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config;
use crate::error::CliError;
use crate::output;

const MASK: &str = "********";

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct ProfileRow {
    #[tabled(rename = "")]
    marker: String,
    #[tabled(rename = "Profile")]
    name: String,
    #[tabled(rename = "Host")]
    host: String,
    #[tabled(rename = "MQTT")]
    mqtt: String,
}

#[derive(serde::Serialize)]
struct ProfileEntry {
    name: String,
    host: String,
    default: bool,
    mqtt: bool,
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Copy of `cfg` with every stored secret replaced by a mask.
fn redacted(cfg: &Config) -> Config {
    let mut cfg = cfg.clone();
    for profile in cfg.profiles.values_mut() {
        if profile.password.is_some() {
            profile.password = Some(MASK.into());
        }
        if let Some(mqtt) = profile.mqtt.as_mut() {
            if mqtt.password.is_some() {
                mqtt.password = Some(MASK.into());
            }
        }
    }
    cfg
}

/// Map an interactive I/O failure into CliError.
fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "interactive".into(),
        reason: format!("prompt failed: {e}"),
    }
}

/// The `--password` value, or a no-echo prompt on the terminal.
fn read_secret(
    global: &GlobalOpts,
    prompt: impl FnOnce(&str) -> std::io::Result<String>,
) -> Result<String, CliError> {
    if let Some(ref pw) = global.password {
        return Ok(pw.clone());
    }
    prompt("Password: ").map_err(prompt_err)
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Show => {
            let cfg = redacted(&sprinkly_config::load_config()?);
            let out = output::render_single(
                global.output,
                &cfg,
                |c| format!("{c:#?}"),
                |_| sprinkly_config::config_path().display().to_string(),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Path => {
            let path = sprinkly_config::config_path();
            output::print_output(&path.display().to_string(), global.quiet);
            Ok(())
        }

        ConfigCommand::Profiles => {
            let cfg = sprinkly_config::load_config()?;
            let active = config::active_profile_name(global, &cfg);
            let entries: Vec<ProfileEntry> = cfg
                .profiles
                .iter()
                .map(|(name, p)| ProfileEntry {
                    name: name.clone(),
                    host: p.host.clone(),
                    default: *name == active,
                    mqtt: p.mqtt.as_ref().is_some_and(|m| m.enabled),
                })
                .collect();
            let out = output::render_list(
                global.output,
                &entries,
                |e| ProfileRow {
                    marker: if e.default { "*".into() } else { String::new() },
                    name: e.name.clone(),
                    host: e.host.clone(),
                    mqtt: if e.mqtt { "on".into() } else { "off".into() },
                },
                |e| e.name.clone(),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Use { name } => {
            let mut cfg = sprinkly_config::load_config()?;
            if !cfg.profiles.contains_key(&name) {
                return Err(CliError::ProfileNotFound {
                    available: config::available_profiles(&cfg),
                    name,
                });
            }
            cfg.default_profile = Some(name.clone());
            sprinkly_config::save_config(&cfg)?;
            if !global.quiet {
                eprintln!("Default profile set to '{name}'");
            }
            Ok(())
        }

        ConfigCommand::SetPassword => {
            let cfg = sprinkly_config::load_config()?;
            let profile_name = config::active_profile_name(global, &cfg);
            if !cfg.profiles.contains_key(&profile_name) {
                return Err(CliError::ProfileNotFound {
                    available: config::available_profiles(&cfg),
                    name: profile_name,
                });
            }

            let secret = read_secret(global, |p| rpassword::prompt_password(p))?;
            if secret.is_empty() {
                return Err(CliError::Validation {
                    field: "password".into(),
                    reason: "value cannot be empty".into(),
                });
            }

            let entry = keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/password"))?;
            entry.set_password(&secret)?;
            if !global.quiet {
                eprintln!("Password for '{profile_name}' stored in the system keyring");
            }
            Ok(())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::cli::{ColorMode, OutputFormat};
    use sprinkly_config::{MqttProfile, Profile};

    fn global(password: Option<&str>) -> GlobalOpts {
        GlobalOpts {
            profile: None,
            host: None,
            password: password.map(str::to_owned),
            output: OutputFormat::Table,
            color: ColorMode::Never,
            verbose: 0,
            log_json: false,
            quiet: true,
            timeout: None,
        }
    }

    #[test]
    fn secret_flag_skips_the_prompt() {
        let secret = read_secret(&global(Some("opendoor")), |_| {
            panic!("prompted although --password was given")
        })
        .unwrap();
        assert_eq!(secret, "opendoor");
    }

    #[test]
    fn secret_is_read_through_the_hidden_prompt() {
        let mut asked = None;
        let secret = read_secret(&global(None), |p| {
            asked = Some(p.to_owned());
            Ok("typed".into())
        })
        .unwrap();
        assert_eq!(secret, "typed");
        assert_eq!(asked.as_deref(), Some("Password: "));
    }

    #[test]
    fn prompt_failure_is_a_validation_error() {
        let err = read_secret(&global(None), |_| Err(std::io::Error::other("no tty"))).unwrap_err();
        assert!(matches!(err, CliError::Validation { ref field, .. } if field == "interactive"));
        assert!(err.to_string().contains("no tty"));
    }

    #[test]
    fn show_masks_passwords() {
        let mut cfg = Config::default();
        cfg.profiles.insert(
            "default".into(),
            Profile {
                host: "10.0.0.5".into(),
                password: Some("opendoor".into()),
                mqtt: Some(MqttProfile {
                    enabled: true,
                    broker: None,
                    port: None,
                    username: Some("os".into()),
                    password: Some("broker-secret".into()),
                    topic_prefix: None,
                    client_id: None,
                }),
                ..Profile::default()
            },
        );

        let shown = format!("{:?}", redacted(&cfg));
        assert!(!shown.contains("opendoor"));
        assert!(!shown.contains("broker-secret"));
        assert!(shown.contains(MASK));
    }
}
