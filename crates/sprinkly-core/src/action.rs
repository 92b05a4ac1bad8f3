// ── Host action mapping ──
//
// Hosts address entities through `<capability>.<action>` names with a
// JSON parameter object. This maps those names onto `Command`s.

use serde::Deserialize;
use serde_json::Value;

use crate::command::Command;
use crate::error::CoreError;
use crate::model::EntityId;

/// Parameters accepted by the `set`/`toggle` family of actions.
#[derive(Debug, Default, Deserialize)]
struct SetParams {
    #[serde(default)]
    state: Option<bool>,
    #[serde(default)]
    duration: Option<u32>,
    /// Rain delay length in hours.
    #[serde(default)]
    hours: Option<u32>,
}

/// Translate a host action on `id` into a command.
///
/// `params` may be `null` for actions that take none.
pub fn command_for_action(id: &EntityId, action: &str, params: &Value) -> Result<Command, CoreError> {
    let params: SetParams = if params.is_null() {
        SetParams::default()
    } else {
        serde_json::from_value(params.clone()).map_err(|e| CoreError::Decode {
            message: format!("parameters for {action}: {e}"),
        })?
    };
    let id = id.clone();

    let command = match action {
        "irrigation_zone.run" | "power_switch.on" => Command::run(id, params.duration),
        "irrigation_zone.stop" | "power_switch.off" => Command::stop(id),
        "irrigation_zone.enable" => Command::SetEnabled {
            id,
            enabled: Some(true),
        },
        "irrigation_zone.disable" => Command::SetEnabled {
            id,
            enabled: Some(false),
        },
        "power_switch.set" | "irrigation_zone.set" | "toggle.toggle" => Command::SetState {
            id,
            on: params.state,
            duration: params.duration,
        },
        "x_opensprinkler_raindelay.set" => Command::run(EntityId::rain_delay(), params.hours),
        "sys_system.restart" => Command::RestartPush,
        other => return Err(CoreError::unsupported(format!("action {other}"))),
    };
    Ok(command)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn run_and_stop() {
        let id = EntityId::zone(0);
        assert_eq!(
            command_for_action(&id, "irrigation_zone.run", &json!({"duration": 120})).unwrap(),
            Command::run(id.clone(), Some(120))
        );
        assert_eq!(
            command_for_action(&id, "power_switch.off", &Value::Null).unwrap(),
            Command::stop(id)
        );
    }

    #[test]
    fn toggle_leaves_state_open() {
        let id = EntityId::program(1);
        assert_eq!(
            command_for_action(&id, "toggle.toggle", &Value::Null).unwrap(),
            Command::SetState {
                id,
                on: None,
                duration: None
            }
        );
    }

    #[test]
    fn enable_disable() {
        let id = EntityId::zone(3);
        assert_eq!(
            command_for_action(&id, "irrigation_zone.disable", &Value::Null).unwrap(),
            Command::SetEnabled {
                id,
                enabled: Some(false)
            }
        );
    }

    #[test]
    fn rain_delay_takes_hours() {
        let command =
            command_for_action(&EntityId::rain_delay(), "x_opensprinkler_raindelay.set", &json!({"hours": 6}))
                .unwrap();
        assert_eq!(command, Command::run(EntityId::rain_delay(), Some(6)));
    }

    #[test]
    fn rain_delay_ignores_duration_and_falls_back_to_default() {
        let command =
            command_for_action(&EntityId::system(), "x_opensprinkler_raindelay.set", &json!({"duration": 12}))
                .unwrap();
        assert_eq!(command, Command::run(EntityId::rain_delay(), None));
    }

    #[test]
    fn restart_and_unknown() {
        let id = EntityId::system();
        assert_eq!(
            command_for_action(&id, "sys_system.restart", &Value::Null).unwrap(),
            Command::RestartPush
        );
        assert!(matches!(
            command_for_action(&id, "thermostat.set", &Value::Null),
            Err(CoreError::Unsupported { .. })
        ));
    }

    #[test]
    fn bad_parameters_are_decode_errors() {
        let result =
            command_for_action(&EntityId::zone(0), "irrigation_zone.set", &json!({"state": "maybe"}));
        assert!(matches!(result, Err(CoreError::Decode { .. })));
    }
}
