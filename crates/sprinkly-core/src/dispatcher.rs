// ── Command dispatcher ──
//
// Turns intents into controller requests. Planning is pure with respect
// to the network: it reads current attributes from the host and yields
// `CommandPlan`s. Sending applies the bounded retry policy; only
// transport-level failures are retried.

use std::time::Duration;

use indexmap::IndexMap;
use sprinkly_api::{SprinklerClient, Verb};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::command::Command;
use crate::decoder::as_int;
use crate::error::CoreError;
use crate::health::backoff;
use crate::host::EntityHost;
use crate::model::{Attr, AttrValue, EntityId, EntityKind};

/// One controller request plus the attribute effects to apply on success.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandPlan {
    pub verb: Verb,
    pub params: Vec<(String, String)>,
    pub target: EntityId,
    pub effects: IndexMap<Attr, AttrValue>,
}

impl CommandPlan {
    fn new(verb: Verb, target: EntityId) -> Self {
        Self {
            verb,
            params: Vec::new(),
            target,
            effects: IndexMap::new(),
        }
    }

    fn param(mut self, key: &str, value: impl ToString) -> Self {
        self.params.push((key.to_owned(), value.to_string()));
        self
    }

    fn effect(mut self, attr: Attr, value: AttrValue) -> Self {
        self.effects.insert(attr, value);
        self
    }

    fn on_off(self, on: bool) -> Self {
        self.effect(Attr::SwitchState, AttrValue::set(on))
            .effect(Attr::ToggleState, AttrValue::set(on))
    }

    /// Value of a request parameter, for logging and tests.
    pub fn param_value(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Defaults applied when an intent leaves something unspecified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchDefaults {
    pub zone_duration: u32,
    pub rain_delay_hours: u32,
}

/// Plans commands against the current host state.
pub struct Dispatcher<'a> {
    host: &'a dyn EntityHost,
    defaults: DispatchDefaults,
}

impl<'a> Dispatcher<'a> {
    pub fn new(host: &'a dyn EntityHost, defaults: DispatchDefaults) -> Self {
        Self { host, defaults }
    }

    /// Plan the requests for `command`. `now` is epoch seconds.
    ///
    /// May return an empty plan (stopping a program with no active
    /// stations).
    pub fn plan(&self, command: &Command, now: i64) -> Result<Vec<CommandPlan>, CoreError> {
        match command {
            Command::SetEnabled { id, enabled } => Ok(vec![self.plan_enabled(id, *enabled)?]),
            Command::SetState { id, on, duration } => self.plan_state(id, *on, *duration, now),
            Command::Refresh | Command::RestartPush => Err(CoreError::unsupported(format!(
                "{command:?} is not a device command"
            ))),
        }
    }

    // ── setEnabled ───────────────────────────────────────────────────

    fn plan_enabled(&self, id: &EntityId, enabled: Option<bool>) -> Result<CommandPlan, CoreError> {
        let kind = self.kind(id)?;
        let enabled = enabled.unwrap_or_else(|| {
            !self
                .host
                .bool_attribute(id, Attr::ZoneEnabled)
                .unwrap_or(true)
        });

        let plan = match kind {
            EntityKind::Zone { index } => {
                let mut plan = CommandPlan::new(Verb::StationDisable, id.clone());
                for (board, mask) in self.disable_masks(index, enabled)?.into_iter().enumerate() {
                    plan = plan.param(&format!("d{board}"), mask);
                }
                plan
            }
            EntityKind::Program { index } => CommandPlan::new(Verb::ProgramEnable, id.clone())
                .param("en", u8::from(enabled))
                .param("pid", index),
            EntityKind::Controller
            | EntityKind::RainDelay
            | EntityKind::Sensor { .. }
            | EntityKind::WaterLevel => {
                return Err(CoreError::unsupported(format!("enable/disable on {kind}")));
            }
        };

        debug!(%id, enabled, verb = %plan.verb, "planned enable change");
        Ok(plan.effect(Attr::ZoneEnabled, AttrValue::set(enabled)))
    }

    /// Per-board disable bitmasks with `target`'s bit replaced.
    ///
    /// Stations that don't exist contribute a 0 bit. A `target` outside
    /// the configured boards can't be expressed and is rejected.
    pub fn disable_masks(&self, target: usize, enabled: bool) -> Result<Vec<u8>, CoreError> {
        let boards = self
            .host
            .i64_attribute(&EntityId::system(), Attr::Boards)
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(1)
            .max(1);
        if target >= boards * 8 {
            return Err(CoreError::unsupported(format!(
                "station {} is beyond the {boards} configured board(s)",
                target + 1
            )));
        }

        let masks = (0..boards)
            .map(|board| {
                (0..8u8).fold(0u8, |mask, bit| {
                    let index = board * 8 + usize::from(bit);
                    let station = EntityId::zone(index);
                    if !self.host.contains(&station) {
                        return mask;
                    }
                    let station_enabled = if index == target {
                        enabled
                    } else {
                        self.host
                            .bool_attribute(&station, Attr::ZoneEnabled)
                            .unwrap_or(true)
                    };
                    if station_enabled { mask } else { mask | (1 << bit) }
                })
            })
            .collect();
        Ok(masks)
    }

    // ── setState ─────────────────────────────────────────────────────

    fn plan_state(
        &self,
        id: &EntityId,
        on: Option<bool>,
        duration: Option<u32>,
        now: i64,
    ) -> Result<Vec<CommandPlan>, CoreError> {
        let kind = self.kind(id)?;
        let on = on.unwrap_or_else(|| {
            !self
                .host
                .bool_attribute(id, Attr::SwitchState)
                .unwrap_or(false)
        });
        let run_time = duration
            .filter(|d| *d > 0)
            .unwrap_or(self.defaults.zone_duration);

        let plan = match kind {
            EntityKind::Zone { index } => {
                Self::run_plan(Verb::ManualStation, "sid", index, id, on, duration, run_time)
            }
            EntityKind::Program { index } => {
                if !on {
                    return self.plan_program_stop(id);
                }
                Self::run_plan(Verb::ManualProgram, "pid", index, id, on, duration, run_time)
            }
            EntityKind::Controller => CommandPlan::new(Verb::ChangeVariables, id.clone())
                .param("en", u8::from(on))
                .effect(
                    Attr::StringValue,
                    AttrValue::set(if on { "Enabled" } else { "Disabled" }),
                )
                .on_off(on),
            EntityKind::RainDelay => {
                let hours = match duration {
                    _ if !on => 0,
                    Some(0) => 0,
                    Some(h) => h,
                    None => self.defaults.rain_delay_hours,
                };
                let active = hours > 0;
                let until = if active {
                    now + 3600 * i64::from(hours)
                } else {
                    0
                };
                CommandPlan::new(Verb::ChangeVariables, id.clone())
                    .param("rd", hours)
                    .effect(Attr::BinaryState, AttrValue::set(active))
                    .effect(Attr::StringValue, AttrValue::set(until))
                    .on_off(active)
            }
            EntityKind::Sensor { .. } | EntityKind::WaterLevel => {
                return Err(CoreError::unsupported(format!("on/off on {kind}")));
            }
        };

        debug!(%id, on, verb = %plan.verb, "planned state change");
        Ok(vec![plan])
    }

    fn run_plan(
        verb: Verb,
        key: &str,
        index: usize,
        id: &EntityId,
        on: bool,
        duration: Option<u32>,
        run_time: u32,
    ) -> CommandPlan {
        CommandPlan::new(verb, id.clone())
            .param(key, index)
            .param("en", u8::from(on))
            .param("t", if on { run_time } else { 0 })
            .param("uwt", 0)
            .effect(Attr::ZoneState, AttrValue::set(on))
            .on_off(on)
            .effect(Attr::ZoneDuration, AttrValue::from_option(duration))
            .effect(
                Attr::ZoneRemaining,
                AttrValue::set(if on { run_time } else { 0 }),
            )
    }

    /// Stopping a program stops every station its program data marks active.
    fn plan_program_stop(&self, id: &EntityId) -> Result<Vec<CommandPlan>, CoreError> {
        let data = self.host.attribute(id, Attr::ProgramData);
        let stations: Vec<usize> = data
            .as_ref()
            .and_then(serde_json::Value::as_array)
            .map(|values| {
                values
                    .iter()
                    .enumerate()
                    .filter(|(_, v)| as_int(v).is_some_and(|n| n > 0))
                    .map(|(i, _)| i)
                    .collect()
            })
            .unwrap_or_default();

        debug!(%id, ?stations, "stopping program stations");

        let mut plans = Vec::new();
        for index in stations {
            let station = EntityId::zone(index);
            if self.host.contains(&station) {
                plans.extend(self.plan_state(&station, Some(false), None, 0)?);
            }
        }
        Ok(plans)
    }

    fn kind(&self, id: &EntityId) -> Result<EntityKind, CoreError> {
        self.host
            .kind(id)
            .ok_or_else(|| CoreError::EntityNotFound { id: id.clone() })
    }
}

// ── Sending ──────────────────────────────────────────────────────────

/// Retry bounds for command sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub retries: u32,
    pub base: Duration,
    pub cap: Duration,
}

/// Outcome of sending a sequence of plans.
#[derive(Debug)]
pub struct SendReport {
    /// Plans the controller accepted, in order.
    pub completed: Vec<CommandPlan>,
    /// The failure that stopped the sequence, if any.
    pub error: Option<CoreError>,
}

/// Send plans in order, stopping at the first one that fails.
pub async fn send_all(
    client: &SprinklerClient,
    plans: Vec<CommandPlan>,
    policy: RetryPolicy,
    cancel: &CancellationToken,
) -> SendReport {
    let mut completed = Vec::with_capacity(plans.len());
    for plan in plans {
        if let Err(e) = send(client, &plan, policy, cancel).await {
            return SendReport {
                completed,
                error: Some(e),
            };
        }
        completed.push(plan);
    }
    SendReport {
        completed,
        error: None,
    }
}

/// Send one plan, retrying transport failures with backoff.
pub async fn send(
    client: &SprinklerClient,
    plan: &CommandPlan,
    policy: RetryPolicy,
    cancel: &CancellationToken,
) -> Result<(), CoreError> {
    let mut failures: u32 = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(CoreError::Stopped);
        }

        let err = match client.send_command(plan.verb, &plan.params).await {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };

        if !err.is_transient() {
            warn!(target_id = %plan.target, verb = %plan.verb, error = %err, "command rejected");
            return Err(err.into());
        }

        failures += 1;
        if failures > policy.retries {
            error!(
                target_id = %plan.target,
                verb = %plan.verb,
                attempts = failures,
                error = %err,
                "command abandoned"
            );
            return Err(CoreError::CommandFailed {
                attempts: failures,
                reason: err.to_string(),
            });
        }

        let delay = backoff(failures, policy.base, policy.cap);
        warn!(
            target_id = %plan.target,
            verb = %plan.verb,
            attempt = failures,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            error = %err,
            "command failed, retrying"
        );
        tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(CoreError::Stopped),
            () = tokio::time::sleep(delay) => {}
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::EntityUpdate;
    use crate::reconciler::Reconciler;
    use crate::store::MemoryHost;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;

    const DEFAULTS: DispatchDefaults = DispatchDefaults {
        zone_duration: 60,
        rain_delay_hours: 1,
    };

    fn host_with(updates: &[EntityUpdate]) -> Arc<MemoryHost> {
        let host = Arc::new(MemoryHost::new());
        let reconciler = Reconciler::new(host.clone());
        for u in updates {
            reconciler.apply(u).unwrap();
        }
        host
    }

    fn zone(index: usize, enabled: bool, running: bool) -> EntityUpdate {
        EntityUpdate::new(EntityKind::Zone { index })
            .set(Attr::ZoneEnabled, enabled)
            .on_off(running)
    }

    fn plan_one(host: &MemoryHost, command: &Command) -> CommandPlan {
        let mut plans = Dispatcher::new(host, DEFAULTS).plan(command, 1_000).unwrap();
        assert_eq!(plans.len(), 1);
        plans.remove(0)
    }

    #[test]
    fn zone_run_uses_default_duration() {
        let host = host_with(&[zone(2, true, false)]);
        let plan = plan_one(&host, &Command::run(EntityId::zone(2), None));

        assert_eq!(plan.verb, Verb::ManualStation);
        assert_eq!(plan.param_value("sid"), Some("2"));
        assert_eq!(plan.param_value("en"), Some("1"));
        assert_eq!(plan.param_value("t"), Some("60"));
        assert_eq!(plan.param_value("uwt"), Some("0"));
        assert_eq!(plan.effects[&Attr::ZoneRemaining], AttrValue::set(60));
        assert_eq!(plan.effects[&Attr::ZoneDuration], AttrValue::Ignored);
        assert_eq!(plan.effects[&Attr::ZoneState], AttrValue::set(true));
    }

    #[test]
    fn zone_stop_zeroes_timeout_and_remaining() {
        let host = host_with(&[zone(0, true, true)]);
        let plan = plan_one(&host, &Command::stop(EntityId::zone(0)));

        assert_eq!(plan.param_value("en"), Some("0"));
        assert_eq!(plan.param_value("t"), Some("0"));
        assert_eq!(plan.effects[&Attr::ZoneRemaining], AttrValue::set(0));
    }

    #[test]
    fn omitted_state_toggles_current() {
        let host = host_with(&[zone(0, true, true)]);
        let command = Command::SetState {
            id: EntityId::zone(0),
            on: None,
            duration: Some(300),
        };
        let plan = plan_one(&host, &command);
        assert_eq!(plan.param_value("en"), Some("0"));
    }

    #[test]
    fn explicit_duration_is_used_and_recorded() {
        let host = host_with(&[zone(0, true, false)]);
        let plan = plan_one(&host, &Command::run(EntityId::zone(0), Some(300)));
        assert_eq!(plan.param_value("t"), Some("300"));
        assert_eq!(plan.effects[&Attr::ZoneDuration], AttrValue::set(300));
    }

    #[test]
    fn program_run_keys_by_pid() {
        let host = host_with(&[EntityUpdate::new(EntityKind::Program { index: 1 })]);
        let plan = plan_one(&host, &Command::run(EntityId::program(1), Some(120)));
        assert_eq!(plan.verb, Verb::ManualProgram);
        assert_eq!(plan.param_value("pid"), Some("1"));
        assert_eq!(plan.param_value("t"), Some("120"));
    }

    #[test]
    fn program_stop_stops_active_stations() {
        let host = host_with(&[
            zone(0, true, true),
            zone(1, true, false),
            zone(2, true, true),
            EntityUpdate::new(EntityKind::Program { index: 0 })
                .set(Attr::ProgramData, json!([60, 0, 120, 30])),
        ]);
        let plans = Dispatcher::new(host.as_ref(), DEFAULTS)
            .plan(&Command::stop(EntityId::program(0)), 1_000)
            .unwrap();

        // Station 3 (index 3) has no entity and is skipped.
        let targets: Vec<_> = plans.iter().map(|p| p.target.clone()).collect();
        assert_eq!(targets, vec![EntityId::zone(0), EntityId::zone(2)]);
        assert!(plans.iter().all(|p| p.verb == Verb::ManualStation));
        assert!(plans.iter().all(|p| p.param_value("en") == Some("0")));
    }

    #[test]
    fn controller_toggle_sets_display_string() {
        let host = host_with(&[EntityUpdate::new(EntityKind::Controller).set(Attr::SwitchState, true)]);
        let plan = plan_one(
            &host,
            &Command::SetState {
                id: EntityId::system(),
                on: None,
                duration: None,
            },
        );
        assert_eq!(plan.verb, Verb::ChangeVariables);
        assert_eq!(plan.param_value("en"), Some("0"));
        assert_eq!(plan.effects[&Attr::StringValue], AttrValue::set("Disabled"));
        assert_eq!(plan.effects[&Attr::SwitchState], AttrValue::set(false));
    }

    #[test]
    fn rain_delay_hours() {
        let host = host_with(&[EntityUpdate::new(EntityKind::RainDelay)]);
        let id = EntityId::rain_delay();

        let on_default = plan_one(&host, &Command::run(id.clone(), None));
        assert_eq!(on_default.param_value("rd"), Some("1"));
        assert_eq!(on_default.effects[&Attr::StringValue], AttrValue::set(1_000 + 3600));
        assert_eq!(on_default.effects[&Attr::BinaryState], AttrValue::set(true));

        let on_six = plan_one(&host, &Command::run(id.clone(), Some(6)));
        assert_eq!(on_six.param_value("rd"), Some("6"));

        let zero = plan_one(
            &host,
            &Command::SetState {
                id: id.clone(),
                on: Some(true),
                duration: Some(0),
            },
        );
        assert_eq!(zero.param_value("rd"), Some("0"));
        assert_eq!(zero.effects[&Attr::StringValue], AttrValue::set(0));

        let off = plan_one(&host, &Command::stop(id));
        assert_eq!(off.param_value("rd"), Some("0"));
        assert_eq!(off.effects[&Attr::BinaryState], AttrValue::set(false));
    }

    #[test]
    fn two_board_bitmask_with_station_nine_disabled() {
        let mut updates: Vec<EntityUpdate> = (0..16).map(|i| zone(i, true, false)).collect();
        updates.push(EntityUpdate::new(EntityKind::Controller).set(Attr::Boards, 2));
        let host = host_with(&updates);

        let plan = plan_one(
            &host,
            &Command::SetEnabled {
                id: EntityId::zone(9),
                enabled: Some(false),
            },
        );
        assert_eq!(plan.verb, Verb::StationDisable);
        assert_eq!(plan.param_value("d0"), Some("0"));
        assert_eq!(plan.param_value("d1"), Some("2"));
        assert_eq!(plan.effects[&Attr::ZoneEnabled], AttrValue::set(false));
    }

    #[test]
    fn bitmask_keeps_other_disabled_stations() {
        let host = host_with(&[zone(0, false, false), zone(1, true, false), zone(2, true, false)]);
        let plan = plan_one(
            &host,
            &Command::SetEnabled {
                id: EntityId::zone(2),
                enabled: None,
            },
        );
        // Station 0 stays disabled, station 2 toggles to disabled.
        assert_eq!(plan.param_value("d0"), Some("5"));
    }

    #[test]
    fn enabling_station_beyond_boards_is_rejected() {
        let mut updates = vec![zone(8, true, false)];
        updates.push(EntityUpdate::new(EntityKind::Controller).set(Attr::Boards, 1));
        let host = host_with(&updates);

        let result = Dispatcher::new(host.as_ref(), DEFAULTS).plan(
            &Command::SetEnabled {
                id: EntityId::zone(8),
                enabled: Some(false),
            },
            1_000,
        );
        assert!(matches!(result, Err(CoreError::Unsupported { .. })));
        assert!(Dispatcher::new(host.as_ref(), DEFAULTS).disable_masks(7, false).is_ok());
    }

    #[test]
    fn program_enable_uses_cp() {
        let host = host_with(&[EntityUpdate::new(EntityKind::Program { index: 3 })]);
        let plan = plan_one(
            &host,
            &Command::SetEnabled {
                id: EntityId::program(3),
                enabled: Some(true),
            },
        );
        assert_eq!(plan.verb, Verb::ProgramEnable);
        assert_eq!(plan.param_value("en"), Some("1"));
        assert_eq!(plan.param_value("pid"), Some("3"));
    }

    #[test]
    fn sensors_are_unsupported() {
        let host = host_with(&[EntityUpdate::new(EntityKind::Sensor { slot: 1 })]);
        let result = Dispatcher::new(host.as_ref(), DEFAULTS)
            .plan(&Command::run(EntityId::sensor(1), None), 0);
        assert!(matches!(result, Err(CoreError::Unsupported { .. })));
    }

    #[test]
    fn unknown_entity_is_not_found() {
        let host = host_with(&[]);
        let result =
            Dispatcher::new(host.as_ref(), DEFAULTS).plan(&Command::stop(EntityId::zone(7)), 0);
        assert!(matches!(result, Err(CoreError::EntityNotFound { .. })));
    }
}
