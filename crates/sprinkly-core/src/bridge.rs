// ── Push event bridge ──
//
// Decodes push-channel messages into the same `EntityUpdate` shape the
// status decoder produces. Push messages are abbreviated: they only touch
// entities a poll has already created, and some of them (rain delay,
// boot, coming online) are followed by a forced full poll to fill in what
// the message leaves out.

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::decoder::as_int;
use crate::error::CoreError;
use crate::model::{Attr, EntityKind, EntityUpdate};

/// A reading from the flow sensor topic. Not mapped to entities.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct FlowReading {
    #[serde(default)]
    pub count: i64,
    #[serde(default)]
    pub volume: f64,
}

/// Everything one push message asks the engine to do.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PushOutcome {
    /// Attribute-only updates for existing entities.
    pub updates: Vec<EntityUpdate>,
    /// A full poll should follow.
    pub refresh: bool,
    /// `Some(false)` when the controller announced it went offline,
    /// `Some(true)` when it came back.
    pub availability: Option<bool>,
    pub flow: Option<FlowReading>,
}

#[derive(Debug, Deserialize)]
struct StatePayload {
    #[serde(default)]
    state: Value,
    #[serde(default)]
    duration: Option<Value>,
}

/// Decode one message. `now` is epoch seconds.
///
/// Topics outside `prefix` or not understood yield an empty outcome.
pub fn decode_push(
    prefix: &str,
    topic: &str,
    payload: &str,
    now: i64,
) -> Result<PushOutcome, CoreError> {
    let Some(subtopic) = topic
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('/'))
    else {
        debug!(topic, "ignoring push message outside prefix");
        return Ok(PushOutcome::default());
    };

    let mut outcome = PushOutcome::default();
    match subtopic {
        "availability" => match payload.trim() {
            "online" => {
                outcome.availability = Some(true);
                outcome.refresh = true;
            }
            _ => outcome.availability = Some(false),
        },
        "system" => outcome.refresh = true,
        "raindelay" => {
            let on = parse_state(subtopic, payload)?.0;
            outcome.updates.push(
                EntityUpdate::attributes_only(EntityKind::RainDelay)
                    .set(Attr::BinaryState, on)
                    .set(Attr::SwitchState, on)
                    .set(Attr::ToggleState, on),
            );
            // The message carries no end time.
            outcome.refresh = true;
        }
        "sensor/flow" => {
            let reading: FlowReading =
                serde_json::from_str(payload).map_err(|e| decode_error(subtopic, &e))?;
            outcome.flow = Some(reading);
        }
        _ => {
            if let Some(slot) = sensor_slot(subtopic) {
                let on = parse_state(subtopic, payload)?.0;
                outcome.updates.push(
                    EntityUpdate::attributes_only(EntityKind::Sensor { slot })
                        .set(Attr::BinaryState, on),
                );
            } else if let Some(index) = subtopic
                .strip_prefix("station/")
                .and_then(|i| i.parse::<usize>().ok())
            {
                let (on, duration) = parse_state(subtopic, payload)?;
                outcome.updates.push(station_update(index, on, duration, now));
            } else {
                debug!(topic, "ignoring unrecognized push topic");
            }
        }
    }
    Ok(outcome)
}

fn sensor_slot(subtopic: &str) -> Option<u8> {
    match subtopic {
        "sensor1" => Some(1),
        "sensor2" => Some(2),
        _ => None,
    }
}

fn station_update(index: usize, on: bool, duration: Option<i64>, now: i64) -> EntityUpdate {
    let mut update = EntityUpdate::attributes_only(EntityKind::Zone { index }).on_off(on);
    if let Some(d) = duration {
        update = update.set(Attr::ZoneDuration, d);
    }
    if !on {
        update = update
            .set(Attr::ZoneRemaining, 0)
            .set(Attr::ZoneLastRun, now - duration.unwrap_or(0));
    }
    update
}

/// `state` is `1`/`"1"` for on; anything else is off.
fn parse_state(subtopic: &str, payload: &str) -> Result<(bool, Option<i64>), CoreError> {
    let parsed: StatePayload =
        serde_json::from_str(payload).map_err(|e| decode_error(subtopic, &e))?;
    let on = as_int(&parsed.state) == Some(1);
    let duration = parsed.duration.as_ref().and_then(as_int);
    Ok((on, duration))
}

fn decode_error(subtopic: &str, error: &serde_json::Error) -> CoreError {
    CoreError::Decode {
        message: format!("push topic {subtopic}: {error}"),
    }
}
