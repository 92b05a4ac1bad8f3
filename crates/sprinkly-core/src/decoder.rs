// ── Status decoder ──
//
// Pure transform from the `/ja` status document to per-entity attribute
// updates. Missing optional fields produce partial updates (the affected
// attributes are `Ignored`); nothing here aborts the whole decode.

use serde_json::Value;

use crate::model::{Attr, AttrValue, EntityId, EntityKind, EntityUpdate, LastRun, SensorKind};

/// Output of one decode pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Decoded {
    pub updates: Vec<EntityUpdate>,
    /// Present only when the record has `duration > 0 && end > 0`.
    pub last_run: Option<LastRun>,
    pub mqtt: Option<MqttAnnouncement>,
    /// Shape problems that degraded individual entities.
    pub issues: Vec<DecodeIssue>,
}

/// The controller's own MQTT settings (`settings.mqtt`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttAnnouncement {
    pub enabled: bool,
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// A field that was present but unusable for one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeIssue {
    pub id: EntityId,
    pub message: String,
}

/// Decode a full status document.
pub fn decode(doc: &Value) -> Decoded {
    let mut out = Decoded::default();

    decode_stations(doc, &mut out);
    decode_programs(doc, &mut out);
    out.updates.push(decode_rain_delay(doc));
    for slot in [1u8, 2] {
        if let Some(update) = decode_sensor(doc, slot) {
            out.updates.push(update);
        }
    }
    out.updates.push(decode_water_level(doc));
    out.updates.push(decode_controller(doc));

    out.last_run = decode_last_run(doc).filter(LastRun::is_complete);
    out.mqtt = decode_mqtt(doc);
    out
}

// ── Stations ─────────────────────────────────────────────────────────

fn decode_stations(doc: &Value, out: &mut Decoded) {
    let Some(names) = at(doc, &["stations", "snames"]).and_then(Value::as_array) else {
        return;
    };
    let running = station_states(doc);
    let program_status = at(doc, &["settings", "ps"]).and_then(Value::as_array);
    let disabled = at(doc, &["stations", "stn_dis"]).and_then(Value::as_array);

    for (index, name) in names.iter().enumerate() {
        let kind = EntityKind::Zone { index };
        let name = name
            .as_str()
            .filter(|s| !s.is_empty())
            .map_or_else(|| kind.default_name(), str::to_owned);

        let mut update = EntityUpdate::new(kind)
            .named(name)
            .set(Attr::Index, index)
            .set(Attr::Type, kind.type_tag());

        let state = running.and_then(|sn| sn.get(index)).and_then(as_int);
        let state = AttrValue::from_option(state.map(|v| v > 0));
        update = update
            .put(Attr::ZoneState, state.clone())
            .put(Attr::SwitchState, state.clone())
            .put(Attr::ToggleState, state);

        update = update.put(
            Attr::ZoneEnabled,
            AttrValue::from_option(disabled.and_then(|masks| station_enabled(masks, index))),
        );

        if let Some(entry) = program_status.and_then(|ps| ps.get(index)) {
            if let Some(ps) = ProgramStatus::parse(entry) {
                let last_run = if ps.start > 0 {
                    AttrValue::set(ps.start)
                } else {
                    AttrValue::Ignored
                };
                update = update
                    .set(Attr::ZoneRemaining, ps.remaining)
                    .put(Attr::ZoneLastRun, last_run)
                    .set(Attr::Scheduled, ps.pid > 0);
            } else {
                out.issues.push(DecodeIssue {
                    id: update.id.clone(),
                    message: format!("program status entry is not [pid, rem, start]: {entry}"),
                });
            }
        }

        out.updates.push(update);
    }
}

/// `status.sn`, falling back to `settings.sn` on older firmware.
fn station_states(doc: &Value) -> Option<&Vec<Value>> {
    at(doc, &["status", "sn"])
        .or_else(|| at(doc, &["settings", "sn"]))
        .and_then(Value::as_array)
}

/// Station `index` is disabled iff bit `index % 8` of board `index / 8` is set.
pub fn station_enabled(masks: &[Value], index: usize) -> Option<bool> {
    let mask = masks.get(index / 8).and_then(as_int)?;
    Some((mask >> (index % 8)) & 1 == 0)
}

/// One `[pid, remaining, start]` triplet from `settings.ps`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ProgramStatus {
    pid: i64,
    remaining: i64,
    start: i64,
}

impl ProgramStatus {
    fn parse(entry: &Value) -> Option<Self> {
        let fields = entry.as_array()?;
        Some(Self {
            pid: fields.first().and_then(as_int)?,
            remaining: fields.get(1).and_then(as_int)?,
            start: fields.get(2).and_then(as_int).unwrap_or(0),
        })
    }
}

// ── Programs ─────────────────────────────────────────────────────────

fn decode_programs(doc: &Value, out: &mut Decoded) {
    let pd = at(doc, &["programs", "pd"]).and_then(Value::as_array);
    let count = at(doc, &["programs", "nprogs"])
        .and_then(as_int)
        .and_then(|n| usize::try_from(n).ok())
        .or_else(|| pd.map(Vec::len))
        .unwrap_or(0);

    // Stations currently owned by each program, from the ps triplets.
    let owners: Vec<i64> = at(doc, &["settings", "ps"])
        .and_then(Value::as_array)
        .map(|ps| {
            ps.iter()
                .filter_map(ProgramStatus::parse)
                .map(|p| p.pid)
                .collect()
        })
        .unwrap_or_default();

    for index in 0..count {
        let kind = EntityKind::Program { index };
        let mut update = EntityUpdate::new(kind)
            .set(Attr::Index, index)
            .set(Attr::Type, kind.type_tag());

        let pid = i64::try_from(index + 1).unwrap_or(i64::MAX);
        let active = owners.contains(&pid);
        update = update.on_off(active);

        let Some(fields) = pd.and_then(|pd| pd.get(index)).and_then(Value::as_array) else {
            out.issues.push(DecodeIssue {
                id: update.id.clone(),
                message: "no program data entry".into(),
            });
            out.updates.push(update.named(kind.default_name()));
            continue;
        };

        let name = fields
            .get(5)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map_or_else(|| kind.default_name(), str::to_owned);
        update = update.named(name);

        if let Some(flag) = fields.first().and_then(as_int) {
            update = update
                .set(Attr::ZoneEnabled, flag & 1 == 1)
                .set(Attr::Weather, (flag >> 1) & 1 == 1)
                .set(Attr::ProgramFlag, flag);
        }
        if let Some(data) = fields.get(4) {
            update = update.set(Attr::ProgramData, data.clone());
        }

        out.updates.push(update);
    }
}

// ── Rain delay, sensors, water level ─────────────────────────────────

fn decode_rain_delay(doc: &Value) -> EntityUpdate {
    let kind = EntityKind::RainDelay;
    let active = int_at(doc, &["settings", "rd"]).unwrap_or(0) == 1;
    EntityUpdate::new(kind)
        .named(kind.default_name())
        .set(Attr::BinaryState, active)
        .set(Attr::SwitchState, active)
        .set(Attr::ToggleState, active)
        .set(Attr::StringValue, int_at(doc, &["settings", "rdst"]).unwrap_or(0))
        .set(Attr::Type, kind.type_tag())
}

/// Sensors exist only when their type code is non-zero.
fn decode_sensor(doc: &Value, slot: u8) -> Option<EntityUpdate> {
    let (type_key, value_key, option_key) =
        (format!("sn{slot}t"), format!("sn{slot}"), format!("sn{slot}o"));
    let code = int_at(doc, &["settings", type_key.as_str()])?;
    let sensor = SensorKind::from_code(code);
    if sensor == SensorKind::None {
        return None;
    }

    let raw = int_at(doc, &["settings", value_key.as_str()]).unwrap_or(0);
    let expected = int_at(doc, &["settings", option_key.as_str()]);
    let kind = EntityKind::Sensor { slot };

    Some(
        EntityUpdate::new(kind)
            .named(sensor.display_name(slot))
            .set(Attr::BinaryState, expected == Some(raw))
            .set(Attr::SensorType, sensor.label())
            .set(Attr::Type, kind.type_tag()),
    )
}

fn decode_water_level(doc: &Value) -> EntityUpdate {
    let kind = EntityKind::WaterLevel;
    EntityUpdate::new(kind)
        .named(kind.default_name())
        .set(Attr::StringValue, int_at(doc, &["options", "wl"]).unwrap_or(0))
        .set(Attr::StringUnits, "%")
        .set(Attr::Type, kind.type_tag())
}

// ── Controller ───────────────────────────────────────────────────────

fn decode_controller(doc: &Value) -> EntityUpdate {
    let kind = EntityKind::Controller;
    let enabled = int_at(doc, &["settings", "en"]) == Some(1)
        || int_at(doc, &["options", "den"]) == Some(0);

    let hardware = at(doc, &["options", "hwv"])
        .and_then(|hwv| hardware_version(hwv, at(doc, &["options", "hwt"])));

    EntityUpdate::new(kind)
        .named(kind.default_name())
        .set(Attr::SwitchState, enabled)
        .set(Attr::ToggleState, enabled)
        .set(Attr::StringValue, if enabled { "Enabled" } else { "Disabled" })
        .set(Attr::Type, kind.type_tag())
        .set(Attr::Current, int_at(doc, &["settings", "curr"]).unwrap_or(0))
        .put(Attr::HardwareVersion, AttrValue::from_option(hardware))
        .set(
            Attr::WeatherAdjustmentMode,
            int_at(doc, &["settings", "uwt"]).unwrap_or(0),
        )
        .put(
            Attr::Rssi,
            AttrValue::from_option(at(doc, &["settings", "RSSI"]).cloned()),
        )
        .set(
            Attr::FirmwareVersion,
            at(doc, &["options", "fwv"]).cloned().unwrap_or(Value::from(0)),
        )
        .set(Attr::LastBoot, int_at(doc, &["settings", "lupt"]).unwrap_or(0))
        .set(
            Attr::LastBootReason,
            int_at(doc, &["settings", "lrbtc"]).unwrap_or(0),
        )
        .set(Attr::Boards, int_at(doc, &["settings", "nbrd"]).unwrap_or(1))
        .put(
            Attr::LastRunRecord,
            AttrValue::from_option(at(doc, &["settings", "lrun"]).cloned()),
        )
}

/// Human-readable hardware version from `hwv` and `hwt`.
pub fn hardware_version(hwv: &Value, hwt: Option<&Value>) -> Option<String> {
    if let Some(s) = hwv.as_str() {
        return Some(s.to_owned());
    }
    let code = hwv.as_i64()?;
    let name = match code {
        64 => "OSPi".to_owned(),
        128 => "OSBo".to_owned(),
        192 => "Linux".to_owned(),
        255 => "Demo".to_owned(),
        _ => format!(
            "{}.{}{}",
            (code / 10) % 10,
            code % 10,
            hardware_type_suffix(hwt.and_then(Value::as_i64))
        ),
    };
    Some(name)
}

fn hardware_type_suffix(hwt: Option<i64>) -> &'static str {
    match hwt {
        Some(172) => " - AC",
        Some(220) => " - DC",
        Some(26) => " - Latching",
        _ => "",
    }
}

fn decode_last_run(doc: &Value) -> Option<LastRun> {
    let lrun = at(doc, &["settings", "lrun"])?.as_array()?;
    let field = |i: usize| lrun.get(i).and_then(as_int);
    Some(LastRun {
        station: usize::try_from(field(0)?).ok()?,
        program: usize::try_from(field(1)?).ok()?,
        duration: field(2)?,
        end_time: field(3)?,
    })
}

fn decode_mqtt(doc: &Value) -> Option<MqttAnnouncement> {
    let mqtt = at(doc, &["settings", "mqtt"])?;
    Some(MqttAnnouncement {
        enabled: mqtt.get("en").and_then(as_int) == Some(1),
        host: mqtt
            .get("host")
            .and_then(Value::as_str)
            .filter(|h| !h.is_empty())
            .map(str::to_owned),
        port: mqtt
            .get("port")
            .and_then(as_int)
            .and_then(|p| u16::try_from(p).ok()),
    })
}

// ── JSON helpers ─────────────────────────────────────────────────────

fn at<'a>(doc: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().try_fold(doc, |v, k| v.get(k))
}

fn int_at(doc: &Value, keys: &[&str]) -> Option<i64> {
    at(doc, keys).and_then(as_int)
}

/// Integers, whole floats, booleans and numeric strings.
pub(crate) fn as_int(v: &Value) -> Option<i64> {
    match v {
        #[allow(clippy::cast_possible_truncation, clippy::as_conversions)]
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < 9.0e15)
                .map(|f| f as i64)
        }),
        Value::Bool(b) => Some(i64::from(*b)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn find(decoded: &Decoded, id: &EntityId) -> EntityUpdate {
        decoded
            .updates
            .iter()
            .find(|u| &u.id == id)
            .cloned()
            .unwrap()
    }

    fn two_station_doc() -> Value {
        json!({
            "stations": { "snames": ["A", "B"], "stn_dis": [0] },
            "settings": { "ps": [[0, 0, 0], [5, 30, 1000]], "rd": 0, "rdst": 0, "en": 1, "nbrd": 1 },
            "status": { "sn": [0, 1] },
            "options": { "hwv": 33 }
        })
    }

    #[test]
    fn two_station_scenario() {
        let decoded = decode(&two_station_doc());

        let a = find(&decoded, &EntityId::zone(0));
        assert_eq!(a.display_name.as_deref(), Some("A"));
        assert_eq!(a.value(Attr::ZoneEnabled), Some(&json!(true)));
        assert_eq!(a.value(Attr::ZoneState), Some(&json!(false)));
        assert_eq!(a.attributes.get(&Attr::ZoneLastRun), Some(&AttrValue::Ignored));

        let b = find(&decoded, &EntityId::zone(1));
        assert_eq!(b.value(Attr::ZoneEnabled), Some(&json!(true)));
        assert_eq!(b.value(Attr::ZoneState), Some(&json!(true)));
        assert_eq!(b.value(Attr::SwitchState), Some(&json!(true)));
        assert_eq!(b.value(Attr::Scheduled), Some(&json!(true)));
        assert_eq!(b.value(Attr::ZoneRemaining), Some(&json!(30)));
        assert_eq!(b.value(Attr::ZoneLastRun), Some(&json!(1000)));
    }

    #[test]
    fn decode_is_deterministic() {
        let doc = two_station_doc();
        assert_eq!(decode(&doc), decode(&doc));
    }

    #[test]
    fn disabled_bit_rule() {
        let masks = [json!(0b0000_0010)];
        assert_eq!(station_enabled(&masks, 0), Some(true));
        assert_eq!(station_enabled(&masks, 1), Some(false));

        let two_boards = [json!(0), json!(0b0000_0010)];
        assert_eq!(station_enabled(&two_boards, 9), Some(false));
        assert_eq!(station_enabled(&two_boards, 8), Some(true));
        assert_eq!(station_enabled(&two_boards, 16), None);
    }

    #[test]
    fn empty_document_still_decodes() {
        let decoded = decode(&json!({}));
        assert!(decoded.issues.is_empty());
        assert!(decoded.last_run.is_none());
        assert!(decoded.mqtt.is_none());

        let controller = find(&decoded, &EntityId::system());
        assert_eq!(controller.value(Attr::StringValue), Some(&json!("Disabled")));
        assert_eq!(controller.value(Attr::Boards), Some(&json!(1)));
        assert_eq!(
            controller.attributes.get(&Attr::HardwareVersion),
            Some(&AttrValue::Ignored)
        );
    }

    #[test]
    fn missing_station_fields_yield_partial_update() {
        let doc = json!({ "stations": { "snames": ["", "B"] } });
        let decoded = decode(&doc);

        let first = find(&decoded, &EntityId::zone(0));
        assert_eq!(first.display_name.as_deref(), Some("Station #1"));
        assert_eq!(first.attributes.get(&Attr::ZoneState), Some(&AttrValue::Ignored));
        assert_eq!(first.attributes.get(&Attr::ZoneEnabled), Some(&AttrValue::Ignored));
        assert!(!first.attributes.contains_key(&Attr::ZoneRemaining));
    }

    #[test]
    fn malformed_program_status_is_reported_not_fatal() {
        let doc = json!({
            "stations": { "snames": ["A"], "stn_dis": [0] },
            "settings": { "ps": ["garbage"] },
            "status": { "sn": [1] }
        });
        let decoded = decode(&doc);

        assert_eq!(decoded.issues.len(), 1);
        assert_eq!(decoded.issues[0].id, EntityId::zone(0));
        let a = find(&decoded, &EntityId::zone(0));
        assert_eq!(a.value(Attr::ZoneState), Some(&json!(true)));
    }

    #[test]
    fn programs_unpack_flag_and_data() {
        let doc = json!({
            "settings": { "ps": [[0, 0, 0], [2, 120, 500]] },
            "programs": {
                "nprogs": 2,
                "pd": [
                    [3, 127, 0, [360], [60, 0], "Morning"],
                    [0, 127, 0, [360], [0, 30], ""]
                ]
            }
        });
        let decoded = decode(&doc);

        let morning = find(&decoded, &EntityId::program(0));
        assert_eq!(morning.display_name.as_deref(), Some("Morning"));
        assert_eq!(morning.value(Attr::ZoneEnabled), Some(&json!(true)));
        assert_eq!(morning.value(Attr::Weather), Some(&json!(true)));
        assert_eq!(morning.value(Attr::ProgramFlag), Some(&json!(3)));
        assert_eq!(morning.value(Attr::ProgramData), Some(&json!([60, 0])));
        assert_eq!(morning.value(Attr::ZoneState), Some(&json!(false)));

        let second = find(&decoded, &EntityId::program(1));
        assert_eq!(second.display_name.as_deref(), Some("Program #2"));
        assert_eq!(second.value(Attr::ZoneEnabled), Some(&json!(false)));
        assert_eq!(second.value(Attr::ZoneState), Some(&json!(true)));
    }

    #[test]
    fn program_count_falls_back_to_pd_length() {
        let doc = json!({ "programs": { "pd": [[1, 0, 0, [], [], "Only"]] } });
        let decoded = decode(&doc);
        assert!(decoded.updates.iter().any(|u| u.id == EntityId::program(0)));
        assert!(!decoded.updates.iter().any(|u| u.id == EntityId::program(1)));
    }

    #[test]
    fn rain_delay_and_sensors() {
        let doc = json!({
            "settings": {
                "rd": 1, "rdst": 1_700_000_000,
                "sn1t": 1, "sn1o": 1, "sn1": 1,
                "sn2t": 0, "sn2": 1
            }
        });
        let decoded = decode(&doc);

        let rd = find(&decoded, &EntityId::rain_delay());
        assert_eq!(rd.value(Attr::BinaryState), Some(&json!(true)));
        assert_eq!(rd.value(Attr::StringValue), Some(&json!(1_700_000_000)));

        let rain = find(&decoded, &EntityId::sensor(1));
        assert_eq!(rain.display_name.as_deref(), Some("Rain Sensor"));
        assert_eq!(rain.value(Attr::BinaryState), Some(&json!(true)));
        assert_eq!(rain.value(Attr::SensorType), Some(&json!("rain")));

        assert!(!decoded.updates.iter().any(|u| u.id == EntityId::sensor(2)));
    }

    #[test]
    fn sensor_inactive_when_raw_differs_from_option() {
        let doc = json!({ "settings": { "sn2t": 3, "sn2o": 1, "sn2": 0 } });
        let decoded = decode(&doc);
        let soil = find(&decoded, &EntityId::sensor(2));
        assert_eq!(soil.display_name.as_deref(), Some("Soil Sensor"));
        assert_eq!(soil.value(Attr::BinaryState), Some(&json!(false)));
    }

    #[test]
    fn water_level_has_percent_units() {
        let decoded = decode(&json!({ "options": { "wl": 80 } }));
        let wl = find(&decoded, &EntityId::water_level());
        assert_eq!(wl.value(Attr::StringValue), Some(&json!(80)));
        assert_eq!(wl.value(Attr::StringUnits), Some(&json!("%")));
    }

    #[test]
    fn controller_enabled_rule() {
        let by_en = decode(&json!({ "settings": { "en": 1 }, "options": { "den": 1 } }));
        let by_den = decode(&json!({ "settings": { "en": 0 }, "options": { "den": 0 } }));
        let off = decode(&json!({ "settings": { "en": 0 }, "options": { "den": 1 } }));

        let state = |d: &Decoded| find(d, &EntityId::system()).value(Attr::SwitchState).cloned();
        assert_eq!(state(&by_en), Some(json!(true)));
        assert_eq!(state(&by_den), Some(json!(true)));
        assert_eq!(state(&off), Some(json!(false)));
    }

    #[test]
    fn hardware_version_table() {
        assert_eq!(hardware_version(&json!(64), None).unwrap(), "OSPi");
        assert_eq!(hardware_version(&json!(128), None).unwrap(), "OSBo");
        assert_eq!(hardware_version(&json!(192), None).unwrap(), "Linux");
        assert_eq!(hardware_version(&json!(255), None).unwrap(), "Demo");
        assert_eq!(hardware_version(&json!(26), None).unwrap(), "2.6");
        assert_eq!(hardware_version(&json!(33), Some(&json!(172))).unwrap(), "3.3 - AC");
        assert_eq!(hardware_version(&json!(33), Some(&json!(26))).unwrap(), "3.3 - Latching");
        assert_eq!(hardware_version(&json!(33), Some(&json!(0))).unwrap(), "3.3");
        assert_eq!(hardware_version(&json!("3.2"), None).unwrap(), "3.2");
    }

    #[test]
    fn last_run_only_when_complete() {
        let complete = json!({ "settings": { "lrun": [1, 0, 60, 1000] } });
        let decoded = decode(&complete);
        assert_eq!(
            decoded.last_run,
            Some(LastRun {
                station: 1,
                program: 0,
                duration: 60,
                end_time: 1000
            })
        );
        let controller = find(&decoded, &EntityId::system());
        assert_eq!(controller.value(Attr::LastRunRecord), Some(&json!([1, 0, 60, 1000])));

        let zero = decode(&json!({ "settings": { "lrun": [1, 0, 0, 1000] } }));
        assert!(zero.last_run.is_none());
    }

    #[test]
    fn mqtt_announcement() {
        let doc = json!({ "settings": { "mqtt": { "en": 1, "host": "10.0.0.2", "port": 1884 } } });
        assert_eq!(
            decode(&doc).mqtt,
            Some(MqttAnnouncement {
                enabled: true,
                host: Some("10.0.0.2".into()),
                port: Some(1884)
            })
        );
    }

    #[test]
    fn as_int_accepts_loose_numbers() {
        assert_eq!(as_int(&json!(3)), Some(3));
        assert_eq!(as_int(&json!(3.0)), Some(3));
        assert_eq!(as_int(&json!(3.5)), None);
        assert_eq!(as_int(&json!("7")), Some(7));
        assert_eq!(as_int(&json!(true)), Some(1));
        assert_eq!(as_int(&json!(null)), None);
    }
}
