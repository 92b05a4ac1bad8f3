// ── Entity kinds ──
//
// The closed set of things a controller exposes. Decoder, reconciler and
// dispatcher all match on this exhaustively.

use std::fmt;

use serde::Serialize;

use super::attr::{Attr, Capability};
use super::entity_id::EntityId;

/// What an entity represents on the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EntityKind {
    /// A station output, zero-based index.
    Zone { index: usize },
    /// A stored program, zero-based index.
    Program { index: usize },
    /// The controller aggregate (`system`).
    Controller,
    RainDelay,
    /// A physical sensor input, one-based slot.
    Sensor { slot: u8 },
    WaterLevel,
}

const ZONE_CAPS: &[Capability] = &[
    Capability::IrrigationZone,
    Capability::PowerSwitch,
    Capability::Toggle,
    Capability::Vendor,
];

const CONTROLLER_CAPS: &[Capability] = &[
    Capability::PowerSwitch,
    Capability::Toggle,
    Capability::StringSensor,
    Capability::Vendor,
];

const RAIN_DELAY_CAPS: &[Capability] = &[
    Capability::BinarySensor,
    Capability::PowerSwitch,
    Capability::Toggle,
    Capability::StringSensor,
    Capability::RainDelay,
    Capability::Vendor,
];

const SENSOR_CAPS: &[Capability] = &[Capability::BinarySensor, Capability::Vendor];

const WATER_LEVEL_CAPS: &[Capability] = &[Capability::StringSensor, Capability::Vendor];

impl EntityKind {
    pub fn entity_id(self) -> EntityId {
        match self {
            Self::Zone { index } => EntityId::zone(index),
            Self::Program { index } => EntityId::program(index),
            Self::Controller => EntityId::system(),
            Self::RainDelay => EntityId::rain_delay(),
            Self::Sensor { slot } => EntityId::sensor(slot),
            Self::WaterLevel => EntityId::water_level(),
        }
    }

    /// Capabilities every entity of this kind must carry.
    pub fn capabilities(self) -> &'static [Capability] {
        match self {
            Self::Zone { .. } | Self::Program { .. } => ZONE_CAPS,
            Self::Controller => CONTROLLER_CAPS,
            Self::RainDelay => RAIN_DELAY_CAPS,
            Self::Sensor { .. } => SENSOR_CAPS,
            Self::WaterLevel => WATER_LEVEL_CAPS,
        }
    }

    /// The attribute hosts should display for this entity.
    pub fn primary_attribute(self) -> Attr {
        match self {
            Self::Zone { .. } | Self::Program { .. } => Attr::ZoneState,
            Self::RainDelay | Self::Sensor { .. } => Attr::BinaryState,
            Self::Controller | Self::WaterLevel => Attr::StringValue,
        }
    }

    /// Value written to `x_opensprinkler.type`.
    pub fn type_tag(self) -> &'static str {
        match self {
            Self::Zone { .. } => "zone",
            Self::Program { .. } => "program",
            Self::Controller => "controller",
            Self::RainDelay => "raindelay",
            Self::Sensor { .. } => "sensor",
            Self::WaterLevel => "waterlevel",
        }
    }

    /// Name used when the controller doesn't supply one.
    pub fn default_name(self) -> String {
        match self {
            Self::Zone { index } => format!("Station #{}", index + 1),
            Self::Program { index } => format!("Program #{}", index + 1),
            Self::Controller => "Open Sprinkler".into(),
            Self::RainDelay => "Rain Delay".into(),
            Self::Sensor { slot } => format!("Sensor {slot}"),
            Self::WaterLevel => "Water Level".into(),
        }
    }

    /// Stable ordering for listings: controller first, then zones,
    /// programs and the remaining singletons.
    pub fn sort_key(self) -> (u8, usize) {
        match self {
            Self::Controller => (0, 0),
            Self::Zone { index } => (1, index),
            Self::Program { index } => (2, index),
            Self::RainDelay => (3, 0),
            Self::Sensor { slot } => (4, usize::from(slot)),
            Self::WaterLevel => (5, 0),
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_tag())
    }
}

// ── SensorKind ──────────────────────────────────────────────────────

/// Sensor type code reported in `sn1t` / `sn2t`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    None,
    Rain,
    Flow,
    Soil,
    ProgramSwitch,
    Unknown(i64),
}

impl SensorKind {
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => Self::None,
            1 => Self::Rain,
            2 => Self::Flow,
            3 => Self::Soil,
            240 => Self::ProgramSwitch,
            other => Self::Unknown(other),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Rain => "rain",
            Self::Flow => "flow",
            Self::Soil => "soil",
            Self::ProgramSwitch => "program_switch",
            Self::Unknown(_) => "unknown",
        }
    }

    /// Display name for a sensor in `slot`.
    pub fn display_name(self, slot: u8) -> String {
        match self {
            Self::Rain => "Rain Sensor".into(),
            Self::Flow => "Flow Sensor".into(),
            Self::Soil => "Soil Sensor".into(),
            Self::ProgramSwitch => "Program Switch".into(),
            Self::None | Self::Unknown(_) => format!("Sensor {slot}"),
        }
    }
}
