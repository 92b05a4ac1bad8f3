// ── Attribute and capability names ──
//
// Closed enums for the host-facing names. The string forms are what the
// host stores and what CLI output shows.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoStaticStr};

// ── Capability ──────────────────────────────────────────────────────

/// A host capability an entity can carry. Capabilities are additive only.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, IntoStaticStr, EnumIter,
)]
pub enum Capability {
    #[strum(serialize = "irrigation_zone")]
    IrrigationZone,
    #[strum(serialize = "power_switch")]
    PowerSwitch,
    #[strum(serialize = "toggle")]
    Toggle,
    #[strum(serialize = "binary_sensor")]
    BinarySensor,
    #[strum(serialize = "string_sensor")]
    StringSensor,
    #[strum(serialize = "x_opensprinkler_raindelay")]
    RainDelay,
    #[strum(serialize = "x_opensprinkler")]
    Vendor,
}

// ── Attr ────────────────────────────────────────────────────────────

/// A named entity attribute, `<capability>.<field>`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumString,
    AsRefStr,
    IntoStaticStr,
    EnumIter,
)]
pub enum Attr {
    // irrigation_zone
    #[strum(serialize = "irrigation_zone.state")]
    ZoneState,
    #[strum(serialize = "irrigation_zone.enabled")]
    ZoneEnabled,
    #[strum(serialize = "irrigation_zone.remaining")]
    ZoneRemaining,
    #[strum(serialize = "irrigation_zone.last_run")]
    ZoneLastRun,
    #[strum(serialize = "irrigation_zone.duration")]
    ZoneDuration,

    // shared on/off
    #[strum(serialize = "power_switch.state")]
    SwitchState,
    #[strum(serialize = "toggle.state")]
    ToggleState,

    // sensors
    #[strum(serialize = "binary_sensor.state")]
    BinaryState,
    #[strum(serialize = "string_sensor.value")]
    StringValue,
    #[strum(serialize = "string_sensor.units")]
    StringUnits,

    // x_opensprinkler
    #[strum(serialize = "x_opensprinkler.type")]
    Type,
    #[strum(serialize = "x_opensprinkler.id")]
    Index,
    #[strum(serialize = "x_opensprinkler.scheduled")]
    Scheduled,
    #[strum(serialize = "x_opensprinkler.programflag")]
    ProgramFlag,
    #[strum(serialize = "x_opensprinkler.programdata")]
    ProgramData,
    #[strum(serialize = "x_opensprinkler.weather")]
    Weather,
    #[strum(serialize = "x_opensprinkler.sensor_type")]
    SensorType,
    #[strum(serialize = "x_opensprinkler.current")]
    Current,
    #[strum(serialize = "x_opensprinkler.hardware_version")]
    HardwareVersion,
    #[strum(serialize = "x_opensprinkler.firmware_version")]
    FirmwareVersion,
    #[strum(serialize = "x_opensprinkler.weather_adjustment_mode")]
    WeatherAdjustmentMode,
    #[strum(serialize = "x_opensprinkler.rssi")]
    Rssi,
    #[strum(serialize = "x_opensprinkler.last_boot")]
    LastBoot,
    #[strum(serialize = "x_opensprinkler.last_boot_reason")]
    LastBootReason,
    #[strum(serialize = "x_opensprinkler.boards")]
    Boards,
    #[strum(serialize = "x_opensprinkler.last_run")]
    LastRunRecord,
}

impl Attr {
    /// The capability this attribute belongs to.
    pub fn capability(self) -> Capability {
        match self {
            Self::ZoneState
            | Self::ZoneEnabled
            | Self::ZoneRemaining
            | Self::ZoneLastRun
            | Self::ZoneDuration => Capability::IrrigationZone,
            Self::SwitchState => Capability::PowerSwitch,
            Self::ToggleState => Capability::Toggle,
            Self::BinaryState => Capability::BinarySensor,
            Self::StringValue | Self::StringUnits => Capability::StringSensor,
            _ => Capability::Vendor,
        }
    }
}

impl Serialize for Attr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_ref())
    }
}

impl<'de> Deserialize<'de> for Attr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

impl Serialize for Capability {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_ref())
    }
}

// ── AttrValue ───────────────────────────────────────────────────────

/// A value to write, or the sentinel meaning "leave this attribute alone".
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Set(serde_json::Value),
    Ignored,
}

impl AttrValue {
    pub fn set(value: impl Into<serde_json::Value>) -> Self {
        Self::Set(value.into())
    }

    /// `Set` when present, `Ignored` otherwise.
    pub fn from_option<T: Into<serde_json::Value>>(value: Option<T>) -> Self {
        value.map_or(Self::Ignored, Self::set)
    }

    pub fn as_value(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Set(v) => Some(v),
            Self::Ignored => None,
        }
    }
}
