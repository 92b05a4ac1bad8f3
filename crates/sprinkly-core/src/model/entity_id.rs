// ── Entity identity ──
//
// Every entity the engine manages is keyed by a stable string id derived
// from its position on the controller (`os_station_3`, `os_program_1`) or
// from a fixed name (`system`, `os_raindelay`). Ids never change once an
// entity exists.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Canonical identifier for a managed entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Station by zero-based index (`os_station_{index + 1}`).
    pub fn zone(index: usize) -> Self {
        Self(format!("os_station_{}", index + 1))
    }

    /// Program by zero-based index (`os_program_{index + 1}`).
    pub fn program(index: usize) -> Self {
        Self(format!("os_program_{}", index + 1))
    }

    /// Sensor by one-based slot (`os_sensor1`, `os_sensor2`).
    pub fn sensor(slot: u8) -> Self {
        Self(format!("os_sensor{slot}"))
    }

    pub fn rain_delay() -> Self {
        Self("os_raindelay".into())
    }

    pub fn water_level() -> Self {
        Self("os_waterlevel".into())
    }

    /// The controller-wide aggregate entity.
    pub fn system() -> Self {
        Self("system".into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}
