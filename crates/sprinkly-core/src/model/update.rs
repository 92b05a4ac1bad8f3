// ── Attribute updates ──
//
// The common currency between the decoder, the event bridge, the
// dispatcher's optimistic effects and the reconciler.

use indexmap::IndexMap;
use serde::Serialize;

use super::attr::{Attr, AttrValue, Capability};
use super::entity_id::EntityId;
use super::kind::EntityKind;

/// Everything one source knows about one entity at one moment.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityUpdate {
    pub id: EntityId,
    pub kind: EntityKind,
    /// `None` keeps the current name (or the kind's default on creation).
    pub display_name: Option<String>,
    pub required_capabilities: Vec<Capability>,
    pub primary_attribute: Option<Attr>,
    pub attributes: IndexMap<Attr, AttrValue>,
}

impl EntityUpdate {
    /// Start an update carrying the kind's capabilities and primary attribute.
    pub fn new(kind: EntityKind) -> Self {
        Self {
            id: kind.entity_id(),
            kind,
            display_name: None,
            required_capabilities: kind.capabilities().to_vec(),
            primary_attribute: Some(kind.primary_attribute()),
            attributes: IndexMap::new(),
        }
    }

    /// An attribute-only update: no capability provisioning, no primary change.
    pub fn attributes_only(kind: EntityKind) -> Self {
        Self {
            id: kind.entity_id(),
            kind,
            display_name: None,
            required_capabilities: Vec::new(),
            primary_attribute: None,
            attributes: IndexMap::new(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn set(mut self, attr: Attr, value: impl Into<serde_json::Value>) -> Self {
        self.attributes.insert(attr, AttrValue::set(value));
        self
    }

    pub fn put(mut self, attr: Attr, value: AttrValue) -> Self {
        self.attributes.insert(attr, value);
        self
    }

    /// Write the same boolean to the zone, switch and toggle state attributes.
    pub fn on_off(self, on: bool) -> Self {
        self.set(Attr::ZoneState, on)
            .set(Attr::SwitchState, on)
            .set(Attr::ToggleState, on)
    }

    pub fn value(&self, attr: Attr) -> Option<&serde_json::Value> {
        self.attributes.get(&attr).and_then(AttrValue::as_value)
    }
}

/// The controller's most recent run, `[station, program, duration, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LastRun {
    pub station: usize,
    pub program: usize,
    pub duration: i64,
    pub end_time: i64,
}

impl LastRun {
    /// `true` when the record carries a usable run.
    pub fn is_complete(&self) -> bool {
        self.duration > 0 && self.end_time > 0
    }

    pub fn started_at(&self) -> i64 {
        self.end_time - self.duration
    }
}

/// One attribute write performed by the reconciler.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangedAttribute {
    pub id: EntityId,
    pub attr: Attr,
    pub old: Option<serde_json::Value>,
    pub new: serde_json::Value,
}

/// All writes produced by one `apply` call.
pub type ChangeSet = Vec<ChangedAttribute>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_update_carries_kind_defaults() {
        let update = EntityUpdate::new(EntityKind::RainDelay);
        assert_eq!(update.id, EntityId::rain_delay());
        assert_eq!(update.primary_attribute, Some(Attr::BinaryState));
        assert!(update.required_capabilities.contains(&Capability::RainDelay));
    }

    #[test]
    fn on_off_sets_all_three_state_attributes() {
        let update = EntityUpdate::attributes_only(EntityKind::Zone { index: 0 }).on_off(true);
        assert_eq!(update.value(Attr::ZoneState), Some(&json!(true)));
        assert_eq!(update.value(Attr::SwitchState), Some(&json!(true)));
        assert_eq!(update.value(Attr::ToggleState), Some(&json!(true)));
    }

    #[test]
    fn last_run_completeness() {
        let run = LastRun {
            station: 1,
            program: 0,
            duration: 60,
            end_time: 1000,
        };
        assert!(run.is_complete());
        assert_eq!(run.started_at(), 940);
        assert!(!LastRun { duration: 0, ..run }.is_complete());
        assert!(!LastRun { end_time: 0, ..run }.is_complete());
    }
}
