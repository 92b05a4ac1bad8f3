// ── Domain model ──
//
// Entity identity, kinds, attribute names and the update shape shared by
// every component of the engine.

pub mod attr;
pub mod entity_id;
pub mod kind;
pub mod update;

// ── Re-exports ──────────────────────────────────────────────────────

pub use attr::{Attr, AttrValue, Capability};
pub use entity_id::EntityId;
pub use kind::{EntityKind, SensorKind};
pub use update::{ChangeSet, ChangedAttribute, EntityUpdate, LastRun};
