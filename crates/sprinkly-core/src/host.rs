// ── Entity host port ──
//
// The engine owns no entity storage. Everything it knows about existing
// entities it reads through this trait, and every write goes through it.
// `store::MemoryHost` is the in-process implementation.

use serde_json::Value;
use thiserror::Error;

use crate::implementation::CapabilityDef;
use crate::model::{Attr, Capability, EntityId, EntityKind};

/// Failures reported by an entity host.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("no entity with id {0}")]
    Missing(EntityId),

    #[error("entity {id} already exists")]
    Exists { id: EntityId },

    #[error("entity {id} has no capability for attribute {attr}")]
    NoCapability { id: EntityId, attr: Attr },

    #[error("host rejected the write: {0}")]
    Rejected(String),
}

/// Entity storage supplied by the embedding application.
///
/// Implementations must be safe to read from any task; the engine
/// serializes all writes through its single scheduling task.
pub trait EntityHost: Send + Sync {
    fn contains(&self, id: &EntityId) -> bool;

    /// Kind recorded at creation, or `None` if the entity doesn't exist.
    fn kind(&self, id: &EntityId) -> Option<EntityKind>;

    fn create(&self, id: &EntityId, kind: EntityKind, name: &str) -> Result<(), HostError>;

    /// Refresh the display name and kind of an existing entity.
    fn set_identity(&self, id: &EntityId, kind: EntityKind, name: &str) -> Result<(), HostError>;

    fn has_capability(&self, id: &EntityId, capability: Capability) -> bool;

    fn add_capability(&self, id: &EntityId, def: &CapabilityDef) -> Result<(), HostError>;

    fn attribute(&self, id: &EntityId, attr: Attr) -> Option<Value>;

    /// Write a batch of attributes with a single change notification.
    fn set_attributes(&self, id: &EntityId, batch: Vec<(Attr, Value)>) -> Result<(), HostError>;

    fn set_primary_attribute(&self, id: &EntityId, attr: Attr) -> Result<(), HostError>;

    fn set_availability(&self, id: &EntityId, available: bool) -> Result<(), HostError>;

    /// Record that the entity was seen in the latest successful cycle.
    fn mark_alive(&self, id: &EntityId) -> Result<(), HostError> {
        if self.contains(id) {
            Ok(())
        } else {
            Err(HostError::Missing(id.clone()))
        }
    }

    /// Begin a window in which change notifications are coalesced.
    fn hold_notifications(&self) {}

    /// End a window opened by [`hold_notifications`](Self::hold_notifications),
    /// publishing one notification if anything changed inside it.
    fn release_notifications(&self) {}

    // ── Typed reads ──────────────────────────────────────────────────

    fn bool_attribute(&self, id: &EntityId, attr: Attr) -> Option<bool> {
        self.attribute(id, attr).as_ref().and_then(Value::as_bool)
    }

    fn i64_attribute(&self, id: &EntityId, attr: Attr) -> Option<i64> {
        self.attribute(id, attr).as_ref().and_then(Value::as_i64)
    }
}
