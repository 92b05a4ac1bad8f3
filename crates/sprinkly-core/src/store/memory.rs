// ── In-memory entity host ──
//
// Concurrent storage with O(1) lookups and push-based change
// notification via `watch` channels. Writes inside a held notification
// window are coalesced into one snapshot rebuild.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use dashmap::DashMap;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;

use crate::host::{EntityHost, HostError};
use crate::implementation::CapabilityDef;
use crate::model::{Attr, Capability, EntityId, EntityKind};
use crate::stream::EntityStream;

/// One entity as stored by [`MemoryHost`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entity {
    pub id: EntityId,
    pub kind: EntityKind,
    pub name: String,
    pub capabilities: Vec<Capability>,
    pub attributes: IndexMap<Attr, Value>,
    pub primary_attribute: Option<Attr>,
    pub alive: bool,
    pub available: bool,
}

impl Entity {
    fn new(id: EntityId, kind: EntityKind, name: &str) -> Self {
        Self {
            id,
            kind,
            name: name.to_owned(),
            capabilities: Vec::new(),
            attributes: IndexMap::new(),
            primary_attribute: None,
            alive: false,
            available: true,
        }
    }

    pub fn attribute(&self, attr: Attr) -> Option<&Value> {
        self.attributes.get(&attr)
    }

    /// The primary attribute's current value, if set.
    pub fn primary_value(&self) -> Option<&Value> {
        self.primary_attribute.and_then(|a| self.attributes.get(&a))
    }
}

/// A reactive, thread-safe [`EntityHost`].
///
/// Every committed mutation bumps a version counter and rebuilds the
/// snapshot that subscribers receive.
pub struct MemoryHost {
    entities: DashMap<EntityId, Entity>,

    /// Version counter, bumped once per published change.
    version: watch::Sender<u64>,

    /// Full snapshot, ordered by kind then index.
    snapshot: watch::Sender<Arc<Vec<Arc<Entity>>>>,

    hold_depth: AtomicUsize,
    dirty: AtomicBool,
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryHost {
    pub fn new() -> Self {
        let (version, _) = watch::channel(0u64);
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            entities: DashMap::new(),
            version,
            snapshot,
            hold_depth: AtomicUsize::new(0),
            dirty: AtomicBool::new(false),
        }
    }

    /// Clone of one entity.
    pub fn get(&self, id: &EntityId) -> Option<Entity> {
        self.entities.get(id).map(|e| e.value().clone())
    }

    /// Get the current snapshot (cheap `Arc` clone).
    pub fn snapshot(&self) -> Arc<Vec<Arc<Entity>>> {
        self.snapshot.borrow().clone()
    }

    /// Subscribe to snapshot changes.
    pub fn subscribe(&self) -> EntityStream {
        EntityStream::new(self.snapshot.subscribe())
    }

    /// Number of published changes so far.
    pub fn version(&self) -> u64 {
        *self.version.borrow()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn with_entity<R>(
        &self,
        id: &EntityId,
        f: impl FnOnce(&mut Entity) -> Result<R, HostError>,
    ) -> Result<R, HostError> {
        let mut entry = self
            .entities
            .get_mut(id)
            .ok_or_else(|| HostError::Missing(id.clone()))?;
        f(entry.value_mut())
    }

    /// Publish now, or mark dirty while notifications are held.
    fn notify(&self) {
        if self.hold_depth.load(Ordering::Acquire) > 0 {
            self.dirty.store(true, Ordering::Release);
        } else {
            self.publish();
        }
    }

    fn publish(&self) {
        let mut values: Vec<Arc<Entity>> = self
            .entities
            .iter()
            .map(|r| Arc::new(r.value().clone()))
            .collect();
        values.sort_by_key(|e| e.kind.sort_key());
        // `send_modify` updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|snap| *snap = Arc::new(values));
        self.version.send_modify(|v| *v += 1);
    }
}

impl EntityHost for MemoryHost {
    fn contains(&self, id: &EntityId) -> bool {
        self.entities.contains_key(id)
    }

    fn kind(&self, id: &EntityId) -> Option<EntityKind> {
        self.entities.get(id).map(|e| e.kind)
    }

    fn create(&self, id: &EntityId, kind: EntityKind, name: &str) -> Result<(), HostError> {
        if self.entities.contains_key(id) {
            return Err(HostError::Exists { id: id.clone() });
        }
        self.entities
            .insert(id.clone(), Entity::new(id.clone(), kind, name));
        self.notify();
        Ok(())
    }

    fn set_identity(&self, id: &EntityId, kind: EntityKind, name: &str) -> Result<(), HostError> {
        let changed = self.with_entity(id, |e| {
            let changed = e.kind != kind || e.name != name;
            e.kind = kind;
            name.clone_into(&mut e.name);
            Ok(changed)
        })?;
        if changed {
            self.notify();
        }
        Ok(())
    }

    fn has_capability(&self, id: &EntityId, capability: Capability) -> bool {
        self.entities
            .get(id)
            .is_some_and(|e| e.capabilities.contains(&capability))
    }

    fn add_capability(&self, id: &EntityId, def: &CapabilityDef) -> Result<(), HostError> {
        let added = self.with_entity(id, |e| {
            if e.capabilities.contains(&def.capability) {
                Ok(false)
            } else {
                e.capabilities.push(def.capability);
                Ok(true)
            }
        })?;
        if added {
            self.notify();
        }
        Ok(())
    }

    fn attribute(&self, id: &EntityId, attr: Attr) -> Option<Value> {
        self.entities
            .get(id)
            .and_then(|e| e.attributes.get(&attr).cloned())
    }

    fn set_attributes(&self, id: &EntityId, batch: Vec<(Attr, Value)>) -> Result<(), HostError> {
        if batch.is_empty() {
            return Ok(());
        }
        self.with_entity(id, |e| {
            if let Some((attr, _)) = batch
                .iter()
                .find(|(attr, _)| !e.capabilities.contains(&attr.capability()))
            {
                return Err(HostError::NoCapability {
                    id: id.clone(),
                    attr: *attr,
                });
            }
            e.attributes.extend(batch);
            Ok(())
        })?;
        self.notify();
        Ok(())
    }

    fn set_primary_attribute(&self, id: &EntityId, attr: Attr) -> Result<(), HostError> {
        let changed = self.with_entity(id, |e| {
            let changed = e.primary_attribute != Some(attr);
            e.primary_attribute = Some(attr);
            Ok(changed)
        })?;
        if changed {
            self.notify();
        }
        Ok(())
    }

    fn set_availability(&self, id: &EntityId, available: bool) -> Result<(), HostError> {
        let changed = self.with_entity(id, |e| {
            let changed = e.available != available;
            e.available = available;
            Ok(changed)
        })?;
        if changed {
            self.notify();
        }
        Ok(())
    }

    fn mark_alive(&self, id: &EntityId) -> Result<(), HostError> {
        let changed = self.with_entity(id, |e| {
            let changed = !e.alive;
            e.alive = true;
            Ok(changed)
        })?;
        if changed {
            self.notify();
        }
        Ok(())
    }

    fn hold_notifications(&self) {
        self.hold_depth.fetch_add(1, Ordering::AcqRel);
    }

    fn release_notifications(&self) {
        let previous = self.hold_depth.fetch_sub(1, Ordering::AcqRel);
        if previous == 1 && self.dirty.swap(false, Ordering::AcqRel) {
            self.publish();
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::implementation::implementation;
    use serde_json::json;

    fn zone_host() -> (MemoryHost, EntityId) {
        let host = MemoryHost::new();
        let id = EntityId::zone(0);
        host.create(&id, EntityKind::Zone { index: 0 }, "Lawn").unwrap();
        let def = implementation()
            .capability(Capability::IrrigationZone)
            .cloned()
            .unwrap();
        host.add_capability(&id, &def).unwrap();
        (host, id)
    }

    #[test]
    fn create_rejects_duplicates() {
        let (host, id) = zone_host();
        let err = host.create(&id, EntityKind::Zone { index: 0 }, "Again");
        assert_eq!(err, Err(HostError::Exists { id }));
    }

    #[test]
    fn attributes_need_their_capability() {
        let (host, id) = zone_host();
        let err = host.set_attributes(&id, vec![(Attr::BinaryState, json!(true))]);
        assert!(matches!(err, Err(HostError::NoCapability { .. })));

        host.set_attributes(&id, vec![(Attr::ZoneState, json!(true))])
            .unwrap();
        assert_eq!(host.attribute(&id, Attr::ZoneState), Some(json!(true)));
    }

    #[test]
    fn held_writes_publish_once() {
        let (host, id) = zone_host();
        let before = host.version();

        host.hold_notifications();
        host.set_attributes(&id, vec![(Attr::ZoneState, json!(true))])
            .unwrap();
        host.set_attributes(&id, vec![(Attr::ZoneRemaining, json!(30))])
            .unwrap();
        host.mark_alive(&id).unwrap();
        assert_eq!(host.version(), before);
        host.release_notifications();

        assert_eq!(host.version(), before + 1);
    }

    #[test]
    fn snapshot_orders_controller_before_zones() {
        let host = MemoryHost::new();
        host.create(&EntityId::zone(1), EntityKind::Zone { index: 1 }, "B")
            .unwrap();
        host.create(&EntityId::system(), EntityKind::Controller, "OS")
            .unwrap();
        host.create(&EntityId::zone(0), EntityKind::Zone { index: 0 }, "A")
            .unwrap();

        let names: Vec<String> = host.snapshot().iter().map(|e| e.name.clone()).collect();
        assert_eq!(names, ["OS", "A", "B"]);
    }

    #[test]
    fn unchanged_availability_does_not_notify() {
        let (host, id) = zone_host();
        let before = host.version();
        host.set_availability(&id, true).unwrap();
        assert_eq!(host.version(), before);
        host.set_availability(&id, false).unwrap();
        assert_eq!(host.version(), before + 1);
    }
}
