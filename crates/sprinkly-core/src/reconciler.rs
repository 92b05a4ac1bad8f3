// ── Entity reconciler ──
//
// Applies `EntityUpdate`s to the host: creates missing entities, adds
// missing capabilities, and writes only attributes whose value actually
// changed, in one batch per entity. Notifications are held for the whole
// update so observers never see a half-applied entity.

use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::error::CoreError;
use crate::host::{EntityHost, HostError};
use crate::implementation::{Implementation, implementation};
use crate::model::{
    Attr, AttrValue, ChangeSet, ChangedAttribute, EntityId, EntityKind, EntityUpdate, LastRun,
};

/// Summary of one full poll cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub entities: usize,
    pub changed: usize,
    pub failed: usize,
}

/// Writes updates into an [`EntityHost`].
pub struct Reconciler {
    host: Arc<dyn EntityHost>,
    implementation: Arc<Implementation>,
}

/// Releases held notifications when dropped, including on early return.
struct HoldGuard<'a>(&'a dyn EntityHost);

impl<'a> HoldGuard<'a> {
    fn new(host: &'a dyn EntityHost) -> Self {
        host.hold_notifications();
        Self(host)
    }
}

impl Drop for HoldGuard<'_> {
    fn drop(&mut self) {
        self.0.release_notifications();
    }
}

impl Reconciler {
    pub fn new(host: Arc<dyn EntityHost>) -> Self {
        Self {
            host,
            implementation: implementation(),
        }
    }

    pub fn host(&self) -> &Arc<dyn EntityHost> {
        &self.host
    }

    /// Apply one update, creating the entity if needed.
    pub fn apply(&self, update: &EntityUpdate) -> Result<ChangeSet, CoreError> {
        let host = self.host.as_ref();
        let _hold = HoldGuard::new(host);

        if host.contains(&update.id) {
            if let Some(name) = &update.display_name {
                host.set_identity(&update.id, update.kind, name)?;
            }
        } else {
            let name = update
                .display_name
                .clone()
                .unwrap_or_else(|| update.kind.default_name());
            debug!(id = %update.id, %name, "creating entity");
            host.create(&update.id, update.kind, &name)?;
        }

        for capability in &update.required_capabilities {
            if !host.has_capability(&update.id, *capability) {
                let def = self
                    .implementation
                    .capability(*capability)
                    .ok_or_else(|| CoreError::unsupported(format!("capability {capability}")))?;
                debug!(id = %update.id, %capability, "adding capability");
                host.add_capability(&update.id, def)?;
            }
        }

        let changes = self.write_changed(&update.id, &update.attributes)?;

        if let Some(primary) = update.primary_attribute {
            host.set_primary_attribute(&update.id, primary)?;
        }

        Ok(changes)
    }

    /// Apply attribute values to an entity that must already exist.
    /// Returns an empty change set when it doesn't.
    pub fn apply_existing(
        &self,
        id: &EntityId,
        attributes: &IndexMap<Attr, AttrValue>,
    ) -> Result<ChangeSet, CoreError> {
        if !self.host.contains(id) {
            debug!(%id, "skipping update for unknown entity");
            return Ok(ChangeSet::new());
        }
        let _hold = HoldGuard::new(self.host.as_ref());
        Ok(self.write_changed(id, attributes)?)
    }

    /// Apply every update of a poll cycle, isolating per-entity failures,
    /// and mark each applied entity alive.
    pub fn apply_all(&self, updates: &[EntityUpdate]) -> CycleReport {
        let mut report = CycleReport::default();
        for update in updates {
            report.entities += 1;
            let result = self.apply(update).and_then(|changes| {
                self.host.mark_alive(&update.id)?;
                Ok(changes)
            });
            match result {
                Ok(changes) => report.changed += changes.len(),
                Err(e) => {
                    report.failed += 1;
                    warn!(id = %update.id, error = %e, "failed to apply entity update");
                }
            }
        }
        report
    }

    /// Fan the last-run record out to its station and program.
    ///
    /// Both entities receive the same `last_run` and `duration`; an entity
    /// that doesn't exist yet is skipped.
    pub fn apply_last_run(&self, run: &LastRun) -> Result<ChangeSet, CoreError> {
        if !run.is_complete() {
            return Ok(ChangeSet::new());
        }
        let attributes: IndexMap<Attr, AttrValue> = [
            (Attr::ZoneLastRun, AttrValue::set(run.started_at())),
            (Attr::ZoneDuration, AttrValue::set(run.duration)),
        ]
        .into_iter()
        .collect();

        let _hold = HoldGuard::new(self.host.as_ref());
        let mut changes = self.apply_existing(&EntityId::zone(run.station), &attributes)?;
        changes.extend(self.apply_existing(&EntityId::program(run.program), &attributes)?);
        Ok(changes)
    }

    /// Set availability on the controller entity, if it exists.
    pub fn set_system_availability(&self, available: bool) -> Result<(), CoreError> {
        let id = EntityId::system();
        if self.host.contains(&id) {
            self.host.set_availability(&id, available)?;
        }
        Ok(())
    }

    /// Kind of an existing entity.
    pub fn kind_of(&self, id: &EntityId) -> Result<EntityKind, CoreError> {
        self.host
            .kind(id)
            .ok_or_else(|| CoreError::EntityNotFound { id: id.clone() })
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn write_changed(
        &self,
        id: &EntityId,
        attributes: &IndexMap<Attr, AttrValue>,
    ) -> Result<ChangeSet, HostError> {
        let mut batch = Vec::new();
        let mut changes = ChangeSet::new();

        for (attr, value) in attributes {
            let AttrValue::Set(new) = value else {
                continue;
            };
            let old = self.host.attribute(id, *attr);
            if old.as_ref() == Some(new) {
                continue;
            }
            debug!(%id, %attr, %new, ?old, "attribute changed");
            batch.push((*attr, new.clone()));
            changes.push(ChangedAttribute {
                id: id.clone(),
                attr: *attr,
                old,
                new: new.clone(),
            });
        }

        self.host.set_attributes(id, batch)?;
        Ok(changes)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::Capability;
    use crate::store::MemoryHost;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn setup() -> (Arc<MemoryHost>, Reconciler) {
        let host = Arc::new(MemoryHost::new());
        let reconciler = Reconciler::new(host.clone());
        (host, reconciler)
    }

    fn zone(index: usize) -> EntityUpdate {
        EntityUpdate::new(EntityKind::Zone { index })
            .named("Lawn")
            .on_off(true)
            .set(Attr::ZoneRemaining, 30)
    }

    #[test]
    fn creates_entity_with_capabilities_and_primary() {
        let (host, reconciler) = setup();
        let changes = reconciler.apply(&zone(0)).unwrap();

        let entity = host.get(&EntityId::zone(0)).unwrap();
        assert_eq!(entity.name, "Lawn");
        assert_eq!(
            entity.capabilities,
            vec![
                Capability::IrrigationZone,
                Capability::PowerSwitch,
                Capability::Toggle,
                Capability::Vendor
            ]
        );
        assert_eq!(entity.primary_attribute, Some(Attr::ZoneState));
        assert_eq!(changes.len(), 4);
    }

    #[test]
    fn identical_update_writes_nothing() {
        let (host, reconciler) = setup();
        reconciler.apply(&zone(0)).unwrap();
        let version = host.version();

        let changes = reconciler.apply(&zone(0)).unwrap();
        assert!(changes.is_empty());
        assert_eq!(host.version(), version);
    }

    #[test]
    fn deep_equal_values_are_not_rewritten() {
        let (host, reconciler) = setup();
        let update = EntityUpdate::new(EntityKind::Program { index: 0 })
            .set(Attr::ProgramData, json!([60, [0, 30]]));
        reconciler.apply(&update).unwrap();

        let again = EntityUpdate::new(EntityKind::Program { index: 0 })
            .set(Attr::ProgramData, json!([60, [0, 30]]));
        assert!(reconciler.apply(&again).unwrap().is_empty());
        assert_eq!(
            host.attribute(&EntityId::program(0), Attr::ProgramData),
            Some(json!([60, [0, 30]]))
        );
    }

    #[test]
    fn ignored_values_are_never_written() {
        let (host, reconciler) = setup();
        reconciler.apply(&zone(0)).unwrap();

        let update = EntityUpdate::attributes_only(EntityKind::Zone { index: 0 })
            .put(Attr::ZoneRemaining, AttrValue::Ignored)
            .put(Attr::ZoneLastRun, AttrValue::Ignored);
        assert!(reconciler.apply(&update).unwrap().is_empty());
        assert_eq!(
            host.attribute(&EntityId::zone(0), Attr::ZoneRemaining),
            Some(json!(30))
        );
        assert_eq!(host.attribute(&EntityId::zone(0), Attr::ZoneLastRun), None);
    }

    #[test]
    fn one_notification_per_update() {
        let (host, reconciler) = setup();
        let mut stream = host.subscribe();
        let before = host.version();

        reconciler.apply(&zone(0)).unwrap();

        assert_eq!(host.version(), before + 1);
        assert!(stream.current().is_empty());
        assert_eq!(stream.latest().len(), 1);
    }

    #[test]
    fn capabilities_are_additive() {
        let (host, reconciler) = setup();
        reconciler.apply(&zone(0)).unwrap();

        let mut narrower = zone(0);
        narrower.required_capabilities = vec![Capability::IrrigationZone];
        reconciler.apply(&narrower).unwrap();

        assert_eq!(host.get(&EntityId::zone(0)).unwrap().capabilities.len(), 4);
    }

    #[test]
    fn name_refreshes_only_when_given() {
        let (host, reconciler) = setup();
        reconciler.apply(&zone(0)).unwrap();

        let unnamed = EntityUpdate::attributes_only(EntityKind::Zone { index: 0 });
        reconciler.apply(&unnamed).unwrap();
        assert_eq!(host.get(&EntityId::zone(0)).unwrap().name, "Lawn");

        reconciler.apply(&zone(0).named("Front lawn")).unwrap();
        assert_eq!(host.get(&EntityId::zone(0)).unwrap().name, "Front lawn");
    }

    #[test]
    fn failing_entity_does_not_abort_cycle() {
        let (host, reconciler) = setup();
        // A sensor update writing a zone attribute is rejected by the host.
        let bad = EntityUpdate::new(EntityKind::Sensor { slot: 1 }).set(Attr::ZoneState, true);
        let report = reconciler.apply_all(&[bad, zone(0)]);

        assert_eq!(report.entities, 2);
        assert_eq!(report.failed, 1);
        let lawn = host.get(&EntityId::zone(0)).unwrap();
        assert!(lawn.alive);
        assert_eq!(lawn.attribute(Attr::ZoneState), Some(&json!(true)));
    }

    #[test]
    fn last_run_fans_out_to_station_and_program() {
        let (host, reconciler) = setup();
        reconciler.apply(&zone(1)).unwrap();
        reconciler
            .apply(&EntityUpdate::new(EntityKind::Program { index: 0 }))
            .unwrap();

        let run = LastRun {
            station: 1,
            program: 0,
            duration: 60,
            end_time: 1000,
        };
        let changes = reconciler.apply_last_run(&run).unwrap();
        assert_eq!(changes.len(), 4);

        for id in [EntityId::zone(1), EntityId::program(0)] {
            assert_eq!(host.attribute(&id, Attr::ZoneLastRun), Some(json!(940)));
            assert_eq!(host.attribute(&id, Attr::ZoneDuration), Some(json!(60)));
        }
    }

    #[test]
    fn incomplete_last_run_is_not_applied() {
        let (host, reconciler) = setup();
        reconciler.apply(&zone(1)).unwrap();

        let run = LastRun {
            station: 1,
            program: 0,
            duration: 0,
            end_time: 1000,
        };
        assert!(reconciler.apply_last_run(&run).unwrap().is_empty());
        assert_eq!(host.attribute(&EntityId::zone(1), Attr::ZoneLastRun), None);
    }
}
