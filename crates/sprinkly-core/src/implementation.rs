// ── Implementation data ──
//
// Capability definitions handed to the host when an entity gains a
// capability. Built once per process and shared read-only by every
// controller instance.

use std::sync::{Arc, OnceLock};

use indexmap::IndexMap;
use strum::IntoEnumIterator;

use crate::model::{Attr, Capability};

/// Host-facing description of one capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityDef {
    pub capability: Capability,
    pub attributes: Vec<Attr>,
    pub actions: Vec<&'static str>,
}

/// All capability definitions this engine knows.
#[derive(Debug)]
pub struct Implementation {
    capabilities: IndexMap<Capability, CapabilityDef>,
}

impl Implementation {
    fn build() -> Self {
        let capabilities = Capability::iter()
            .map(|capability| {
                let attributes = Attr::iter().filter(|a| a.capability() == capability).collect();
                let def = CapabilityDef {
                    capability,
                    attributes,
                    actions: actions_for(capability).to_vec(),
                };
                (capability, def)
            })
            .collect();
        Self { capabilities }
    }

    pub fn capability(&self, capability: Capability) -> Option<&CapabilityDef> {
        self.capabilities.get(&capability)
    }

    pub fn capabilities(&self) -> impl Iterator<Item = &CapabilityDef> {
        self.capabilities.values()
    }
}

fn actions_for(capability: Capability) -> &'static [&'static str] {
    match capability {
        Capability::IrrigationZone => &["run", "stop", "enable", "disable", "set"],
        Capability::PowerSwitch => &["on", "off", "set"],
        Capability::Toggle => &["toggle"],
        Capability::RainDelay => &["set"],
        Capability::BinarySensor | Capability::StringSensor | Capability::Vendor => &[],
    }
}

static IMPLEMENTATION: OnceLock<Arc<Implementation>> = OnceLock::new();

/// The shared implementation data, built on first use.
pub fn implementation() -> Arc<Implementation> {
    Arc::clone(IMPLEMENTATION.get_or_init(|| Arc::new(Implementation::build())))
}
