// sprinkly-core: State-sync and command-dispatch engine for OpenSprinkler controllers

pub mod action;
pub mod bridge;
pub mod command;
pub mod config;
pub mod controller;
pub mod decoder;
pub mod dispatcher;
pub mod error;
pub mod health;
pub mod host;
pub mod implementation;
pub mod model;
pub mod poller;
pub mod reconciler;
pub mod store;
pub mod stream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use command::{Command, CommandOutcome, SentCommand};
pub use config::{ControllerConfig, PushSettings};
pub use controller::Controller;
pub use error::CoreError;
pub use health::Availability;
pub use host::{EntityHost, HostError};
pub use reconciler::CycleReport;
pub use store::{Entity, MemoryHost};
pub use stream::{AttributeChange, ChangeStream, EntityStream, Snapshot};

// Re-export model types at crate root for convenience.
pub use model::{
    Attr, AttrValue, Capability, ChangeSet, ChangedAttribute, EntityId, EntityKind, EntityUpdate,
    LastRun, SensorKind,
};

pub use sprinkly_api::{PushEvent, PushMessage, ResultCode};
