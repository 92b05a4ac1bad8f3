// ── Entity storage ──
//
// The engine talks to storage only through `host::EntityHost`. This module
// provides the in-process implementation used by the CLI and tests.

mod memory;

pub use memory::{Entity, MemoryHost};
