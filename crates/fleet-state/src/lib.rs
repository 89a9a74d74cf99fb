//! fleet-state — persisted state owned by the orchestrator process.
//!
//! The only state the orchestrator keeps across restarts is the next
//! external (node) port to hand out. Everything else is re-derived from the
//! cluster on every operation.
//!
//! [`PortAllocator`] owns the counter and its wraparound rule;
//! [`PortStore`] implementations decide where the counter lives.

pub mod allocator;
pub mod error;
pub mod store;

pub use allocator::{PortAllocator, PortRange};
pub use error::{StateError, StateResult};
pub use store::{FilePortStore, MemoryPortStore, PortStore};
