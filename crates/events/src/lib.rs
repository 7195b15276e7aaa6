//! Event system for build orchestration
//!
//! Typed status events and a session-scoped bus that the orchestrator writes
//! to and observers (UI, audit log, CLI) subscribe to.

mod bus;
mod types;

pub use bus::EventBus;
pub use types::*;
