//! Mill Core - Coordination logic for CNC abutment milling
//!
//! This crate contains all business logic with zero UI dependencies:
//! tiered program storage, collision-free naming, per-machine production
//! queues, machining session tracking, and the program editor. It can be
//! used by the board UI or a headless service.

pub mod capability;
pub mod config;
pub mod editor;
pub mod error;
pub mod logging;
pub mod machines;
pub mod models;
pub mod naming;
pub mod queue;
pub mod session;
pub mod store;
pub mod uploads;

pub use error::{CoreError, CoreResult};

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
