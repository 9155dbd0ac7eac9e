//! Trait seams for every external collaborator.
//!
//! The core never talks to the network directly. Device calls, bridge file
//! I/O, object storage, and the write-authorization gate are all injected
//! behind these traits so the coordination logic stays testable with
//! in-memory fakes.

pub mod authorize;
pub mod bridge;
pub mod device;
pub mod object;

pub use authorize::{AlwaysAllow, AlwaysDeny, WriteAuthorizer, WriteContext};
pub use bridge::{BridgeEntry, BridgeStore};
pub use device::{DeviceCapability, DeviceClient, DeviceReply};
pub use object::ObjectStore;
