//! Data model types shared across the coordination core.

pub mod events;
pub mod machine;
pub mod program;
pub mod queue;

pub use events::{CompletionRecord, MachiningEvent, MachiningSession};
pub use machine::{Machine, MachineCapabilities, MachineStatus, RunState};
pub use program::{DeviceProgramEntry, ProgramRef, ProgramSource};
pub use queue::{QueueBatch, QueueItem, QueueStatus};
