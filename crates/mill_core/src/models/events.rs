//! Machining push events and the per-machine session they drive.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Event pushed from the shop-floor transport for one machine.
///
/// `at` is the transport's send timestamp when it supplies one; ticks older
/// than the session's baseline are dropped to tolerate reordering.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MachiningEvent {
    /// A job went on the spindle.
    Started {
        machine_uid: String,
        /// Queue-record id of the job, when the sender knows it.
        #[serde(default)]
        queue_id: Option<String>,
        #[serde(default)]
        program_no: Option<u32>,
        #[serde(default)]
        label: Option<String>,
        #[serde(default)]
        at: Option<DateTime<Utc>>,
    },
    /// Periodic progress report while machining.
    Tick {
        machine_uid: String,
        /// Seconds elapsed since the job started, per the sender.
        elapsed_seconds: u64,
        #[serde(default)]
        at: Option<DateTime<Utc>>,
    },
    /// The job finished.
    Completed {
        machine_uid: String,
        #[serde(default)]
        queue_id: Option<String>,
        /// Authoritative total duration, when the sender computed one.
        #[serde(default)]
        duration_seconds: Option<u64>,
        /// Elapsed figure carried on the completion event itself.
        #[serde(default)]
        elapsed_seconds: Option<u64>,
        #[serde(default)]
        at: Option<DateTime<Utc>>,
    },
}

impl MachiningEvent {
    /// Machine the event addresses.
    pub fn machine_uid(&self) -> &str {
        match self {
            MachiningEvent::Started { machine_uid, .. }
            | MachiningEvent::Tick { machine_uid, .. }
            | MachiningEvent::Completed { machine_uid, .. } => machine_uid,
        }
    }
}

/// Live machining state for one machine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MachiningSession {
    /// Whether a job is currently on the spindle.
    pub running: bool,
    /// Queue-record id of the running job, if known.
    #[serde(default)]
    pub queue_id: Option<String>,
    #[serde(default)]
    pub program_no: Option<u32>,
    #[serde(default)]
    pub label: Option<String>,
    /// Latest elapsed-seconds figure.
    #[serde(default)]
    pub elapsed_seconds: u64,
    /// Timestamp of the event that set `elapsed_seconds`.
    #[serde(default)]
    pub last_event_at: Option<DateTime<Utc>>,
}

/// Completion snapshot kept after a session ends.
///
/// Survives session resets; a board restart re-seeds these from the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRecord {
    pub machine_uid: String,
    #[serde(default)]
    pub queue_id: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    /// Final duration in seconds after the fallback chain.
    pub duration_seconds: u64,
    pub completed_at: DateTime<Utc>,
}
