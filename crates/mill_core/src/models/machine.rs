//! Machine descriptors and reported status.

use serde::{Deserialize, Serialize};

/// What a machine's operator panel reports it is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// No contact or status not yet fetched.
    #[default]
    Unknown,
    /// Powered and idle.
    Idle,
    /// Executing a program.
    Running,
    /// Alarm raised; requires operator attention.
    Alarm,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Unknown => "unknown",
            RunState::Idle => "idle",
            RunState::Running => "running",
            RunState::Alarm => "alarm",
        }
    }
}

/// Per-machine operation permissions toggled from the board.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineCapabilities {
    /// Operator may start jobs from the board.
    #[serde(default)]
    pub allow_job_start: bool,
    /// Operator may delete machine-resident programs.
    #[serde(default)]
    pub allow_program_delete: bool,
    /// Machine accepts request assignment from the planner.
    #[serde(default)]
    pub allow_request_assign: bool,
    /// Machine participates in automatic machining.
    #[serde(default)]
    pub allow_auto_machining: bool,
}

/// A registered milling machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Machine {
    /// Stable unique id (the device address key).
    pub uid: String,
    /// Operator-facing display name; unique within the registry.
    pub name: String,
    /// Controller host address.
    pub host: String,
    /// Controller port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Abutment material this machine is tooled for (e.g. "Ti", "CoCr").
    #[serde(default)]
    pub material: String,
    /// Blank diameter group the fixtures accept.
    #[serde(default)]
    pub diameter_group: String,
    /// Whether the controller answered the most recent status refresh.
    #[serde(default)]
    pub reachable: bool,
    /// Operation permissions.
    #[serde(default)]
    pub capabilities: MachineCapabilities,
}

fn default_port() -> u16 {
    8193
}

/// Snapshot of a machine's reported status.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MachineStatus {
    /// Reported run state.
    #[serde(default)]
    pub run_state: RunState,
    /// Program number the controller reports as active.
    #[serde(default)]
    pub active_program_no: Option<u32>,
    /// Alarm text when `run_state` is `Alarm`.
    #[serde(default)]
    pub alarm_message: Option<String>,
}

impl MachineStatus {
    /// Whether the machine is currently running the given program number.
    pub fn is_running_program(&self, program_no: u32) -> bool {
        self.run_state == RunState::Running && self.active_program_no == Some(program_no)
    }
}
