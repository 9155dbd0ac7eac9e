//! Settings struct with TOML-based sections.
//!
//! Settings are organized into logical sections that map to TOML tables.
//! Each section can be updated independently for atomic section-level updates.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root settings structure containing all configuration sections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Bridge file-server settings.
    #[serde(default)]
    pub bridge: BridgeSettings,

    /// Deadlines and cooldown windows.
    #[serde(default)]
    pub timeouts: TimeoutSettings,

    /// Defaults applied to newly registered machines.
    #[serde(default)]
    pub machine_defaults: MachineDefaults,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Bridge file-server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeSettings {
    /// Directory on the share where NC programs live.
    #[serde(default = "default_nc_dir")]
    pub nc_dir: String,

    /// Directory the upload browser starts in.
    #[serde(default = "default_upload_dir")]
    pub upload_dir: String,
}

fn default_nc_dir() -> String {
    "/NCDATA".to_string()
}

fn default_upload_dir() -> String {
    "/NCDATA/UPLOAD".to_string()
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            nc_dir: default_nc_dir(),
            upload_dir: default_upload_dir(),
        }
    }
}

/// Deadlines and cooldowns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutSettings {
    /// Per-tier fetch deadline in seconds.
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,

    /// Window within which repeated status refreshes are coalesced.
    #[serde(default = "default_status_cooldown")]
    pub status_cooldown_ms: u64,
}

fn default_fetch_timeout() -> u64 {
    8
}

fn default_status_cooldown() -> u64 {
    800
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: default_fetch_timeout(),
            status_cooldown_ms: default_status_cooldown(),
        }
    }
}

impl TimeoutSettings {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn status_cooldown(&self) -> Duration {
        Duration::from_millis(self.status_cooldown_ms)
    }
}

/// Defaults for newly registered machines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineDefaults {
    /// Controller port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Whether new machines may auto-machine.
    #[serde(default)]
    pub allow_auto_machining: bool,
}

fn default_port() -> u16 {
    8193
}

impl Default for MachineDefaults {
    fn default() -> Self {
        Self {
            port: default_port(),
            allow_auto_machining: false,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Folder for rolling log files.
    #[serde(default = "default_logs_folder")]
    pub logs_folder: String,

    /// Write a daily-rolling log file in addition to stderr.
    #[serde(default = "default_true")]
    pub file_logging: bool,

    /// Default filter directive when RUST_LOG is unset.
    #[serde(default = "default_filter")]
    pub filter: String,
}

fn default_logs_folder() -> String {
    ".logs".to_string()
}

fn default_true() -> bool {
    true
}

fn default_filter() -> String {
    "info".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            logs_folder: default_logs_folder(),
            file_logging: true,
            filter: default_filter(),
        }
    }
}

/// Names of config sections for targeted updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigSection {
    Bridge,
    Timeouts,
    MachineDefaults,
    Logging,
}

impl ConfigSection {
    /// Get the TOML table name for this section.
    pub fn table_name(&self) -> &'static str {
        match self {
            ConfigSection::Bridge => "bridge",
            ConfigSection::Timeouts => "timeouts",
            ConfigSection::MachineDefaults => "machine_defaults",
            ConfigSection::Logging => "logging",
        }
    }
}
