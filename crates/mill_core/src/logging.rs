//! Logging infrastructure.
//!
//! Application-wide logs go through the `tracing` ecosystem; the board UI
//! additionally reads a small per-machine ring of recent activity lines
//! kept by [`MachineLog`].

use std::collections::{HashMap, VecDeque};

use chrono::Local;
use parking_lot::Mutex;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingSettings;

/// Initialize the global tracing subscriber.
///
/// Respects RUST_LOG, falling back to the configured filter. When file
/// logging is enabled a daily-rolling log file is written next to stderr
/// output; the returned guard must be kept alive for the file writer to
/// flush.
///
/// Should be called once at application startup.
pub fn init_tracing(settings: &LoggingSettings) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.filter.clone()));

    let stderr_layer = fmt::layer().with_target(true).with_thread_ids(false);

    if settings.file_logging {
        let appender = tracing_appender::rolling::daily(&settings.logs_folder, "mill_core.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        tracing_subscriber::registry()
            .with(stderr_layer)
            .with(fmt::layer().with_ansi(false).with_writer(writer))
            .with(filter)
            .init();
        Some(guard)
    } else {
        tracing_subscriber::registry()
            .with(stderr_layer)
            .with(filter)
            .init();
        None
    }
}

/// Bounded per-machine ring of recent activity lines.
///
/// Holds the last `capacity` lines per machine for the board's activity
/// panel; older lines fall off the front.
pub struct MachineLog {
    capacity: usize,
    lines: Mutex<HashMap<String, VecDeque<String>>>,
}

impl MachineLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            lines: Mutex::new(HashMap::new()),
        }
    }

    /// Append one timestamped line for a machine.
    pub fn push(&self, machine_uid: &str, message: &str) {
        let stamped = format!("[{}] {}", Local::now().format("%H:%M:%S"), message);
        let mut lines = self.lines.lock();
        let ring = lines.entry(machine_uid.to_string()).or_default();
        if ring.len() >= self.capacity {
            ring.pop_front();
        }
        ring.push_back(stamped);
    }

    /// Recent lines for a machine, oldest first.
    pub fn tail(&self, machine_uid: &str) -> Vec<String> {
        self.lines
            .lock()
            .get(machine_uid)
            .map(|r| r.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn clear(&self, machine_uid: &str) {
        self.lines.lock().remove(machine_uid);
    }
}
