//! Production queue item model and batch mutation shape.

use serde::{Deserialize, Serialize};

use super::program::ProgramSource;

/// Lifecycle status of a queued job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueStatus {
    /// Queued and eligible to start.
    #[default]
    Waiting,
    /// Currently on the spindle.
    Machining,
    /// Held by the operator; skipped by auto start.
    Paused,
    /// Finished successfully.
    Done,
    /// Removed before completion.
    Cancelled,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Waiting => "WAITING",
            QueueStatus::Machining => "MACHINING",
            QueueStatus::Paused => "PAUSED",
            QueueStatus::Done => "DONE",
            QueueStatus::Cancelled => "CANCELLED",
        }
    }

    /// Whether the item still occupies a slot in the visible queue.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            QueueStatus::Waiting | QueueStatus::Machining | QueueStatus::Paused
        )
    }
}

/// One entry in a machine's production queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    /// Queue-record id, unique per machine.
    pub id: String,
    /// Machine uid this entry belongs to.
    pub machine_uid: String,
    /// Display label (program or request name).
    pub label: String,
    /// Machine-resident program number, when known.
    #[serde(default)]
    pub program_no: Option<u32>,
    /// Bridge path of the program text, when bridge sourced.
    #[serde(default)]
    pub bridge_path: Option<String>,
    /// Where the queued program came from.
    pub source: ProgramSource,
    /// Blank diameter group, used to bucket jobs on the board.
    #[serde(default)]
    pub diameter_group: String,
    /// Opaque work-order display strings (clinic, patient, lot numbers).
    /// Never parsed here, only threaded through for labeling.
    #[serde(default)]
    pub meta: serde_json::Value,
    /// Parts remaining; never below 1 while active.
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    /// Lifecycle status.
    #[serde(default)]
    pub status: QueueStatus,
}

fn default_quantity() -> u32 {
    1
}

impl QueueItem {
    /// Whether `other` addresses the same program from the same source.
    ///
    /// Used for add-time dedupe: same source plus same program number, or
    /// same source plus same label when neither side has a number.
    pub fn is_duplicate_of(&self, other: &QueueItem) -> bool {
        if self.source != other.source {
            return false;
        }
        match (self.program_no, other.program_no) {
            (Some(a), Some(b)) => a == b,
            (None, None) => self.label == other.label,
            _ => false,
        }
    }
}

/// One batch of queue mutations, applied atomically per machine.
///
/// Application order is deletions, then quantities, then pause flags, then
/// ordering, so a later step never resurrects something an earlier step
/// removed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueBatch {
    /// Ids to delete.
    #[serde(default)]
    pub delete: Vec<String>,
    /// Quantity updates, clamped to at least 1.
    #[serde(default)]
    pub quantities: Vec<(String, u32)>,
    /// Pause flag updates.
    #[serde(default)]
    pub paused: Vec<(String, bool)>,
    /// Full desired ordering by id. Unknown ids are ignored; known ids not
    /// listed keep their prior relative order after the listed ones.
    #[serde(default)]
    pub order: Option<Vec<String>>,
    /// Drop every non-machining entry before applying the rest.
    #[serde(default)]
    pub clear: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, source: ProgramSource, no: Option<u32>, label: &str) -> QueueItem {
        QueueItem {
            id: id.into(),
            machine_uid: "m1".into(),
            label: label.into(),
            program_no: no,
            bridge_path: None,
            source,
            diameter_group: String::new(),
            meta: serde_json::Value::Null,
            quantity: 1,
            status: QueueStatus::Waiting,
        }
    }

    #[test]
    fn duplicate_needs_same_source() {
        let a = item("a", ProgramSource::Bridge, Some(10), "O0010.nc");
        let b = item("b", ProgramSource::Machine, Some(10), "O0010");
        assert!(!a.is_duplicate_of(&b));
    }

    #[test]
    fn duplicate_by_number_or_label() {
        let a = item("a", ProgramSource::Bridge, Some(10), "first.nc");
        let b = item("b", ProgramSource::Bridge, Some(10), "second.nc");
        assert!(a.is_duplicate_of(&b));

        let c = item("c", ProgramSource::Bridge, None, "same.nc");
        let d = item("d", ProgramSource::Bridge, None, "same.nc");
        assert!(c.is_duplicate_of(&d));

        // A numbered item never matches an unnumbered one.
        assert!(!a.is_duplicate_of(&c));
    }

    #[test]
    fn status_activity() {
        assert!(QueueStatus::Paused.is_active());
        assert!(!QueueStatus::Done.is_active());
        assert_eq!(QueueStatus::Machining.as_str(), "MACHINING");
    }
}
