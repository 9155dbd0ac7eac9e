//! Collision-free naming and numbering.
//!
//! Controllers address programs by 4-digit O-number, so free-slot searches
//! are bounded rings over 1..=9999. Names that do not follow the O-number
//! convention fall back to `_1`, `_2` suffixes. All searches are pure over
//! a caller-supplied occupancy test; exhaustion is an error, never a loop.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::error::{CoreError, CoreResult};

/// Highest machine-resident program number.
pub const MAX_PROGRAM_NO: u32 = 9999;

/// Upper bound for the generic program-number scan.
pub const MAX_GENERIC_NO: u32 = 999_999;

static O_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[Oo](\d{4})$").expect("valid regex"));

/// Split a file name into stem and extension (extension includes the dot).
fn split_ext(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => (&name[..idx], &name[idx..]),
        _ => (name, ""),
    }
}

/// Next program number in the 1..=9999 ring after `start`, wrapping past
/// 9999 and skipping occupied numbers. Fails after a full lap.
pub fn next_free_program_no(start: u32, occupied: impl Fn(u32) -> bool) -> CoreResult<u32> {
    let mut candidate = start;
    for _ in 0..MAX_PROGRAM_NO {
        candidate = if candidate >= MAX_PROGRAM_NO { 1 } else { candidate + 1 };
        if !occupied(candidate) {
            return Ok(candidate);
        }
    }
    Err(CoreError::naming_exhausted("program number", MAX_PROGRAM_NO))
}

/// A free variant of `desired` among names for which `exists` holds.
///
/// O-number style names walk the 4-digit ring (`O3001.nc` yields
/// `O3002.nc`, wrapping past 9999); anything else gets a numeric suffix
/// (`part.nc` yields `part_1.nc`). The occupancy test receives the full
/// candidate name; callers compare case-insensitively when the underlying
/// store does.
pub fn next_free_name(desired: &str, exists: impl Fn(&str) -> bool) -> CoreResult<String> {
    if !exists(desired) {
        return Ok(desired.to_string());
    }
    let (stem, ext) = split_ext(desired);
    if let Some(caps) = O_NAME_RE.captures(stem) {
        let start: u32 = caps[1].parse().unwrap_or(0);
        let no = next_free_program_no(start, |n| exists(&format!("O{n:04}{ext}")))?;
        return Ok(format!("O{no:04}{ext}"));
    }
    for n in 1..=MAX_PROGRAM_NO {
        let candidate = format!("{stem}_{n}{ext}");
        if !exists(&candidate) {
            return Ok(candidate);
        }
    }
    Err(CoreError::naming_exhausted("file name", MAX_PROGRAM_NO))
}

/// Smallest unused number at or above one past the current maximum.
///
/// Used for job-side numbering where the 4-digit limit does not apply; the
/// scan is bounded at 999,999.
pub fn next_generic_no(used: &[u32]) -> CoreResult<u32> {
    let start = used.iter().copied().max().map_or(1, |m| m + 1);
    let mut candidate = start;
    while candidate <= MAX_GENERIC_NO {
        if !used.contains(&candidate) {
            return Ok(candidate);
        }
        candidate += 1;
    }
    Err(CoreError::naming_exhausted("generic number", MAX_GENERIC_NO))
}

/// Operator's answer to a name collision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictDecision {
    /// Replace the existing file.
    Overwrite,
    /// Use the suggested free name instead.
    AutoRename,
    /// Skip this file; the rest of the batch continues.
    Cancel,
}

/// Details shown when asking the operator about a collision.
#[derive(Debug, Clone)]
pub struct ConflictInfo {
    /// Name that collided.
    pub name: String,
    /// Free name the auto-rename option would use.
    pub suggested: String,
}

/// How a batch operation resolves collisions.
#[async_trait::async_trait]
pub trait ConflictPolicy: Send + Sync {
    async fn resolve(&self, conflict: &ConflictInfo) -> ConflictDecision;
}

/// Policy answering every conflict the same way. Covers non-interactive
/// callers and tests.
pub struct FixedPolicy(pub ConflictDecision);

#[async_trait::async_trait]
impl ConflictPolicy for FixedPolicy {
    async fn resolve(&self, _conflict: &ConflictInfo) -> ConflictDecision {
        self.0
    }
}

/// One outstanding collision prompt.
///
/// The host hands this to its UI; whichever button fires first wins.
/// `decide` consumes the inner sender, so a second call (double click,
/// dismiss racing a button) is a no-op returning `false`.
pub struct PendingConflict {
    info: ConflictInfo,
    tx: parking_lot::Mutex<Option<oneshot::Sender<ConflictDecision>>>,
}

impl PendingConflict {
    /// Create a prompt and the receiver the asking side awaits.
    ///
    /// A dropped prompt (operator closed the dialog) resolves the receiver
    /// with an error; callers treat that as `Cancel`.
    pub fn new(info: ConflictInfo) -> (Self, oneshot::Receiver<ConflictDecision>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                info,
                tx: parking_lot::Mutex::new(Some(tx)),
            },
            rx,
        )
    }

    pub fn info(&self) -> &ConflictInfo {
        &self.info
    }

    /// Deliver the operator's decision. Returns `false` if a decision was
    /// already delivered.
    pub fn decide(&self, decision: ConflictDecision) -> bool {
        match self.tx.lock().take() {
            Some(tx) => tx.send(decision).is_ok(),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn o_name_walks_the_ring() {
        let taken: HashSet<&str> =
            ["O3001.nc", "O3002.nc", "O3003.nc", "O3004.nc", "O3005.nc"]
                .into_iter()
                .collect();
        let got = next_free_name("O3001.nc", |n| taken.contains(n)).unwrap();
        assert_eq!(got, "O3006.nc");
    }

    #[test]
    fn o_name_wraps_past_9999() {
        let taken: HashSet<&str> = ["O9999.nc"].into_iter().collect();
        let got = next_free_name("O9999.nc", |n| taken.contains(n)).unwrap();
        assert_eq!(got, "O0001.nc");
    }

    #[test]
    fn free_desired_name_is_kept() {
        let got = next_free_name("O0100.nc", |_| false).unwrap();
        assert_eq!(got, "O0100.nc");
    }

    #[test]
    fn short_numeric_o_names_take_the_suffix_path() {
        // Only 4-digit O-names address controller slots; O123 is just a
        // file name and must not be renumbered.
        let taken: HashSet<&str> = ["O123.nc"].into_iter().collect();
        let got = next_free_name("O123.nc", |n| taken.contains(n)).unwrap();
        assert_eq!(got, "O123_1.nc");
    }

    #[test]
    fn non_o_name_gets_suffix() {
        let taken: HashSet<&str> = ["part.nc", "part_1.nc"].into_iter().collect();
        let got = next_free_name("part.nc", |n| taken.contains(n)).unwrap();
        assert_eq!(got, "part_2.nc");
    }

    #[test]
    fn extensionless_name_suffixes_cleanly() {
        let taken: HashSet<&str> = ["NOTES"].into_iter().collect();
        let got = next_free_name("NOTES", |n| taken.contains(n)).unwrap();
        assert_eq!(got, "NOTES_1");
    }

    #[test]
    fn full_ring_is_exhaustion() {
        let err = next_free_program_no(1, |_| true).unwrap_err();
        assert!(matches!(err, CoreError::NamingExhausted { .. }));

        let err = next_free_name("O0001.nc", |_| true).unwrap_err();
        assert!(matches!(err, CoreError::NamingExhausted { .. }));
    }

    #[test]
    fn generic_no_starts_past_max_and_fills_gaps_upward_only() {
        assert_eq!(next_generic_no(&[]).unwrap(), 1);
        assert_eq!(next_generic_no(&[3, 7]).unwrap(), 8);
        // Gaps below the max are never reused.
        assert_eq!(next_generic_no(&[1, 2, 9]).unwrap(), 10);
    }

    #[tokio::test]
    async fn conflict_decides_exactly_once() {
        let (pending, rx) = PendingConflict::new(ConflictInfo {
            name: "O3001.nc".into(),
            suggested: "O3002.nc".into(),
        });
        assert!(pending.decide(ConflictDecision::Overwrite));
        assert!(!pending.decide(ConflictDecision::Cancel));
        assert_eq!(rx.await.unwrap(), ConflictDecision::Overwrite);
    }

    #[tokio::test]
    async fn dropped_prompt_reads_as_cancel() {
        let (pending, rx) = PendingConflict::new(ConflictInfo {
            name: "a.nc".into(),
            suggested: "a_1.nc".into(),
        });
        drop(pending);
        assert!(rx.await.is_err());
    }
}
