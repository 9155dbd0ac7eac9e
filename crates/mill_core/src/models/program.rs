//! Program identity and the rules derived from it.
//!
//! A program can be addressed by an external job reference, a bridge file
//! path, an object-storage key, a machine-resident program number, or any
//! combination. The identity fields decide both the override-cache key and
//! whether the program is "managed" (its text lives in shared storage and
//! machine-resident copies are derived artifacts).

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Pattern an external job reference follows when embedded in a bridge file
/// name: an 8-digit date, a dash, then 6 to 10 alphanumerics.
static REQUEST_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d{8}-[A-Z0-9]{6,10})").expect("valid regex"));

/// Where a program reference originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgramSource {
    /// Opened from a production job (object storage backed).
    Job,
    /// Opened from the bridge file browser.
    Bridge,
    /// Opened from the machine's own program list.
    #[default]
    Machine,
}

impl ProgramSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgramSource::Job => "job",
            ProgramSource::Bridge => "bridge",
            ProgramSource::Machine => "machine",
        }
    }
}

/// Identity of an NC program as the editor and store see it.
///
/// All identity fields are optional; at least one must be present for the
/// reference to be resolvable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProgramRef {
    /// Production job id, when the program belongs to a tracked job.
    #[serde(default)]
    pub job_id: Option<String>,

    /// External job reference (e.g. `20250812-AB12CD`), explicit or derived.
    #[serde(default)]
    pub request_id: Option<String>,

    /// Path on the bridge file server.
    #[serde(default)]
    pub bridge_path: Option<String>,

    /// Key in object storage.
    #[serde(default)]
    pub object_key: Option<String>,

    /// Machine-resident program number (1..=9999 on the controller).
    #[serde(default)]
    pub program_no: Option<u32>,

    /// Spindle head the number addresses, for multi-head controllers.
    /// Legacy programs are addressed by the number + head pair.
    #[serde(default)]
    pub head_type: Option<String>,

    /// Display name (usually the file name).
    #[serde(default)]
    pub name: String,

    /// Where this reference was opened from.
    pub source: ProgramSource,
}

impl ProgramRef {
    /// Key for the override cache, chosen by identity priority.
    ///
    /// Job id wins over object key, which wins over request id, which wins
    /// over program number. A reference with no identity at all has no key
    /// and cannot participate in the override cache.
    pub fn override_key(&self) -> Option<String> {
        if let Some(job) = &self.job_id {
            return Some(format!("job:{job}"));
        }
        if let Some(key) = &self.object_key {
            return Some(format!("s3:{key}"));
        }
        if let Some(rid) = &self.request_id {
            return Some(format!("id:{rid}"));
        }
        self.program_no.map(|no| format!("no:{no}"))
    }

    /// A managed program has shared-storage identity; its source of truth is
    /// the bridge/object tier, never the machine.
    pub fn is_managed(&self) -> bool {
        self.resolved_request_id().is_some()
            || self.bridge_path.is_some()
            || self.object_key.is_some()
    }

    /// The explicit request id, or one derived from the bridge path.
    ///
    /// Derivation matches the external-reference pattern anywhere in the
    /// path and uppercases the hit, so `o0012_20250812-ab12cd.nc` yields
    /// `20250812-AB12CD`.
    pub fn resolved_request_id(&self) -> Option<String> {
        if let Some(rid) = &self.request_id {
            if !rid.is_empty() {
                return Some(rid.clone());
            }
        }
        let path = self.bridge_path.as_deref()?;
        REQUEST_ID_RE
            .captures(path)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_uppercase())
    }
}

/// One row of a machine's program directory listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceProgramEntry {
    /// Program number on the controller.
    pub program_no: u32,
    /// Comment line stored alongside the program, if any.
    #[serde(default)]
    pub comment: String,
    /// Size in bytes as reported by the controller.
    #[serde(default)]
    pub size_bytes: u64,
}

/// Rewrite the O-number header of NC text to match a target program number.
///
/// The first `O####`-style header (leading whitespace and `%` preamble lines
/// tolerated) is replaced; if none exists, a header line is prepended. The
/// rest of the text is untouched.
pub fn apply_program_no_to_content(content: &str, program_no: u32) -> String {
    static O_HEADER_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?m)^(\s*)O\d{1,5}").expect("valid regex"));
    let header = format!("O{program_no:04}");
    if O_HEADER_RE.is_match(content) {
        O_HEADER_RE
            .replace(content, format!("${{1}}{header}"))
            .into_owned()
    } else {
        format!("{header}\n{content}")
    }
}
