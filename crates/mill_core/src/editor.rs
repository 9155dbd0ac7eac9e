//! Program editor sessions.
//!
//! Opening a program always fetches fresh text through the tiered store;
//! nothing from a previously opened program leaks into the new session. A
//! session can sit in a diff view whose edits land in a side buffer and
//! are flushed into the live content when the view toggles back. Saves
//! come in three shapes: in place, as a new machine-resident program, and
//! as a copy on the bridge share.

use std::sync::Arc;
use tracing::{debug, info};

use crate::capability::{WriteAuthorizer, WriteContext};
use crate::error::{CoreError, CoreResult};
use crate::models::{MachineStatus, ProgramRef};
use crate::naming::{
    next_free_name, next_free_program_no, next_generic_no, ConflictDecision, ConflictInfo,
    ConflictPolicy,
};
use crate::store::ProgramStore;

/// Lifecycle of an editor session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditorState {
    Editing,
    Saving,
    Saved,
    Failed(String),
    Closed,
}

/// How a save attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    /// The operator declined the write gate or cancelled a conflict
    /// prompt. Not an error; the session keeps its edits.
    Cancelled,
}

/// One open program in the editor.
#[derive(Debug, Clone)]
pub struct EditorSession {
    pub machine_uid: String,
    pub program: ProgramRef,
    pub state: EditorState,
    /// Live text the plain view edits.
    content: String,
    /// Edits made while the diff view is active.
    diff_buffer: Option<String>,
    /// Set when the machine is running this program number.
    pub read_only: bool,
    pub dirty: bool,
}

impl EditorSession {
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Replace the live text from the plain editor view.
    pub fn set_content(&mut self, text: String) -> CoreResult<()> {
        if self.read_only {
            return Err(CoreError::invalid_state("program is open read-only"));
        }
        if self.state == EditorState::Closed {
            return Err(CoreError::invalid_state("editor session is closed"));
        }
        self.dirty = self.dirty || text != self.content;
        self.content = text;
        self.state = EditorState::Editing;
        Ok(())
    }

    /// Record an edit made in the diff view. The live text is untouched
    /// until [`flush_diff`](Self::flush_diff) runs.
    pub fn buffer_diff_edit(&mut self, text: String) -> CoreResult<()> {
        if self.read_only {
            return Err(CoreError::invalid_state("program is open read-only"));
        }
        self.diff_buffer = Some(text);
        Ok(())
    }

    /// Fold pending diff-view edits into the live text. Called when the
    /// view toggles and before any save.
    pub fn flush_diff(&mut self) {
        if let Some(text) = self.diff_buffer.take() {
            if text != self.content {
                self.dirty = true;
                self.content = text;
            }
        }
    }

    pub fn close(&mut self) {
        self.state = EditorState::Closed;
        self.diff_buffer = None;
    }
}

/// Opens sessions and performs the save variants.
pub struct ProgramEditor {
    store: Arc<ProgramStore>,
    authorizer: Arc<dyn WriteAuthorizer>,
}

impl ProgramEditor {
    pub fn new(store: Arc<ProgramStore>, authorizer: Arc<dyn WriteAuthorizer>) -> Self {
        Self { store, authorizer }
    }

    /// Open a program for editing, fetching fresh text through the store.
    ///
    /// When the machine's reported status says it is running this very
    /// program number, the session opens read-only.
    pub async fn open(
        &self,
        machine_uid: &str,
        program: ProgramRef,
        machine_status: &MachineStatus,
    ) -> CoreResult<EditorSession> {
        let content = self.store.load(machine_uid, &program).await?;
        let read_only = program
            .program_no
            .is_some_and(|no| machine_status.is_running_program(no));
        if read_only {
            debug!(machine = machine_uid, program = %program.name, "opened read-only while running");
        }
        Ok(EditorSession {
            machine_uid: machine_uid.to_string(),
            program,
            state: EditorState::Editing,
            content,
            diff_buffer: None,
            read_only,
            dirty: false,
        })
    }

    /// Save in place.
    ///
    /// Managed programs persist to their bridge copy only. Unmanaged
    /// machine-resident programs pass through the write gate first; a
    /// declined gate aborts the save silently and the session keeps
    /// editing.
    pub async fn save(&self, session: &mut EditorSession) -> CoreResult<SaveOutcome> {
        session.flush_diff();
        if session.read_only {
            return Err(CoreError::invalid_state("program is open read-only"));
        }
        session.state = EditorState::Saving;

        let result = if session.program.is_managed() {
            self.store
                .save_managed(&session.program, &session.content)
                .await
                .map(|_| SaveOutcome::Saved)
        } else {
            let no = session.program.program_no.unwrap_or(0);
            if !self.gate_allows(session, no, &session.program.name).await {
                session.state = EditorState::Editing;
                return Ok(SaveOutcome::Cancelled);
            }
            self.store
                .save_machine_resident(
                    &session.machine_uid,
                    &session.program,
                    &session.content,
                    false,
                )
                .await
                .map(|_| SaveOutcome::Saved)
        };

        match result {
            Ok(outcome) => {
                session.state = EditorState::Saved;
                session.dirty = false;
                Ok(outcome)
            }
            Err(e) => {
                session.state = EditorState::Failed(e.to_string());
                Err(e)
            }
        }
    }

    /// Run the machine-write gate. A declined gate is logged here; the
    /// caller aborts silently.
    async fn gate_allows(&self, session: &EditorSession, program_no: u32, name: &str) -> bool {
        let ctx = WriteContext {
            machine_uid: session.machine_uid.clone(),
            program_no,
            program_name: name.to_string(),
        };
        if self.authorizer.authorize(&ctx).await {
            true
        } else {
            info!(machine = %session.machine_uid, program = %name, "write gate declined, save aborted");
            false
        }
    }

    /// Save as a machine-resident program under a new name and/or number.
    ///
    /// Only unmanaged programs can be re-slotted this way; a managed
    /// program's source of truth stays on the bridge. At least one of the
    /// target name and number must be given, and with no explicit number
    /// the program keeps its current slot and only the display name
    /// changes. The write passes the gate like an in-place save. A taken
    /// explicit number runs the conflict policy: overwrite the occupant,
    /// take the next free number on the ring, or cancel (which leaves the
    /// session editing). The session is rebound to what was written.
    pub async fn save_as_machine_program(
        &self,
        session: &mut EditorSession,
        target_name: Option<&str>,
        desired_no: Option<u32>,
        occupied: &[u32],
        policy: &dyn ConflictPolicy,
    ) -> CoreResult<SaveOutcome> {
        session.flush_diff();
        if session.program.is_managed() {
            return Err(CoreError::invalid_state(
                "managed programs save to the bridge, not onto the machine",
            ));
        }
        let target_name = target_name.filter(|n| !n.is_empty());
        if target_name.is_none() && desired_no.is_none() {
            return Err(CoreError::invalid_state(
                "save-as needs a target name or program number",
            ));
        }
        let base_no = desired_no.or(session.program.program_no).ok_or_else(|| {
            CoreError::invalid_state("machine-resident save needs a program number")
        })?;
        let gate_name = target_name.unwrap_or(&session.program.name);
        if !self.gate_allows(session, base_no, gate_name).await {
            session.state = EditorState::Editing;
            return Ok(SaveOutcome::Cancelled);
        }
        session.state = EditorState::Saving;

        let taken = desired_no.is_some() && occupied.contains(&base_no);
        let (target_no, is_new) = if taken {
            let free = next_free_program_no(base_no, |n| occupied.contains(&n))?;
            let decision = policy
                .resolve(&ConflictInfo {
                    name: format!("O{base_no:04}"),
                    suggested: format!("O{free:04}"),
                })
                .await;
            match decision {
                ConflictDecision::Overwrite => (base_no, false),
                ConflictDecision::AutoRename => (free, true),
                ConflictDecision::Cancel => {
                    session.state = EditorState::Editing;
                    return Ok(SaveOutcome::Cancelled);
                }
            }
        } else {
            (base_no, !occupied.contains(&base_no))
        };

        let mut target = session.program.clone();
        target.program_no = Some(target_no);
        target.name = match target_name {
            Some(name) => name.to_string(),
            None => format!("O{target_no:04}"),
        };
        match self
            .store
            .save_machine_resident(&session.machine_uid, &target, &session.content, is_new)
            .await
        {
            Ok(()) => {
                session.program = target;
                session.state = EditorState::Saved;
                session.dirty = false;
                Ok(SaveOutcome::Saved)
            }
            Err(e) => {
                session.state = EditorState::Failed(e.to_string());
                Err(e)
            }
        }
    }

    /// Save under the next free number above both the program's current
    /// number and everything in `occupied`.
    ///
    /// Uses the relaxed upward scan rather than the 4-digit ring, so the
    /// result is free by construction and no conflict prompt is needed.
    /// Unmanaged machine-resident writes only; the gate applies as usual.
    pub async fn save_as_incremented_number(
        &self,
        session: &mut EditorSession,
        occupied: &[u32],
    ) -> CoreResult<SaveOutcome> {
        session.flush_diff();
        if session.program.is_managed() {
            return Err(CoreError::invalid_state(
                "managed programs save to the bridge, not onto the machine",
            ));
        }
        let mut used = occupied.to_vec();
        if let Some(current) = session.program.program_no {
            used.push(current);
        }
        let target_no = next_generic_no(&used)?;
        if !self.gate_allows(session, target_no, &session.program.name).await {
            session.state = EditorState::Editing;
            return Ok(SaveOutcome::Cancelled);
        }
        session.state = EditorState::Saving;

        let mut target = session.program.clone();
        target.program_no = Some(target_no);
        target.name = format!("O{target_no:04}");
        match self
            .store
            .save_machine_resident(&session.machine_uid, &target, &session.content, true)
            .await
        {
            Ok(()) => {
                session.program = target;
                session.state = EditorState::Saved;
                session.dirty = false;
                Ok(SaveOutcome::Saved)
            }
            Err(e) => {
                session.state = EditorState::Failed(e.to_string());
                Err(e)
            }
        }
    }

    /// Save a copy onto the bridge share as `dir/name`.
    ///
    /// A name collision runs through the conflict policy with the next
    /// free variant as the suggestion; cancel leaves the session editing
    /// and writes nothing.
    pub async fn save_to_bridge(
        &self,
        session: &mut EditorSession,
        bridge: &dyn crate::capability::BridgeStore,
        dir: &str,
        name: &str,
        policy: &dyn ConflictPolicy,
    ) -> CoreResult<SaveOutcome> {
        session.flush_diff();
        session.state = EditorState::Saving;

        let listing = bridge.list_dir(dir).await?;
        let lowered: Vec<String> = listing.iter().map(|e| e.name.to_lowercase()).collect();
        let exists = |n: &str| lowered.contains(&n.to_lowercase());

        let final_name = if exists(name) {
            let suggested = next_free_name(name, exists)?;
            let decision = policy
                .resolve(&ConflictInfo {
                    name: name.to_string(),
                    suggested: suggested.clone(),
                })
                .await;
            match decision {
                ConflictDecision::Overwrite => name.to_string(),
                ConflictDecision::AutoRename => suggested,
                ConflictDecision::Cancel => {
                    session.state = EditorState::Editing;
                    return Ok(SaveOutcome::Cancelled);
                }
            }
        } else {
            name.to_string()
        };

        let path = crate::capability::bridge::join_path(dir, &final_name);
        match bridge.write_file(&path, &session.content).await {
            Ok(()) => {
                info!(%path, "program copied to bridge");
                session.state = EditorState::Saved;
                Ok(SaveOutcome::Saved)
            }
            Err(e) => {
                session.state = EditorState::Failed(e.to_string());
                Err(e)
            }
        }
    }
}
