//! Tiered program storage.
//!
//! Program text can live in four places: the in-memory override cache
//! (most recent local save), object storage, the bridge file share, and
//! the machine controller itself. Loads walk the tiers in that order and
//! collect every tier's failure before giving up. Saves of managed
//! programs go to the bridge only; the bridge copy is the single source
//! of truth and machine-resident copies are derived artifacts.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::capability::{BridgeStore, DeviceClient, ObjectStore};
use crate::error::{CoreError, CoreResult};
use crate::models::program::apply_program_no_to_content;
use crate::models::ProgramRef;

/// Tiered loader/saver for NC program text.
pub struct ProgramStore {
    object: Arc<dyn ObjectStore>,
    bridge: Arc<dyn BridgeStore>,
    device: DeviceClient,
    fetch_timeout: Duration,
    /// Latest locally saved text, keyed by `ProgramRef::override_key`.
    overrides: Mutex<HashMap<String, String>>,
    /// Downloaded object-storage content, keyed by object key.
    object_cache: Mutex<HashMap<String, String>>,
}

impl ProgramStore {
    pub fn new(
        object: Arc<dyn ObjectStore>,
        bridge: Arc<dyn BridgeStore>,
        device: DeviceClient,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            object,
            bridge,
            device,
            fetch_timeout,
            overrides: Mutex::new(HashMap::new()),
            object_cache: Mutex::new(HashMap::new()),
        }
    }

    async fn with_deadline<T>(
        &self,
        operation: &str,
        fut: impl Future<Output = CoreResult<T>>,
    ) -> CoreResult<T> {
        match tokio::time::timeout(self.fetch_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(CoreError::timeout(operation)),
        }
    }

    /// Read the bridge copy, recovering it once if it has gone missing.
    ///
    /// A 404 on a managed program usually means the share was wiped or the
    /// file was consumed; the backend can re-materialize it from object
    /// storage, after which one retry is attempted at the recovered path.
    async fn read_bridge_with_recovery(&self, program: &ProgramRef) -> CoreResult<String> {
        let path = program
            .bridge_path
            .as_deref()
            .ok_or_else(|| CoreError::invalid_state("no bridge path"))?;
        match self
            .with_deadline("bridge read", self.bridge.read_file(path))
            .await
        {
            Ok(text) => Ok(text),
            Err(e) if e.is_not_found() => {
                let rid = program
                    .resolved_request_id()
                    .ok_or(e)?;
                info!(path, request_id = %rid, "bridge copy missing, requesting recovery");
                let recovered = self
                    .with_deadline("bridge recovery", self.object.ensure_bridge_copy(&rid))
                    .await?;
                self.with_deadline("bridge read", self.bridge.read_file(&recovered))
                    .await
            }
            Err(e) => Err(e),
        }
    }

    /// Resolve program text by walking the storage tiers.
    ///
    /// Order: override cache, object storage (with local cache), bridge
    /// (with one recovery retry), machine-resident. Each tier's failure is
    /// logged and collected; if none succeeds the summary of all failures
    /// comes back in one `ContentUnavailable` error.
    pub async fn load(&self, machine_uid: &str, program: &ProgramRef) -> CoreResult<String> {
        if let Some(key) = program.override_key() {
            if let Some(text) = self.overrides.lock().get(&key) {
                debug!(%key, "override cache hit");
                return Ok(text.clone());
            }
        }

        let mut failures: Vec<String> = Vec::new();

        if let Some(key) = &program.object_key {
            if let Some(text) = self.object_cache.lock().get(key) {
                debug!(%key, "object cache hit");
                return Ok(text.clone());
            }
            match self
                .with_deadline("object download", self.object.download(key))
                .await
            {
                Ok(text) => {
                    self.object_cache.lock().insert(key.clone(), text.clone());
                    return Ok(text);
                }
                Err(e) => {
                    warn!(%key, error = %e, "object tier failed");
                    failures.push(format!("object: {e}"));
                }
            }
        }

        if program.bridge_path.is_some() {
            match self.read_bridge_with_recovery(program).await {
                Ok(text) => return Ok(text),
                Err(e) => {
                    warn!(path = ?program.bridge_path, error = %e, "bridge tier failed");
                    failures.push(format!("bridge: {e}"));
                }
            }
        }

        if let Some(no) = program.program_no {
            match self
                .with_deadline(
                    "machine read",
                    self.device
                        .program_content(machine_uid, no, program.head_type.as_deref()),
                )
                .await
            {
                Ok(text) => return Ok(text),
                Err(e) => {
                    warn!(program_no = no, error = %e, "machine tier failed");
                    failures.push(format!("machine: {e}"));
                }
            }
        }

        if failures.is_empty() {
            failures.push("no identity to resolve".into());
        }
        Err(CoreError::content_unavailable(
            &program.name,
            failures.join("; "),
        ))
    }

    /// Persist edited text for a managed program.
    ///
    /// The write goes to the bridge copy only; machine-resident and object
    /// copies are never updated here. A missing bridge file triggers one
    /// recovery before the write. On success the override cache is updated
    /// so the next load observes the new text immediately.
    pub async fn save_managed(&self, program: &ProgramRef, content: &str) -> CoreResult<()> {
        if !program.is_managed() {
            return Err(CoreError::invalid_state(
                "save_managed called on an unmanaged program",
            ));
        }
        let path = match &program.bridge_path {
            Some(p) => p.clone(),
            None => {
                // Bridge copy not materialized yet; recover it from the
                // external reference before writing.
                let rid = program.resolved_request_id().ok_or_else(|| {
                    CoreError::invalid_state("managed program with no bridge path or request id")
                })?;
                self.with_deadline("bridge recovery", self.object.ensure_bridge_copy(&rid))
                    .await?
            }
        };
        self.with_deadline("bridge write", self.bridge.write_file(&path, content))
            .await?;
        info!(%path, "managed program saved to bridge");
        self.refresh_caches(program, content);
        Ok(())
    }

    /// Write a program straight onto the controller.
    ///
    /// The O-number header in the text is rewritten to the target number
    /// first, so the controller never registers text whose header
    /// disagrees with its slot.
    pub async fn save_machine_resident(
        &self,
        machine_uid: &str,
        program: &ProgramRef,
        content: &str,
        is_new: bool,
    ) -> CoreResult<()> {
        let no = program
            .program_no
            .ok_or_else(|| CoreError::invalid_state("machine-resident save needs a program number"))?;
        let normalized = apply_program_no_to_content(content, no);
        self.with_deadline(
            "machine write",
            self.device.update_program(
                machine_uid,
                no,
                program.head_type.as_deref(),
                &normalized,
                is_new,
            ),
        )
        .await?;
        info!(machine = machine_uid, program_no = no, is_new, "program written to machine");
        self.refresh_caches(program, &normalized);
        Ok(())
    }

    /// Record saved text in every cache the load path consults, so the
    /// next load observes it even after the override is dropped.
    fn refresh_caches(&self, program: &ProgramRef, content: &str) {
        self.remember_override(program, content);
        if let Some(key) = &program.object_key {
            self.object_cache.lock().insert(key.clone(), content.to_string());
        }
    }

    /// Record locally saved text in the override cache.
    pub fn remember_override(&self, program: &ProgramRef, content: &str) {
        if let Some(key) = program.override_key() {
            self.overrides.lock().insert(key, content.to_string());
        }
    }

    /// Drop the override entry for a program, if any.
    pub fn forget_override(&self, program: &ProgramRef) {
        if let Some(key) = program.override_key() {
            self.overrides.lock().remove(&key);
        }
    }
}
