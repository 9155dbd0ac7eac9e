//! Machine registry and rate-limited status refresh.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::capability::DeviceClient;
use crate::error::{CoreError, CoreResult};
use crate::models::{Machine, MachineCapabilities, MachineStatus};

/// Registered machines plus a cached view of their reported status.
///
/// Status refreshes are coalesced: a refresh inside the cooldown window
/// returns the cached snapshot instead of hitting the controller again, so
/// an operator hammering the refresh button cannot flood the device link.
pub struct MachineRegistry {
    device: DeviceClient,
    cooldown: Duration,
    machines: Mutex<Vec<Machine>>,
    statuses: Mutex<HashMap<String, (MachineStatus, Instant)>>,
}

impl MachineRegistry {
    pub fn new(device: DeviceClient, cooldown: Duration) -> Self {
        Self {
            device,
            cooldown,
            machines: Mutex::new(Vec::new()),
            statuses: Mutex::new(HashMap::new()),
        }
    }

    pub fn list(&self) -> Vec<Machine> {
        self.machines.lock().clone()
    }

    pub fn get(&self, uid: &str) -> Option<Machine> {
        self.machines.lock().iter().find(|m| m.uid == uid).cloned()
    }

    /// Register a machine. Uid and display name must both be unique; the
    /// error says which one collided.
    pub fn register(&self, machine: Machine) -> CoreResult<()> {
        let mut machines = self.machines.lock();
        if machines.iter().any(|m| m.uid == machine.uid) {
            return Err(CoreError::invalid_state(format!(
                "machine uid '{}' is already registered",
                machine.uid
            )));
        }
        if machines.iter().any(|m| m.name == machine.name) {
            return Err(CoreError::invalid_state(format!(
                "machine name '{}' is already in use",
                machine.name
            )));
        }
        info!(uid = %machine.uid, name = %machine.name, "machine registered");
        machines.push(machine);
        Ok(())
    }

    /// Replace a machine's descriptor. The new name must not collide with
    /// another machine.
    pub fn update(&self, machine: Machine) -> CoreResult<()> {
        let mut machines = self.machines.lock();
        if machines
            .iter()
            .any(|m| m.uid != machine.uid && m.name == machine.name)
        {
            return Err(CoreError::invalid_state(format!(
                "machine name '{}' is already in use",
                machine.name
            )));
        }
        let slot = machines
            .iter_mut()
            .find(|m| m.uid == machine.uid)
            .ok_or_else(|| CoreError::not_found(format!("machine {}", machine.uid)))?;
        *slot = machine;
        Ok(())
    }

    pub fn remove(&self, uid: &str) -> CoreResult<()> {
        let mut machines = self.machines.lock();
        let before = machines.len();
        machines.retain(|m| m.uid != uid);
        if machines.len() == before {
            return Err(CoreError::not_found(format!("machine {uid}")));
        }
        self.statuses.lock().remove(uid);
        Ok(())
    }

    pub fn set_capabilities(&self, uid: &str, caps: MachineCapabilities) -> CoreResult<()> {
        let mut machines = self.machines.lock();
        let machine = machines
            .iter_mut()
            .find(|m| m.uid == uid)
            .ok_or_else(|| CoreError::not_found(format!("machine {uid}")))?;
        machine.capabilities = caps;
        Ok(())
    }

    /// Flip auto-machining for every machine at once.
    ///
    /// Flags are applied optimistically, then `persist` runs with the
    /// updated descriptors; if it fails the previous flags are restored
    /// and the error propagates.
    pub async fn set_auto_machining_for_all<F, Fut>(
        &self,
        enabled: bool,
        persist: F,
    ) -> CoreResult<()>
    where
        F: FnOnce(Vec<Machine>) -> Fut,
        Fut: Future<Output = CoreResult<()>>,
    {
        let previous: Vec<(String, bool)> = {
            let mut machines = self.machines.lock();
            let prev = machines
                .iter()
                .map(|m| (m.uid.clone(), m.capabilities.allow_auto_machining))
                .collect();
            for m in machines.iter_mut() {
                m.capabilities.allow_auto_machining = enabled;
            }
            prev
        };

        let snapshot = self.list();
        if let Err(e) = persist(snapshot).await {
            let mut machines = self.machines.lock();
            for (uid, was) in previous {
                if let Some(m) = machines.iter_mut().find(|m| m.uid == uid) {
                    m.capabilities.allow_auto_machining = was;
                }
            }
            return Err(e);
        }
        info!(enabled, "auto-machining updated for all machines");
        Ok(())
    }

    /// Reported status, refreshed through the device unless a refresh ran
    /// within the cooldown window.
    pub async fn refresh_status(&self, uid: &str) -> CoreResult<MachineStatus> {
        if let Some((status, at)) = self.statuses.lock().get(uid) {
            if at.elapsed() < self.cooldown {
                debug!(machine = uid, "status refresh coalesced");
                return Ok(status.clone());
            }
        }
        let result = self.device.op_status(uid).await;
        self.set_reachable(uid, result.is_ok());
        let status = result?;
        self.statuses
            .lock()
            .insert(uid.to_string(), (status.clone(), Instant::now()));
        Ok(status)
    }

    fn set_reachable(&self, uid: &str, reachable: bool) {
        if let Some(m) = self.machines.lock().iter_mut().find(|m| m.uid == uid) {
            m.reachable = reachable;
        }
    }

    /// Cached status without touching the device.
    pub fn cached_status(&self, uid: &str) -> Option<MachineStatus> {
        self.statuses.lock().get(uid).map(|(s, _)| s.clone())
    }
}
