//! Live machining sessions driven by shop-floor push events.
//!
//! One session per machine. Events arrive over an external transport in
//! per-machine order but may be duplicated or (when timestamped) slightly
//! reordered; completion handling is idempotent and ticks are
//! last-write-wins. Completion snapshots outlive the session
//! so the board still shows the previous run after a reset.

use chrono::Utc;
use futures_util::{Stream, StreamExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::capability::DeviceClient;
use crate::error::{CoreError, CoreResult};
use crate::models::{CompletionRecord, MachiningEvent, MachiningSession, QueueStatus};
use crate::queue::QueueManager;

/// Panel line driven for a remote cycle start.
const SIGNAL_CYCLE_START: &str = "CycleStart";
/// Panel line driven to halt the running program.
const SIGNAL_CYCLE_STOP: &str = "CycleStop";

/// Tracks what each machine is machining right now, and what it finished
/// last.
pub struct SessionTracker {
    queue: Arc<QueueManager>,
    device: DeviceClient,
    sessions: Mutex<HashMap<String, MachiningSession>>,
    last_completed: Mutex<HashMap<String, CompletionRecord>>,
}

impl SessionTracker {
    pub fn new(queue: Arc<QueueManager>, device: DeviceClient) -> Self {
        Self {
            queue,
            device,
            sessions: Mutex::new(HashMap::new()),
            last_completed: Mutex::new(HashMap::new()),
        }
    }

    /// Current session snapshot for a machine.
    pub fn session(&self, machine_uid: &str) -> Option<MachiningSession> {
        self.sessions.lock().get(machine_uid).cloned()
    }

    /// Last completion snapshot for a machine.
    pub fn last_completed(&self, machine_uid: &str) -> Option<CompletionRecord> {
        self.last_completed.lock().get(machine_uid).cloned()
    }

    /// Pre-load completion snapshots, e.g. from a backend after restart.
    /// Existing entries for the same machines are replaced.
    pub fn seed_last_completed(&self, records: Vec<CompletionRecord>) {
        let mut map = self.last_completed.lock();
        for record in records {
            map.insert(record.machine_uid.clone(), record);
        }
    }

    /// Drop a machine's live session. The last-completed snapshot stays.
    pub fn reset(&self, machine_uid: &str) {
        self.sessions.lock().remove(machine_uid);
    }

    /// Apply one push event.
    ///
    /// Events for machines without a live session (other than `Started`)
    /// are stale leftovers from before a reset and are dropped silently.
    pub async fn apply(&self, event: MachiningEvent) -> CoreResult<()> {
        match event {
            MachiningEvent::Started {
                machine_uid,
                queue_id,
                program_no,
                label,
                at,
            } => {
                info!(machine = %machine_uid, ?queue_id, "machining started");
                // Resolve the label now; completion must not go back to
                // the queue for it.
                let label = match (label, &queue_id) {
                    (Some(label), _) => Some(label),
                    (None, Some(id)) => match self.queue.list(&machine_uid).await {
                        Ok(items) => items.into_iter().find(|i| i.id == *id).map(|i| i.label),
                        Err(_) => None,
                    },
                    (None, None) => None,
                };
                self.sessions.lock().insert(
                    machine_uid.clone(),
                    MachiningSession {
                        running: true,
                        queue_id: queue_id.clone(),
                        program_no,
                        label,
                        elapsed_seconds: 0,
                        last_event_at: at,
                    },
                );
                if let Some(id) = queue_id {
                    if let Err(e) = self.queue.mark_machining(&machine_uid, &id).await {
                        warn!(machine = %machine_uid, id = %id, error = %e, "queue record not marked machining");
                    }
                }
                Ok(())
            }
            MachiningEvent::Tick {
                machine_uid,
                elapsed_seconds,
                at,
            } => {
                let mut sessions = self.sessions.lock();
                let Some(session) = sessions.get_mut(&machine_uid) else {
                    debug!(machine = %machine_uid, "tick for untracked machine dropped");
                    return Ok(());
                };
                if !session.running {
                    return Ok(());
                }
                if let (Some(at), Some(base)) = (at, session.last_event_at) {
                    if at < base {
                        debug!(machine = %machine_uid, "out-of-order tick dropped");
                        return Ok(());
                    }
                }
                session.elapsed_seconds = elapsed_seconds;
                if at.is_some() {
                    session.last_event_at = at;
                }
                Ok(())
            }
            MachiningEvent::Completed {
                machine_uid,
                queue_id,
                duration_seconds,
                elapsed_seconds,
                at,
            } => {
                let (session_elapsed, queue_id, label) = {
                    let mut sessions = self.sessions.lock();
                    let Some(session) = sessions.get_mut(&machine_uid) else {
                        debug!(machine = %machine_uid, "completion for untracked machine dropped");
                        return Ok(());
                    };
                    if !session.running {
                        // Duplicate completion; already handled.
                        return Ok(());
                    }
                    session.running = false;
                    (
                        session.elapsed_seconds,
                        queue_id.or_else(|| session.queue_id.clone()),
                        session.label.clone(),
                    )
                };

                // Duration preference: the sender's computed total, then
                // the figure on the completion event, then the last tick.
                // An untimed run records zero; it never borrows the
                // previous run's duration.
                let duration = duration_seconds.or(elapsed_seconds).unwrap_or(session_elapsed);

                info!(machine = %machine_uid, ?queue_id, duration, "machining completed");
                self.last_completed.lock().insert(
                    machine_uid.clone(),
                    CompletionRecord {
                        machine_uid: machine_uid.clone(),
                        queue_id: queue_id.clone(),
                        label,
                        duration_seconds: duration,
                        completed_at: at.unwrap_or_else(Utc::now),
                    },
                );

                if let Some(id) = queue_id {
                    if let Err(e) = self.queue.complete_one(&machine_uid, &id).await {
                        warn!(machine = %machine_uid, id = %id, error = %e, "queue completion not recorded");
                    }
                }
                Ok(())
            }
        }
    }

    /// First waiting job in the queue, for the board's "next up" slot.
    pub async fn next_up(&self, machine_uid: &str) -> CoreResult<Option<crate::models::QueueItem>> {
        let items = self.queue.list(machine_uid).await?;
        Ok(items
            .into_iter()
            .find(|i| i.status == QueueStatus::Waiting))
    }

    /// Start a queued job: activate its program on the controller, drive
    /// cycle start, and mark the queue record.
    ///
    /// The session is not flipped to running here; the device confirms
    /// through a `Started` event on the push stream, so a start the
    /// controller rejects never shows as running.
    pub async fn start_job(&self, machine_uid: &str, queue_id: &str) -> CoreResult<()> {
        if self.session(machine_uid).is_some_and(|s| s.running) {
            return Err(CoreError::invalid_state("machine is already machining"));
        }
        let items = self.queue.list(machine_uid).await?;
        let item = items
            .iter()
            .find(|i| i.id == queue_id)
            .ok_or_else(|| CoreError::not_found(format!("queue item {queue_id}")))?;
        if items.iter().any(|i| i.status == QueueStatus::Machining) {
            return Err(CoreError::invalid_state("a job is already machining"));
        }
        if let Some(no) = item.program_no {
            self.device.activate_program(machine_uid, no).await?;
        }
        self.device
            .update_op_status(machine_uid, SIGNAL_CYCLE_START, true)
            .await?;
        self.queue.mark_machining(machine_uid, queue_id).await?;
        info!(machine = machine_uid, id = queue_id, "start issued, awaiting device confirmation");
        Ok(())
    }

    /// Stop the running job: halt the spindle and cancel the queue record
    /// so the controller cannot silently resume it.
    pub async fn stop(&self, machine_uid: &str) -> CoreResult<()> {
        let queue_id = {
            let sessions = self.sessions.lock();
            match sessions.get(machine_uid) {
                Some(session) if session.running => session.queue_id.clone(),
                _ => {
                    return Err(CoreError::invalid_state("machine is not machining"));
                }
            }
        };
        self.device
            .update_op_status(machine_uid, SIGNAL_CYCLE_STOP, true)
            .await?;
        if let Some(session) = self.sessions.lock().get_mut(machine_uid) {
            session.running = false;
        }
        if let Some(id) = queue_id {
            self.queue.cancel(machine_uid, &id).await?;
        }
        info!(machine = machine_uid, "machining stopped by operator");
        Ok(())
    }
}

/// Drain a stream of push events into the tracker.
///
/// The transport delivers events for all machines over one connection in
/// per-machine order; applying them from a single consumer preserves that
/// order. A failed application is logged and does not stop the loop.
pub async fn run_event_loop<S>(tracker: Arc<SessionTracker>, mut events: S)
where
    S: Stream<Item = MachiningEvent> + Unpin,
{
    while let Some(event) = events.next().await {
        let machine = event.machine_uid().to_string();
        if let Err(e) = tracker.apply(event).await {
            warn!(machine = %machine, error = %e, "event application failed");
        }
    }
}
