//! Per-machine production queues.
//!
//! Each machine owns one ordered queue of jobs. Mutations run under a
//! per-machine async lock and always end with an authoritative refetch, so
//! two operators editing the same queue serialize instead of clobbering
//! each other, and every caller gets back the queue as actually stored.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{CoreError, CoreResult};
use crate::models::{QueueBatch, QueueItem, QueueStatus};

/// Authoritative storage for queue records.
///
/// The in-process board uses [`MemoryQueueBackend`]; a deployment with a
/// shared backend implements this against it.
#[async_trait]
pub trait QueueBackend: Send + Sync {
    async fn fetch(&self, machine_uid: &str) -> CoreResult<Vec<QueueItem>>;
    async fn store(&self, machine_uid: &str, items: &[QueueItem]) -> CoreResult<()>;
}

/// In-memory queue storage.
#[derive(Default)]
pub struct MemoryQueueBackend {
    queues: Mutex<HashMap<String, Vec<QueueItem>>>,
}

#[async_trait]
impl QueueBackend for MemoryQueueBackend {
    async fn fetch(&self, machine_uid: &str) -> CoreResult<Vec<QueueItem>> {
        Ok(self
            .queues
            .lock()
            .get(machine_uid)
            .cloned()
            .unwrap_or_default())
    }

    async fn store(&self, machine_uid: &str, items: &[QueueItem]) -> CoreResult<()> {
        self.queues
            .lock()
            .insert(machine_uid.to_string(), items.to_vec());
        Ok(())
    }
}

/// Fields a caller supplies when queueing a job; the manager assigns the id.
#[derive(Debug, Clone)]
pub struct QueueDraft {
    pub label: String,
    pub program_no: Option<u32>,
    pub bridge_path: Option<String>,
    pub source: crate::models::ProgramSource,
    pub diameter_group: String,
    /// Opaque work-order display strings, threaded through untouched.
    pub meta: serde_json::Value,
    pub quantity: u32,
}

/// Outcome of an add: either a fresh record or the existing duplicate.
#[derive(Debug, Clone)]
pub enum AddOutcome {
    Added(QueueItem),
    /// An active entry for the same program already exists; no new record
    /// was created.
    Duplicate(QueueItem),
}

impl AddOutcome {
    pub fn item(&self) -> &QueueItem {
        match self {
            AddOutcome::Added(i) | AddOutcome::Duplicate(i) => i,
        }
    }
}

/// Serialized mutation front for the per-machine queues.
pub struct QueueManager {
    backend: Arc<dyn QueueBackend>,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    next_id: AtomicU64,
}

impl QueueManager {
    pub fn new(backend: Arc<dyn QueueBackend>) -> Self {
        Self {
            backend,
            locks: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn lock_for(&self, machine_uid: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .lock()
            .entry(machine_uid.to_string())
            .or_default()
            .clone()
    }

    /// Current queue, unfiltered.
    pub async fn list(&self, machine_uid: &str) -> CoreResult<Vec<QueueItem>> {
        self.backend.fetch(machine_uid).await
    }

    /// Run one mutation under the machine's lock, then refetch.
    async fn mutate(
        &self,
        machine_uid: &str,
        apply: impl FnOnce(&mut Vec<QueueItem>) -> CoreResult<()>,
    ) -> CoreResult<Vec<QueueItem>> {
        let lock = self.lock_for(machine_uid);
        let _guard = lock.lock().await;
        let mut items = self.backend.fetch(machine_uid).await?;
        apply(&mut items)?;
        self.backend.store(machine_uid, &items).await?;
        self.backend.fetch(machine_uid).await
    }

    /// Queue a job, deduplicating against active entries.
    ///
    /// A second add of the same program from the same source does not grow
    /// the queue; the existing record comes back instead so the caller can
    /// bump its quantity if that was the intent.
    pub async fn add(&self, machine_uid: &str, draft: QueueDraft) -> CoreResult<AddOutcome> {
        let lock = self.lock_for(machine_uid);
        let _guard = lock.lock().await;
        let mut items = self.backend.fetch(machine_uid).await?;

        let candidate = QueueItem {
            id: format!("q-{}", self.next_id.fetch_add(1, Ordering::Relaxed)),
            machine_uid: machine_uid.to_string(),
            label: draft.label,
            program_no: draft.program_no,
            bridge_path: draft.bridge_path,
            source: draft.source,
            diameter_group: draft.diameter_group,
            meta: draft.meta,
            quantity: draft.quantity.max(1),
            status: QueueStatus::Waiting,
        };

        if let Some(existing) = items
            .iter()
            .find(|i| i.status.is_active() && i.is_duplicate_of(&candidate))
        {
            debug!(machine = machine_uid, id = %existing.id, "duplicate add coalesced");
            return Ok(AddOutcome::Duplicate(existing.clone()));
        }

        items.push(candidate.clone());
        self.backend.store(machine_uid, &items).await?;
        info!(machine = machine_uid, id = %candidate.id, label = %candidate.label, "job queued");
        Ok(AddOutcome::Added(candidate))
    }

    /// Set remaining quantity, clamped to at least 1.
    pub async fn set_quantity(
        &self,
        machine_uid: &str,
        id: &str,
        quantity: u32,
    ) -> CoreResult<Vec<QueueItem>> {
        let id = id.to_string();
        self.mutate(machine_uid, move |items| {
            let item = find_mut(items, &id)?;
            item.quantity = quantity.max(1);
            Ok(())
        })
        .await
    }

    /// Pause or resume a waiting entry. Machining and finished entries are
    /// left untouched.
    pub async fn set_paused(
        &self,
        machine_uid: &str,
        id: &str,
        paused: bool,
    ) -> CoreResult<Vec<QueueItem>> {
        let id = id.to_string();
        self.mutate(machine_uid, move |items| {
            let item = find_mut(items, &id)?;
            match (item.status, paused) {
                (QueueStatus::Waiting, true) => item.status = QueueStatus::Paused,
                (QueueStatus::Paused, false) => item.status = QueueStatus::Waiting,
                _ => {}
            }
            Ok(())
        })
        .await
    }

    /// Remove an entry. A job currently on the spindle cannot be removed;
    /// stop it first.
    pub async fn remove(&self, machine_uid: &str, id: &str) -> CoreResult<Vec<QueueItem>> {
        let id = id.to_string();
        self.mutate(machine_uid, move |items| {
            if let Some(item) = items.iter().find(|i| i.id == id) {
                if item.status == QueueStatus::Machining {
                    return Err(CoreError::invalid_state(
                        "cannot remove a job that is machining",
                    ));
                }
            }
            items.retain(|i| i.id != id);
            Ok(())
        })
        .await
    }

    /// Reorder by a full desired id list.
    ///
    /// Unknown ids are ignored. Known entries missing from the list keep
    /// their prior relative order and follow the listed ones.
    pub async fn reorder(
        &self,
        machine_uid: &str,
        order: &[String],
    ) -> CoreResult<Vec<QueueItem>> {
        let order = order.to_vec();
        self.mutate(machine_uid, move |items| {
            apply_order(items, &order);
            Ok(())
        })
        .await
    }

    /// Drop every entry that is not currently machining.
    pub async fn clear(&self, machine_uid: &str) -> CoreResult<Vec<QueueItem>> {
        self.mutate(machine_uid, |items| {
            items.retain(|i| i.status == QueueStatus::Machining);
            Ok(())
        })
        .await
    }

    /// Apply one batch of mutations atomically.
    ///
    /// Order within the batch: clear, deletions, quantities, pause flags,
    /// then ordering. Ids unknown at the time a step runs are skipped.
    pub async fn apply_batch(
        &self,
        machine_uid: &str,
        batch: QueueBatch,
    ) -> CoreResult<Vec<QueueItem>> {
        self.mutate(machine_uid, move |items| {
            if batch.clear {
                items.retain(|i| i.status == QueueStatus::Machining);
            }
            for id in &batch.delete {
                if items
                    .iter()
                    .any(|i| i.id == *id && i.status == QueueStatus::Machining)
                {
                    warn!(machine = machine_uid, id = %id, "batch delete skipped machining job");
                    continue;
                }
                items.retain(|i| i.id != *id);
            }
            for (id, qty) in &batch.quantities {
                if let Some(item) = items.iter_mut().find(|i| i.id == *id) {
                    item.quantity = (*qty).max(1);
                }
            }
            for (id, paused) in &batch.paused {
                if let Some(item) = items.iter_mut().find(|i| i.id == *id) {
                    match (item.status, *paused) {
                        (QueueStatus::Waiting, true) => item.status = QueueStatus::Paused,
                        (QueueStatus::Paused, false) => item.status = QueueStatus::Waiting,
                        _ => {}
                    }
                }
            }
            if let Some(order) = &batch.order {
                apply_order(items, order);
            }
            Ok(())
        })
        .await
    }

    /// Mark a job as on the spindle.
    ///
    /// A machine runs one job at a time; any other entry still marked
    /// machining (its completion never arrived) is demoted back to
    /// waiting.
    pub async fn mark_machining(&self, machine_uid: &str, id: &str) -> CoreResult<Vec<QueueItem>> {
        let id = id.to_string();
        self.mutate(machine_uid, move |items| {
            for item in items.iter_mut() {
                if item.id != id && item.status == QueueStatus::Machining {
                    warn!(machine = machine_uid, id = %item.id, "stale machining entry demoted to waiting");
                    item.status = QueueStatus::Waiting;
                }
            }
            find_mut(items, &id)?.status = QueueStatus::Machining;
            Ok(())
        })
        .await
    }

    /// Record one finished part. Quantity above 1 decrements and the job
    /// returns to waiting; the last part marks the job done.
    pub async fn complete_one(&self, machine_uid: &str, id: &str) -> CoreResult<Vec<QueueItem>> {
        let id = id.to_string();
        self.mutate(machine_uid, move |items| {
            let item = find_mut(items, &id)?;
            if item.quantity > 1 {
                item.quantity -= 1;
                item.status = QueueStatus::Waiting;
            } else {
                item.status = QueueStatus::Done;
            }
            Ok(())
        })
        .await
    }

    /// Cancel a job (operator stop).
    pub async fn cancel(&self, machine_uid: &str, id: &str) -> CoreResult<Vec<QueueItem>> {
        let id = id.to_string();
        self.mutate(machine_uid, move |items| {
            find_mut(items, &id)?.status = QueueStatus::Cancelled;
            Ok(())
        })
        .await
    }
}

fn find_mut<'a>(items: &'a mut [QueueItem], id: &str) -> CoreResult<&'a mut QueueItem> {
    items
        .iter_mut()
        .find(|i| i.id == id)
        .ok_or_else(|| CoreError::not_found(format!("queue item {id}")))
}

/// Reorder in place: listed known ids first, unlisted entries after them in
/// prior relative order.
fn apply_order(items: &mut Vec<QueueItem>, order: &[String]) {
    let mut reordered: Vec<QueueItem> = Vec::with_capacity(items.len());
    for id in order {
        if let Some(pos) = items.iter().position(|i| i.id == *id) {
            reordered.push(items.remove(pos));
        }
    }
    reordered.append(items);
    *items = reordered;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProgramSource;

    fn manager() -> QueueManager {
        QueueManager::new(Arc::new(MemoryQueueBackend::default()))
    }

    fn draft(label: &str, no: Option<u32>) -> QueueDraft {
        QueueDraft {
            label: label.into(),
            program_no: no,
            bridge_path: None,
            source: ProgramSource::Bridge,
            diameter_group: "10".into(),
            meta: serde_json::Value::Null,
            quantity: 1,
        }
    }

    async fn seed_three(m: &QueueManager) -> (String, String, String) {
        let a = m.add("m1", draft("A", Some(1))).await.unwrap().item().id.clone();
        let b = m.add("m1", draft("B", Some(2))).await.unwrap().item().id.clone();
        let c = m.add("m1", draft("C", Some(3))).await.unwrap().item().id.clone();
        (a, b, c)
    }

    #[tokio::test]
    async fn duplicate_add_returns_existing_record() {
        let m = manager();
        let first = m.add("m1", draft("A", Some(10))).await.unwrap();
        let second = m.add("m1", draft("other label", Some(10))).await.unwrap();
        assert!(matches!(second, AddOutcome::Duplicate(_)));
        assert_eq!(second.item().id, first.item().id);
        assert_eq!(m.list("m1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_check_ignores_finished_entries() {
        let m = manager();
        let a = m.add("m1", draft("A", Some(10))).await.unwrap().item().id.clone();
        m.mark_machining("m1", &a).await.unwrap();
        m.complete_one("m1", &a).await.unwrap();
        let again = m.add("m1", draft("A", Some(10))).await.unwrap();
        assert!(matches!(again, AddOutcome::Added(_)));
    }

    #[tokio::test]
    async fn reorder_preserves_quantities_and_appends_unlisted() {
        let m = manager();
        let (a, b, c) = seed_three(&m).await;
        m.set_quantity("m1", &b, 5).await.unwrap();

        let items = m.reorder("m1", &[c.clone(), a.clone()]).await.unwrap();
        let ids: Vec<&str> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec![c.as_str(), a.as_str(), b.as_str()]);
        assert_eq!(items.iter().find(|i| i.id == b).unwrap().quantity, 5);
    }

    #[tokio::test]
    async fn reorder_ignores_unknown_ids() {
        let m = manager();
        let (a, b, c) = seed_three(&m).await;
        let items = m
            .reorder("m1", &["ghost".into(), b.clone(), a.clone()])
            .await
            .unwrap();
        let ids: Vec<&str> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec![b.as_str(), a.as_str(), c.as_str()]);
    }

    #[tokio::test]
    async fn quantity_clamps_to_one() {
        let m = manager();
        let (a, _, _) = seed_three(&m).await;
        let items = m.set_quantity("m1", &a, 0).await.unwrap();
        assert_eq!(items.iter().find(|i| i.id == a).unwrap().quantity, 1);
    }

    #[tokio::test]
    async fn machining_job_cannot_be_removed() {
        let m = manager();
        let (a, _, _) = seed_three(&m).await;
        m.mark_machining("m1", &a).await.unwrap();
        let err = m.remove("m1", &a).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidState(_)));
        assert_eq!(m.list("m1").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn batch_applies_delete_qty_pause_order() {
        let m = manager();
        let (a, b, c) = seed_three(&m).await;
        let batch = QueueBatch {
            delete: vec![a.clone()],
            quantities: vec![(b.clone(), 4)],
            paused: vec![(c.clone(), true)],
            order: Some(vec![c.clone(), b.clone()]),
            clear: false,
        };
        let items = m.apply_batch("m1", batch).await.unwrap();
        let ids: Vec<&str> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec![c.as_str(), b.as_str()]);
        assert_eq!(items[0].status, QueueStatus::Paused);
        assert_eq!(items[1].quantity, 4);
    }

    #[tokio::test]
    async fn at_most_one_job_is_machining_per_machine() {
        let m = manager();
        let (a, b, _) = seed_three(&m).await;
        m.mark_machining("m1", &a).await.unwrap();
        let items = m.mark_machining("m1", &b).await.unwrap();
        assert_eq!(
            items.iter().find(|i| i.id == a).unwrap().status,
            QueueStatus::Waiting
        );
        assert_eq!(
            items.iter().find(|i| i.id == b).unwrap().status,
            QueueStatus::Machining
        );
        assert_eq!(
            items
                .iter()
                .filter(|i| i.status == QueueStatus::Machining)
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn clear_spares_the_machining_job() {
        let m = manager();
        let (a, _, _) = seed_three(&m).await;
        m.mark_machining("m1", &a).await.unwrap();
        let items = m.clear("m1").await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, a);
    }

    #[tokio::test]
    async fn complete_one_decrements_then_finishes() {
        let m = manager();
        let a = m
            .add(
                "m1",
                QueueDraft {
                    quantity: 2,
                    ..draft("A", Some(1))
                },
            )
            .await
            .unwrap()
            .item()
            .id
            .clone();
        m.mark_machining("m1", &a).await.unwrap();
        let items = m.complete_one("m1", &a).await.unwrap();
        let item = items.iter().find(|i| i.id == a).unwrap();
        assert_eq!(item.quantity, 1);
        assert_eq!(item.status, QueueStatus::Waiting);

        m.mark_machining("m1", &a).await.unwrap();
        let items = m.complete_one("m1", &a).await.unwrap();
        assert_eq!(items.iter().find(|i| i.id == a).unwrap().status, QueueStatus::Done);
    }

    #[tokio::test]
    async fn queues_are_isolated_per_machine() {
        let m = manager();
        m.add("m1", draft("A", Some(1))).await.unwrap();
        m.add("m2", draft("B", Some(1))).await.unwrap();
        assert_eq!(m.list("m1").await.unwrap().len(), 1);
        assert_eq!(m.list("m2").await.unwrap().len(), 1);
    }
}
