use chrono::Utc;
use shared::{DetectionRecord, UndoTicket};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use super::{HISTORY_LIMIT, HistoryStore, HistoryStoreError};

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("History item {0} not found")]
    NotFound(String),
    #[error("Another operation on {0} is still pending")]
    Busy(String),
    #[error("Undo window for {0} has closed")]
    UndoExpired(String),
    #[error(transparent)]
    Store(#[from] HistoryStoreError),
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Deleting,
    Undoable { expires_at: Instant },
    Restoring { expires_at: Instant },
}

/// A record taken out of the visible list, with the position it came from.
#[derive(Debug)]
struct Pending {
    record: DetectionRecord,
    index: usize,
    phase: Phase,
}

#[derive(Default)]
struct ViewState {
    items: Vec<DetectionRecord>,
    pending: HashMap<String, Pending>,
    loaded: bool,
    clearing: bool,
}

impl ViewState {
    fn position(&self, id: &str, hint: Option<usize>) -> Option<usize> {
        let matches = |i: usize| {
            self.items
                .get(i)
                .is_some_and(|r| r.id.as_deref() == Some(id))
        };
        match hint {
            Some(i) if matches(i) => Some(i),
            _ => self.items.iter().position(|r| r.id.as_deref() == Some(id)),
        }
    }

    /// Puts a record back among items ordered newest first. The remembered
    /// index only breaks ties between records with the same timestamp, since
    /// other items may have moved since it was taken.
    fn reinsert(&mut self, record: DetectionRecord, index: usize) {
        self.items.retain(|r| r.id != record.id);
        let created_at = record.created_at;
        let start = self
            .items
            .iter()
            .position(|r| r.created_at <= created_at)
            .unwrap_or(self.items.len());
        let end = self
            .items
            .iter()
            .position(|r| r.created_at < created_at)
            .unwrap_or(self.items.len());
        self.items.insert(index.clamp(start, end), record);
    }

    fn restore_pending(&mut self, id: &str) {
        if let Some(pending) = self.pending.remove(id) {
            self.reinsert(pending.record, pending.index);
        }
    }

    fn is_pending(&self, record: &DetectionRecord) -> bool {
        record
            .id
            .as_deref()
            .is_some_and(|id| self.pending.contains_key(id))
    }

    fn purge_expired(&mut self, now: Instant) {
        self.pending.retain(|_, p| match p.phase {
            Phase::Undoable { expires_at } => expires_at > now,
            Phase::Deleting | Phase::Restoring { .. } => true,
        });
    }

    fn has_in_flight(&self) -> bool {
        self.pending
            .values()
            .any(|p| !matches!(p.phase, Phase::Undoable { .. }))
    }
}

fn lock(state: &Mutex<ViewState>) -> MutexGuard<'_, ViewState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

/// Reverts an optimistic change unless disarmed. Runs on error paths and
/// when the awaiting caller is dropped mid-operation.
struct Rollback {
    state: Arc<Mutex<ViewState>>,
    revert: Option<Box<dyn FnOnce(&mut ViewState) + Send>>,
}

impl Rollback {
    fn new(
        state: Arc<Mutex<ViewState>>,
        revert: impl FnOnce(&mut ViewState) + Send + 'static,
    ) -> Self {
        Self {
            state,
            revert: Some(Box::new(revert)),
        }
    }

    fn disarm(mut self) {
        self.revert = None;
    }
}

impl Drop for Rollback {
    fn drop(&mut self) {
        if let Some(revert) = self.revert.take() {
            let mut state = lock(&self.state);
            revert(&mut *state);
        }
    }
}

/// One user's history list, kept in step with the remote store across
/// optimistic deletes, undo and clear.
pub struct HistoryReconciler {
    store: Arc<dyn HistoryStore>,
    user_id: String,
    undo_window: Duration,
    state: Arc<Mutex<ViewState>>,
}

impl HistoryReconciler {
    pub fn new(
        store: Arc<dyn HistoryStore>,
        user_id: impl Into<String>,
        undo_window: Duration,
    ) -> Self {
        Self {
            store,
            user_id: user_id.into(),
            undo_window,
            state: Arc::new(Mutex::new(ViewState::default())),
        }
    }

    #[cfg(test)]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// True when nothing is pending, so the reconciler can be rebuilt from
    /// the store without losing an undo.
    pub fn is_idle(&self) -> bool {
        let mut state = lock(&self.state);
        state.purge_expired(Instant::now());
        state.pending.is_empty() && !state.clearing
    }

    /// Reloads from the store. Records with an operation still pending stay
    /// out of the list.
    pub async fn refresh(&self) -> Result<Vec<DetectionRecord>, ReconcileError> {
        let records = self.store.list(&self.user_id).await?;

        let mut state = lock(&self.state);
        state.purge_expired(Instant::now());
        if state.clearing {
            return Ok(state.items.clone());
        }
        let visible: Vec<DetectionRecord> =
            records.into_iter().filter(|r| !state.is_pending(r)).collect();
        state.items = visible;
        state.loaded = true;
        Ok(state.items.clone())
    }

    /// Loads the list once so that item operations have something to act on.
    pub async fn ensure_loaded(&self) -> Result<(), ReconcileError> {
        let loaded = lock(&self.state).loaded;
        if !loaded {
            self.refresh().await?;
        }
        Ok(())
    }

    pub fn snapshot(&self) -> Vec<DetectionRecord> {
        let mut state = lock(&self.state);
        state.purge_expired(Instant::now());
        state.items.clone()
    }

    /// Shows a freshly saved record at the top of the list.
    pub fn insert_front(&self, record: DetectionRecord) {
        let mut state = lock(&self.state);
        state.reinsert(record, 0);
        state.items.truncate(HISTORY_LIMIT);
    }

    /// Removes the item locally, then deletes it remotely. On failure the item
    /// goes back where it was and no undo is offered.
    pub async fn delete(
        &self,
        id: &str,
        index_hint: Option<usize>,
    ) -> Result<UndoTicket, ReconcileError> {
        {
            let mut state = lock(&self.state);
            if state.clearing {
                return Err(ReconcileError::Busy(id.to_string()));
            }
            match state.pending.get(id).map(|p| p.phase) {
                Some(Phase::Deleting) | Some(Phase::Restoring { .. }) => {
                    return Err(ReconcileError::Busy(id.to_string()));
                }
                Some(Phase::Undoable { .. }) | None => {}
            }
            let index = state
                .position(id, index_hint)
                .ok_or_else(|| ReconcileError::NotFound(id.to_string()))?;
            let record = state.items.remove(index);
            state.pending.insert(
                id.to_string(),
                Pending {
                    record,
                    index,
                    phase: Phase::Deleting,
                },
            );
        }

        let owned_id = id.to_string();
        let rollback = Rollback::new(self.state.clone(), move |state| {
            state.restore_pending(&owned_id)
        });

        if let Err(e) = self.store.delete(id).await {
            log::error!("Failed to delete history record {}: {}", id, e);
            drop(rollback);
            return Err(e.into());
        }
        rollback.disarm();

        let expires_at = Instant::now() + self.undo_window;
        if let Some(pending) = lock(&self.state).pending.get_mut(id) {
            pending.phase = Phase::Undoable { expires_at };
        }

        let window =
            chrono::Duration::from_std(self.undo_window).unwrap_or(chrono::Duration::zero());
        log::info!("Deleted history record {} for user {}", id, self.user_id);
        Ok(UndoTicket {
            id: id.to_string(),
            expires_at: Utc::now() + window,
        })
    }

    /// Writes the deleted record back under its original id and returns it
    /// to its original position. A failed restore stays undoable until the
    /// window closes.
    pub async fn undo(&self, id: &str) -> Result<DetectionRecord, ReconcileError> {
        let record = {
            let mut state = lock(&self.state);
            if state.clearing {
                return Err(ReconcileError::Busy(id.to_string()));
            }
            let phase = state
                .pending
                .get(id)
                .map(|p| p.phase)
                .ok_or_else(|| ReconcileError::NotFound(id.to_string()))?;
            match phase {
                Phase::Undoable { expires_at } if expires_at > Instant::now() => {
                    let pending = state
                        .pending
                        .get_mut(id)
                        .ok_or_else(|| ReconcileError::NotFound(id.to_string()))?;
                    pending.phase = Phase::Restoring { expires_at };
                    pending.record.clone()
                }
                Phase::Undoable { .. } => {
                    state.pending.remove(id);
                    return Err(ReconcileError::UndoExpired(id.to_string()));
                }
                Phase::Deleting | Phase::Restoring { .. } => {
                    return Err(ReconcileError::Busy(id.to_string()));
                }
            }
        };

        let owned_id = id.to_string();
        let rollback = Rollback::new(self.state.clone(), move |state| {
            if let Some(pending) = state.pending.get_mut(&owned_id) {
                if let Phase::Restoring { expires_at } = pending.phase {
                    pending.phase = Phase::Undoable { expires_at };
                }
            }
        });

        if let Err(e) = self.store.overwrite(id, &record).await {
            log::error!("Failed to restore history record {}: {}", id, e);
            drop(rollback);
            return Err(e.into());
        }
        rollback.disarm();

        lock(&self.state).restore_pending(id);
        log::info!("Restored history record {} for user {}", id, self.user_id);
        Ok(record)
    }

    /// Empties the list, then deletes every record of the user remotely.
    /// Any failure puts the whole list back. Pending undos are discarded on
    /// success.
    pub async fn clear(&self) -> Result<usize, ReconcileError> {
        let (items, pending) = {
            let mut state = lock(&self.state);
            if state.clearing || state.has_in_flight() {
                return Err(ReconcileError::Busy(self.user_id.clone()));
            }
            state.clearing = true;
            (
                std::mem::take(&mut state.items),
                std::mem::take(&mut state.pending),
            )
        };

        let rollback = Rollback::new(self.state.clone(), move |state| {
            state.items = items;
            state.pending = pending;
            state.clearing = false;
        });

        match self.store.delete_all_for_user(&self.user_id).await {
            Ok(count) => {
                rollback.disarm();
                lock(&self.state).clearing = false;
                log::info!("Cleared {} history records for user {}", count, self.user_id);
                Ok(count)
            }
            Err(e) => {
                log::error!("Failed to clear history for user {}: {}", self.user_id, e);
                drop(rollback);
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::MemoryHistoryStore;
    use crate::history::testing::{FlakyStore, seed};
    use async_trait::async_trait;

    const WINDOW: Duration = Duration::from_secs(60);

    async fn loaded(store: Arc<FlakyStore>, count: usize, window: Duration) -> HistoryReconciler {
        seed(store.as_ref(), "alice", count).await;
        let reconciler = HistoryReconciler::new(store, "alice", window);
        reconciler.refresh().await.unwrap();
        reconciler
    }

    fn id_at(reconciler: &HistoryReconciler, index: usize) -> String {
        reconciler.snapshot()[index].id.clone().unwrap()
    }

    #[tokio::test]
    async fn delete_then_undo_restores_list_and_store() {
        let store = FlakyStore::shared();
        let reconciler = loaded(store.clone(), 5, WINDOW).await;
        let original = reconciler.snapshot();
        let id = id_at(&reconciler, 2);

        let ticket = reconciler.delete(&id, Some(2)).await.unwrap();
        assert_eq!(ticket.id, id);
        assert_eq!(reconciler.snapshot().len(), 4);
        assert!(store.inner.get(&id).is_none());

        let restored = reconciler.undo(&id).await.unwrap();
        assert_eq!(restored.id.as_deref(), Some(id.as_str()));
        assert_eq!(reconciler.snapshot(), original);
        assert_eq!(store.inner.get(&id), Some(original[2].clone()));
    }

    #[tokio::test]
    async fn failed_delete_rolls_back_to_original_index() {
        let store = FlakyStore::shared();
        let reconciler = loaded(store.clone(), 5, WINDOW).await;
        let original = reconciler.snapshot();
        let id = id_at(&reconciler, 2);

        FlakyStore::set(&store.fail_delete, true);
        let err = reconciler.delete(&id, Some(2)).await.unwrap_err();
        assert!(matches!(err, ReconcileError::Store(_)));
        assert_eq!(reconciler.snapshot(), original);

        // no undo is offered for a delete that never happened
        assert!(matches!(
            reconciler.undo(&id).await,
            Err(ReconcileError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn failed_undo_stays_undoable() {
        let store = FlakyStore::shared();
        let reconciler = loaded(store.clone(), 3, WINDOW).await;
        let original = reconciler.snapshot();
        let id = id_at(&reconciler, 0);
        reconciler.delete(&id, None).await.unwrap();

        FlakyStore::set(&store.fail_overwrite, true);
        assert!(reconciler.undo(&id).await.is_err());
        assert_eq!(reconciler.snapshot().len(), 2);

        FlakyStore::set(&store.fail_overwrite, false);
        reconciler.undo(&id).await.unwrap();
        assert_eq!(reconciler.snapshot(), original);
    }

    #[tokio::test]
    async fn undo_after_window_is_rejected() {
        let store = FlakyStore::shared();
        let reconciler = loaded(store.clone(), 2, Duration::ZERO).await;
        let id = id_at(&reconciler, 1);
        reconciler.delete(&id, Some(1)).await.unwrap();

        assert!(matches!(
            reconciler.undo(&id).await,
            Err(ReconcileError::UndoExpired(_))
        ));
        assert_eq!(reconciler.snapshot().len(), 1);
        assert!(store.inner.get(&id).is_none());
    }

    #[tokio::test]
    async fn stale_index_hint_falls_back_to_id_lookup() {
        let store = FlakyStore::shared();
        let reconciler = loaded(store, 4, WINDOW).await;
        let id = id_at(&reconciler, 3);

        reconciler.delete(&id, Some(0)).await.unwrap();
        let remaining: Vec<_> = reconciler.snapshot().into_iter().filter_map(|r| r.id).collect();
        assert!(!remaining.contains(&id));
        assert_eq!(remaining.len(), 3);
    }

    fn summaries(records: &[DetectionRecord]) -> Vec<String> {
        records.iter().map(|r| r.result_summary.clone()).collect()
    }

    #[tokio::test]
    async fn undoing_neighbouring_deletes_keeps_store_order() {
        let store = FlakyStore::shared();
        let reconciler = loaded(store.clone(), 4, WINDOW).await;
        let first = id_at(&reconciler, 1);
        reconciler.delete(&first, Some(1)).await.unwrap();
        let second = id_at(&reconciler, 1);
        reconciler.delete(&second, Some(1)).await.unwrap();

        reconciler.undo(&first).await.unwrap();
        reconciler.undo(&second).await.unwrap();

        let expected = summaries(&store.list("alice").await.unwrap());
        assert_eq!(summaries(&reconciler.snapshot()), expected);
        assert_eq!(
            expected,
            vec![
                "10% AI-Generated",
                "11% AI-Generated",
                "12% AI-Generated",
                "13% AI-Generated"
            ]
        );
    }

    #[tokio::test]
    async fn undo_in_reverse_order_keeps_store_order() {
        let store = FlakyStore::shared();
        let reconciler = loaded(store.clone(), 5, WINDOW).await;
        let original = reconciler.snapshot();
        let older = id_at(&reconciler, 3);
        let newer = id_at(&reconciler, 1);
        reconciler.delete(&older, Some(3)).await.unwrap();
        reconciler.delete(&newer, Some(1)).await.unwrap();

        reconciler.undo(&older).await.unwrap();
        reconciler.undo(&newer).await.unwrap();
        assert_eq!(reconciler.snapshot(), original);
    }

    #[tokio::test]
    async fn pending_undo_keeps_reconciler_busy() {
        let store = FlakyStore::shared();
        let reconciler = loaded(store, 2, WINDOW).await;
        assert!(reconciler.is_idle());

        let id = id_at(&reconciler, 0);
        reconciler.delete(&id, None).await.unwrap();
        assert!(!reconciler.is_idle());

        reconciler.undo(&id).await.unwrap();
        assert!(reconciler.is_idle());
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let reconciler = loaded(FlakyStore::shared(), 1, WINDOW).await;
        assert!(matches!(
            reconciler.delete("missing", None).await,
            Err(ReconcileError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn failed_clear_restores_everything() {
        let store = FlakyStore::shared();
        let reconciler = loaded(store.clone(), 4, WINDOW).await;
        let original = reconciler.snapshot();

        FlakyStore::set(&store.fail_delete_all, true);
        assert!(reconciler.clear().await.is_err());
        assert_eq!(reconciler.snapshot(), original);

        FlakyStore::set(&store.fail_delete_all, false);
        assert_eq!(reconciler.clear().await.unwrap(), 4);
        assert!(reconciler.snapshot().is_empty());
        assert!(store.inner.is_empty());
    }

    #[tokio::test]
    async fn clear_discards_pending_undo() {
        let store = FlakyStore::shared();
        let reconciler = loaded(store, 3, WINDOW).await;
        let id = id_at(&reconciler, 0);
        reconciler.delete(&id, None).await.unwrap();

        reconciler.clear().await.unwrap();
        assert!(matches!(
            reconciler.undo(&id).await,
            Err(ReconcileError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn insert_front_keeps_limit() {
        let store = FlakyStore::shared();
        let reconciler = loaded(store.clone(), HISTORY_LIMIT, WINDOW).await;
        let newest = crate::history::testing::record("alice", "99% AI-Generated", -10);
        let id = store.create(&newest).await.unwrap();

        reconciler.insert_front(newest.with_id(id.clone()));
        let items = reconciler.snapshot();
        assert_eq!(items.len(), HISTORY_LIMIT);
        assert_eq!(items[0].id.as_deref(), Some(id.as_str()));
    }

    /// Deletes never complete, leaving the operation in flight.
    #[derive(Default)]
    struct StalledDeletes {
        inner: MemoryHistoryStore,
    }

    #[async_trait]
    impl HistoryStore for StalledDeletes {
        async fn list(&self, user_id: &str) -> Result<Vec<DetectionRecord>, HistoryStoreError> {
            self.inner.list(user_id).await
        }

        async fn create(&self, record: &DetectionRecord) -> Result<String, HistoryStoreError> {
            self.inner.create(record).await
        }

        async fn delete(&self, _id: &str) -> Result<(), HistoryStoreError> {
            std::future::pending().await
        }

        async fn overwrite(
            &self,
            id: &str,
            record: &DetectionRecord,
        ) -> Result<(), HistoryStoreError> {
            self.inner.overwrite(id, record).await
        }

        async fn delete_all_for_user(&self, user_id: &str) -> Result<usize, HistoryStoreError> {
            self.inner.delete_all_for_user(user_id).await
        }
    }

    #[tokio::test]
    async fn second_operation_on_pending_item_is_busy_and_abandoned_delete_rolls_back() {
        let store = Arc::new(StalledDeletes::default());
        seed(store.as_ref(), "alice", 3).await;
        let reconciler = Arc::new(HistoryReconciler::new(store, "alice", WINDOW));
        reconciler.refresh().await.unwrap();
        let original = reconciler.snapshot();
        let id = id_at(&reconciler, 1);

        let task = {
            let reconciler = reconciler.clone();
            let id = id.clone();
            tokio::spawn(async move { reconciler.delete(&id, Some(1)).await })
        };
        while reconciler.snapshot().len() == original.len() {
            tokio::task::yield_now().await;
        }

        assert!(matches!(reconciler.delete(&id, None).await, Err(ReconcileError::Busy(_))));
        assert!(matches!(reconciler.undo(&id).await, Err(ReconcileError::Busy(_))));
        assert!(matches!(reconciler.clear().await, Err(ReconcileError::Busy(_))));

        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());
        assert_eq!(reconciler.snapshot(), original);
    }
}
