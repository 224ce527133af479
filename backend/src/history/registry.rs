use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{HistoryReconciler, HistoryStore};

/// Hands out one [`HistoryReconciler`] per user so that pending deletes and
/// undos survive across requests.
pub struct ReconcilerRegistry {
    store: Arc<dyn HistoryStore>,
    undo_window: Duration,
    reconcilers: Mutex<HashMap<String, Arc<HistoryReconciler>>>,
}

impl ReconcilerRegistry {
    pub fn new(store: Arc<dyn HistoryStore>, undo_window: Duration) -> Self {
        Self {
            store,
            undo_window,
            reconcilers: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the reconciler for `user_id`, creating it on first use.
    /// Reconcilers nobody holds and with nothing pending are dropped on the
    /// way, since a fresh one reloads the same list from the store.
    pub fn for_user(&self, user_id: &str) -> Arc<HistoryReconciler> {
        let mut reconcilers = self.reconcilers.lock().unwrap_or_else(|e| e.into_inner());
        let before = reconcilers.len();
        reconcilers.retain(|uid, reconciler| {
            uid == user_id || Arc::strong_count(reconciler) > 1 || !reconciler.is_idle()
        });
        if reconcilers.len() < before {
            log::debug!("Evicted {} idle history reconcilers", before - reconcilers.len());
        }

        reconcilers
            .entry(user_id.to_string())
            .or_insert_with(|| {
                log::debug!("Creating history reconciler for user {}", user_id);
                Arc::new(HistoryReconciler::new(
                    self.store.clone(),
                    user_id,
                    self.undo_window,
                ))
            })
            .clone()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.reconcilers.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
