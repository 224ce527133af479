pub mod dynamodb;
pub mod memory;
pub mod reconciler;
pub mod registry;

use async_trait::async_trait;
use shared::DetectionRecord;

pub use dynamodb::DynamoHistoryStore;
pub use memory::MemoryHistoryStore;
pub use reconciler::{HistoryReconciler, ReconcileError};
pub use registry::ReconcilerRegistry;

/// Most recent records returned by a history listing.
pub const HISTORY_LIMIT: usize = 50;

#[derive(Debug, thiserror::Error)]
pub enum HistoryStoreError {
    #[error("DynamoDB error: {0}")]
    DynamoDb(String),
    #[error("Invalid history record: {0}")]
    InvalidData(String),
    #[error("Batch delete failed after {deleted} of {total} records: {reason}")]
    PartialBatch {
        deleted: usize,
        total: usize,
        reason: String,
    },
}

/// Per-user detection history in the remote document store.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Newest first, at most [`HISTORY_LIMIT`] records.
    async fn list(&self, user_id: &str) -> Result<Vec<DetectionRecord>, HistoryStoreError>;

    /// Stores a record that has no id yet and returns the assigned id.
    async fn create(&self, record: &DetectionRecord) -> Result<String, HistoryStoreError>;

    async fn delete(&self, id: &str) -> Result<(), HistoryStoreError>;

    /// Full replacement of the document under `id`, creating it if absent.
    async fn overwrite(&self, id: &str, record: &DetectionRecord)
    -> Result<(), HistoryStoreError>;

    /// On error the caller must assume an unknown subset was deleted.
    async fn delete_all_for_user(&self, user_id: &str) -> Result<usize, HistoryStoreError>;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use shared::DetectionKind;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Wraps a [`MemoryHistoryStore`] with switchable failures.
    #[derive(Default)]
    pub struct FlakyStore {
        pub inner: MemoryHistoryStore,
        pub fail_list: AtomicBool,
        pub fail_create: AtomicBool,
        pub fail_delete: AtomicBool,
        pub fail_overwrite: AtomicBool,
        pub fail_delete_all: AtomicBool,
    }

    impl FlakyStore {
        pub fn shared() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn set(flag: &AtomicBool, value: bool) {
            flag.store(value, Ordering::SeqCst);
        }

        fn check(flag: &AtomicBool, operation: &str) -> Result<(), HistoryStoreError> {
            if flag.load(Ordering::SeqCst) {
                Err(HistoryStoreError::DynamoDb(format!("simulated {} failure", operation)))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl HistoryStore for FlakyStore {
        async fn list(&self, user_id: &str) -> Result<Vec<DetectionRecord>, HistoryStoreError> {
            Self::check(&self.fail_list, "list")?;
            self.inner.list(user_id).await
        }

        async fn create(&self, record: &DetectionRecord) -> Result<String, HistoryStoreError> {
            Self::check(&self.fail_create, "create")?;
            self.inner.create(record).await
        }

        async fn delete(&self, id: &str) -> Result<(), HistoryStoreError> {
            Self::check(&self.fail_delete, "delete")?;
            self.inner.delete(id).await
        }

        async fn overwrite(
            &self,
            id: &str,
            record: &DetectionRecord,
        ) -> Result<(), HistoryStoreError> {
            Self::check(&self.fail_overwrite, "overwrite")?;
            self.inner.overwrite(id, record).await
        }

        async fn delete_all_for_user(&self, user_id: &str) -> Result<usize, HistoryStoreError> {
            Self::check(&self.fail_delete_all, "delete_all")?;
            self.inner.delete_all_for_user(user_id).await
        }
    }

    /// A text record created `minutes_ago` before a fixed instant.
    pub fn record(user_id: &str, summary: &str, minutes_ago: i64) -> DetectionRecord {
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        DetectionRecord {
            id: None,
            user_id: user_id.to_string(),
            kind: DetectionKind::Text,
            result_summary: summary.to_string(),
            raw_input: format!("input for {}", summary),
            explanation: Some(format!("Reasons for {}", summary)),
            created_at: base - Duration::minutes(minutes_ago),
        }
    }

    /// Stores `count` records for `user_id`, newest first in the returned list.
    pub async fn seed(store: &dyn HistoryStore, user_id: &str, count: usize) -> Vec<DetectionRecord> {
        let mut seeded = Vec::with_capacity(count);
        for i in 0..count {
            let record = record(user_id, &format!("{}% AI-Generated", 10 + i), i as i64);
            let id = store.create(&record).await.unwrap();
            seeded.push(record.with_id(id));
        }
        seeded
    }
}
