use async_trait::async_trait;
use shared::DetectionRecord;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use super::{HISTORY_LIMIT, HistoryStore, HistoryStoreError};

/// In-process history for local development. Contents are lost on restart.
#[derive(Default)]
pub struct MemoryHistoryStore {
    records: Mutex<HashMap<String, DetectionRecord>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> std::sync::MutexGuard<'_, HashMap<String, DetectionRecord>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.records().len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.records().is_empty()
    }

    #[cfg(test)]
    pub fn get(&self, id: &str) -> Option<DetectionRecord> {
        self.records().get(id).cloned()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn list(&self, user_id: &str) -> Result<Vec<DetectionRecord>, HistoryStoreError> {
        let mut records: Vec<DetectionRecord> = self
            .records()
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records.truncate(HISTORY_LIMIT);
        Ok(records)
    }

    async fn create(&self, record: &DetectionRecord) -> Result<String, HistoryStoreError> {
        let id = Uuid::new_v4().to_string();
        let stored = record.clone().with_id(id.clone());
        self.records().insert(id.clone(), stored);
        log::debug!("Stored history record {} in memory", id);
        Ok(id)
    }

    async fn delete(&self, id: &str) -> Result<(), HistoryStoreError> {
        self.records().remove(id);
        Ok(())
    }

    async fn overwrite(
        &self,
        id: &str,
        record: &DetectionRecord,
    ) -> Result<(), HistoryStoreError> {
        let stored = record.clone().with_id(id);
        self.records().insert(id.to_string(), stored);
        Ok(())
    }

    async fn delete_all_for_user(&self, user_id: &str) -> Result<usize, HistoryStoreError> {
        let mut records = self.records();
        let before = records.len();
        records.retain(|_, r| r.user_id != user_id);
        Ok(before - records.len())
    }
}
