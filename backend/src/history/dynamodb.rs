use async_trait::async_trait;
use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::types::{AttributeValue, Delete, TransactWriteItem};
use chrono::{DateTime, Utc};
use shared::{DetectionKind, DetectionRecord};
use std::collections::HashMap;
use std::str::FromStr;
use uuid::Uuid;

use super::{HISTORY_LIMIT, HistoryStore, HistoryStoreError};

/// Upper bound on items in a single DynamoDB transaction.
const TRANSACT_BATCH_SIZE: usize = 100;

mod attr {
    pub const ID: &str = "id";
    pub const USER_ID: &str = "userId";
    pub const KIND: &str = "type";
    pub const RESULT: &str = "result";
    pub const ORIGINAL_DATA: &str = "originalData";
    pub const DETAILED_RESULT: &str = "detailedResult";
    pub const TIMESTAMP: &str = "timestamp";
}

type Item = HashMap<String, AttributeValue>;

#[derive(Clone)]
pub struct DynamoHistoryStore {
    client: Client,
    table: String,
    user_index: String,
}

impl DynamoHistoryStore {
    pub fn new(client: Client, table: String, user_index: String) -> Self {
        Self {
            client,
            table,
            user_index,
        }
    }

    async fn user_record_ids(&self, user_id: &str) -> Result<Vec<String>, HistoryStoreError> {
        let mut ids = Vec::new();
        let mut start_key: Option<Item> = None;

        loop {
            let page = self
                .client
                .query()
                .table_name(&self.table)
                .index_name(&self.user_index)
                .key_condition_expression("userId = :uid")
                .expression_attribute_values(":uid", AttributeValue::S(user_id.to_string()))
                .projection_expression("id")
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(|e| HistoryStoreError::DynamoDb(e.to_string()))?;

            ids.extend(
                page.items()
                    .iter()
                    .filter_map(|item| item.get(attr::ID).and_then(|v| v.as_s().ok()).cloned()),
            );

            match page.last_evaluated_key {
                Some(key) if !key.is_empty() => start_key = Some(key),
                _ => break,
            }
        }

        Ok(ids)
    }

    async fn delete_batch(&self, ids: &[String]) -> Result<(), HistoryStoreError> {
        let mut items = Vec::with_capacity(ids.len());
        for id in ids {
            let delete = Delete::builder()
                .table_name(&self.table)
                .key(attr::ID, AttributeValue::S(id.clone()))
                .build()
                .map_err(|e| HistoryStoreError::DynamoDb(e.to_string()))?;
            items.push(TransactWriteItem::builder().delete(delete).build());
        }

        self.client
            .transact_write_items()
            .set_transact_items(Some(items))
            .send()
            .await
            .map_err(|e| HistoryStoreError::DynamoDb(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl HistoryStore for DynamoHistoryStore {
    async fn list(&self, user_id: &str) -> Result<Vec<DetectionRecord>, HistoryStoreError> {
        let mut records = Vec::new();
        let mut start_key: Option<Item> = None;

        // A page can come back short when the index read hits the 1 MB cap or
        // items fail to parse, so keep paging until the listing is full.
        loop {
            let page = self
                .client
                .query()
                .table_name(&self.table)
                .index_name(&self.user_index)
                .key_condition_expression("userId = :uid")
                .expression_attribute_values(":uid", AttributeValue::S(user_id.to_string()))
                .scan_index_forward(false)
                .limit((HISTORY_LIMIT - records.len()) as i32)
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(|e| {
                    log::error!("History query failed for user {}: {}", user_id, e);
                    HistoryStoreError::DynamoDb(e.to_string())
                })?;

            if collect_page(&mut records, page.items()) {
                break;
            }
            match page.last_evaluated_key {
                Some(key) if !key.is_empty() => start_key = Some(key),
                _ => break,
            }
        }

        log::info!("Loaded {} history records for user {}", records.len(), user_id);
        Ok(records)
    }

    async fn create(&self, record: &DetectionRecord) -> Result<String, HistoryStoreError> {
        let id = Uuid::new_v4().to_string();

        self.client
            .put_item()
            .table_name(&self.table)
            .set_item(Some(record_to_item(&id, record)))
            .condition_expression("attribute_not_exists(id)")
            .send()
            .await
            .map_err(|e| {
                log::error!("DynamoDB put_item failed for history record {}: {}", id, e);
                HistoryStoreError::DynamoDb(e.to_string())
            })?;

        log::info!("Saved {} detection {} for user {}", record.kind, id, record.user_id);
        Ok(id)
    }

    async fn delete(&self, id: &str) -> Result<(), HistoryStoreError> {
        let mut key = HashMap::new();
        key.insert(attr::ID.to_string(), AttributeValue::S(id.to_string()));

        self.client
            .delete_item()
            .table_name(&self.table)
            .set_key(Some(key))
            .send()
            .await
            .map_err(|e| HistoryStoreError::DynamoDb(e.to_string()))?;

        log::info!("Deleted history record {}", id);
        Ok(())
    }

    async fn overwrite(
        &self,
        id: &str,
        record: &DetectionRecord,
    ) -> Result<(), HistoryStoreError> {
        self.client
            .put_item()
            .table_name(&self.table)
            .set_item(Some(record_to_item(id, record)))
            .send()
            .await
            .map_err(|e| HistoryStoreError::DynamoDb(e.to_string()))?;

        log::info!("Restored history record {}", id);
        Ok(())
    }

    async fn delete_all_for_user(&self, user_id: &str) -> Result<usize, HistoryStoreError> {
        let ids = self.user_record_ids(user_id).await?;
        let total = ids.len();
        let mut deleted = 0;

        for batch in ids.chunks(TRANSACT_BATCH_SIZE) {
            if let Err(e) = self.delete_batch(batch).await {
                log::error!(
                    "Clearing history for user {} failed after {} of {} records: {}",
                    user_id,
                    deleted,
                    total,
                    e
                );
                return Err(HistoryStoreError::PartialBatch {
                    deleted,
                    total,
                    reason: e.to_string(),
                });
            }
            deleted += batch.len();
        }

        log::info!("Cleared {} history records for user {}", deleted, user_id);
        Ok(deleted)
    }
}

/// Appends the readable records of one query page, up to [`HISTORY_LIMIT`].
/// Returns true once the listing is full.
fn collect_page(records: &mut Vec<DetectionRecord>, items: &[Item]) -> bool {
    for item in items {
        if records.len() >= HISTORY_LIMIT {
            break;
        }
        match parse_record_from_item(item) {
            Ok(record) => records.push(record),
            Err(e) => log::warn!("Skipping unreadable history record: {}", e),
        }
    }
    records.len() >= HISTORY_LIMIT
}

fn record_to_item(id: &str, record: &DetectionRecord) -> Item {
    let mut item = HashMap::new();
    item.insert(attr::ID.to_string(), AttributeValue::S(id.to_string()));
    item.insert(
        attr::USER_ID.to_string(),
        AttributeValue::S(record.user_id.clone()),
    );
    item.insert(
        attr::KIND.to_string(),
        AttributeValue::S(record.kind.to_string()),
    );
    item.insert(
        attr::RESULT.to_string(),
        AttributeValue::S(record.result_summary.clone()),
    );
    item.insert(
        attr::ORIGINAL_DATA.to_string(),
        AttributeValue::S(record.raw_input.clone()),
    );
    if let Some(explanation) = &record.explanation {
        item.insert(
            attr::DETAILED_RESULT.to_string(),
            AttributeValue::S(explanation.clone()),
        );
    }
    item.insert(
        attr::TIMESTAMP.to_string(),
        AttributeValue::N(record.created_at.timestamp_millis().to_string()),
    );
    item
}

fn parse_record_from_item(item: &Item) -> Result<DetectionRecord, HistoryStoreError> {
    let id = item
        .get(attr::ID)
        .and_then(|v| v.as_s().ok())
        .ok_or_else(|| HistoryStoreError::InvalidData("Missing record id".to_string()))?
        .clone();

    let user_id = item
        .get(attr::USER_ID)
        .and_then(|v| v.as_s().ok())
        .ok_or_else(|| HistoryStoreError::InvalidData(format!("Missing userId on {}", id)))?
        .clone();

    let kind = item
        .get(attr::KIND)
        .and_then(|v| v.as_s().ok())
        .and_then(|s| DetectionKind::from_str(s).ok())
        .ok_or_else(|| HistoryStoreError::InvalidData(format!("Invalid type on {}", id)))?;

    let string_or_empty = |name: &str| {
        item.get(name)
            .and_then(|v| v.as_s().ok())
            .cloned()
            .unwrap_or_default()
    };

    let explanation = item
        .get(attr::DETAILED_RESULT)
        .and_then(|v| v.as_s().ok())
        .cloned();

    let created_at = match item.get(attr::TIMESTAMP) {
        None => DateTime::<Utc>::default(),
        Some(value) => parse_timestamp(value)
            .ok_or_else(|| HistoryStoreError::InvalidData(format!("Invalid timestamp on {}", id)))?,
    };

    Ok(DetectionRecord {
        id: Some(id),
        user_id,
        kind,
        result_summary: string_or_empty(attr::RESULT),
        raw_input: string_or_empty(attr::ORIGINAL_DATA),
        explanation,
        created_at,
    })
}

/// Epoch milliseconds, or RFC 3339 text from older writes.
fn parse_timestamp(value: &AttributeValue) -> Option<DateTime<Utc>> {
    match value {
        AttributeValue::N(n) => n
            .parse::<i64>()
            .ok()
            .and_then(DateTime::<Utc>::from_timestamp_millis),
        AttributeValue::S(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|d| d.with_timezone(&Utc)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn s(value: &str) -> AttributeValue {
        AttributeValue::S(value.to_string())
    }

    fn full_item() -> Item {
        let mut item = HashMap::new();
        item.insert("id".to_string(), s("rec-1"));
        item.insert("userId".to_string(), s("user-1"));
        item.insert("type".to_string(), s("Text"));
        item.insert("result".to_string(), s("88% AI-Generated"));
        item.insert("originalData".to_string(), s("Some submitted text"));
        item.insert("detailedResult".to_string(), s("Reasons:\n\n"));
        item.insert(
            "timestamp".to_string(),
            AttributeValue::N("1714564800000".to_string()),
        );
        item
    }

    #[test]
    fn parses_complete_item() {
        let record = parse_record_from_item(&full_item()).unwrap();
        assert_eq!(record.id.as_deref(), Some("rec-1"));
        assert_eq!(record.kind, DetectionKind::Text);
        assert_eq!(record.result_summary, "88% AI-Generated");
        assert_eq!(record.explanation.as_deref(), Some("Reasons:\n\n"));
        assert_eq!(
            record.created_at,
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn item_written_by_record_to_item_parses_back() {
        let record = parse_record_from_item(&full_item()).unwrap();
        let item = record_to_item("rec-1", &record);
        assert_eq!(item.get("timestamp"), full_item().get("timestamp"));
        assert_eq!(parse_record_from_item(&item).unwrap(), record);
    }

    #[test]
    fn optional_fields_fall_back() {
        let mut item = full_item();
        item.remove("result");
        item.remove("originalData");
        item.remove("detailedResult");
        item.remove("timestamp");

        let record = parse_record_from_item(&item).unwrap();
        assert_eq!(record.result_summary, "");
        assert_eq!(record.raw_input, "");
        assert_eq!(record.explanation, None);
        assert_eq!(record.created_at.timestamp(), 0);

        let outcome = record.replay();
        assert_eq!(outcome.summary(), "50% Unknown");
    }

    #[test]
    fn legacy_string_timestamp_is_read_as_rfc3339() {
        let mut item = full_item();
        item.insert("timestamp".to_string(), s("2024-05-01T14:00:00+02:00"));
        let record = parse_record_from_item(&item).unwrap();
        assert_eq!(
            record.created_at,
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn required_fields_are_enforced() {
        for missing in ["id", "userId", "type"] {
            let mut item = full_item();
            item.remove(missing);
            assert!(
                matches!(parse_record_from_item(&item), Err(HistoryStoreError::InvalidData(_))),
                "{} should be required",
                missing
            );
        }

        let mut item = full_item();
        item.insert("type".to_string(), s("Audio"));
        assert!(parse_record_from_item(&item).is_err());
    }

    #[test]
    fn unparseable_timestamp_is_rejected() {
        let mut item = full_item();
        item.insert("timestamp".to_string(), s("yesterday"));
        assert!(parse_record_from_item(&item).is_err());
    }

    fn item_with_id(id: usize) -> Item {
        let mut item = full_item();
        item.insert("id".to_string(), s(&format!("rec-{}", id)));
        item
    }

    #[test]
    fn short_pages_keep_collecting_until_full() {
        let mut records = Vec::new();

        // first page: 20 items, 5 unreadable
        let mut first: Vec<Item> = (0..20).map(item_with_id).collect();
        for item in first.iter_mut().take(5) {
            item.remove("type");
        }
        assert!(!collect_page(&mut records, &first));
        assert_eq!(records.len(), 15);

        let second: Vec<Item> = (20..80).map(item_with_id).collect();
        assert!(collect_page(&mut records, &second));
        assert_eq!(records.len(), HISTORY_LIMIT);
        assert_eq!(records[0].id.as_deref(), Some("rec-5"));
        assert_eq!(records[HISTORY_LIMIT - 1].id.as_deref(), Some("rec-54"));
    }

    #[test]
    fn empty_page_is_not_full() {
        let mut records = Vec::new();
        assert!(!collect_page(&mut records, &[]));
        assert!(records.is_empty());
    }
}
