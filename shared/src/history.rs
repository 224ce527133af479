use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::interpret::interpret_stored;
use crate::outcome::DetectionOutcome;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumString)]
pub enum DetectionKind {
    Text,
    Image,
}

/// A persisted detection. `id` is only present once the history store has
/// accepted the record.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DetectionRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: DetectionKind,
    pub result_summary: String,
    /// Original text, or a base64 JPEG thumbnail for images.
    pub raw_input: String,
    #[serde(default)]
    pub explanation: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl DetectionRecord {
    pub fn from_outcome(
        user_id: impl Into<String>,
        kind: DetectionKind,
        outcome: &DetectionOutcome,
        raw_input: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            user_id: user_id.into(),
            kind,
            result_summary: outcome.summary(),
            raw_input: raw_input.into(),
            explanation: Some(outcome.explanation.clone()),
            created_at: Utc::now(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn replay(&self) -> DetectionOutcome {
        interpret_stored(&self.result_summary, self.explanation.as_deref())
    }

    pub fn image_preview(&self) -> Option<ImagePreview> {
        match self.kind {
            DetectionKind::Image => Some(ImagePreview::classify(&self.raw_input)),
            DetectionKind::Text => None,
        }
    }
}

/// What a client can show for the stored image payload of a record.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ImagePreview {
    Inline,
    /// Older records kept a path on the submitting device.
    Unavailable,
    NotSaved,
    Missing,
}

impl ImagePreview {
    const INLINE_MIN_LEN: usize = 1000;

    pub fn classify(raw_input: &str) -> Self {
        if raw_input.is_empty() {
            ImagePreview::Missing
        } else if raw_input.len() > Self::INLINE_MIN_LEN {
            ImagePreview::Inline
        } else if raw_input.starts_with("/data/") {
            ImagePreview::Unavailable
        } else {
            ImagePreview::NotSaved
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct HistoryEntry {
    pub record: DetectionRecord,
    pub outcome: DetectionOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_preview: Option<ImagePreview>,
}

impl From<DetectionRecord> for HistoryEntry {
    fn from(record: DetectionRecord) -> Self {
        Self {
            outcome: record.replay(),
            image_preview: record.image_preview(),
            record,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HistoryView {
    NotAuthenticated,
    Loaded { entries: Vec<HistoryEntry> },
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct UndoTicket {
    pub id: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DetectionReport {
    pub outcome: DetectionOutcome,
    pub summary: String,
    pub saved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
}
