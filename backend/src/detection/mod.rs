pub mod thumbnail;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use shared::{
    ClassificationResponse, DetectionKind, DetectionOutcome, DetectionRecord, DetectionReport,
    interpret,
};
use std::sync::Arc;

use crate::classifier::{Classifier, ClassifierError};
use crate::history::HistoryStore;

pub const MIN_TEXT_CHARS: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum DetectionError {
    #[error("Please enter some text")]
    EmptyText,
    #[error("Text too short (minimum 10 characters)")]
    TextTooShort,
    #[error("Please select an image")]
    EmptyImage,
    #[error("Image payload is not valid base64: {0}")]
    InvalidImage(String),
    #[error(transparent)]
    Classifier(#[from] ClassifierError),
}

/// A finished detection. `record` is set only when the result was saved to
/// the user's history.
#[derive(Debug, Clone)]
pub struct Detection {
    pub outcome: DetectionOutcome,
    pub record: Option<DetectionRecord>,
}

impl Detection {
    pub fn report(&self) -> DetectionReport {
        DetectionReport {
            summary: self.outcome.summary(),
            outcome: self.outcome.clone(),
            saved: self.record.is_some(),
            record_id: self.record.as_ref().and_then(|r| r.id.clone()),
        }
    }
}

pub struct DetectionService {
    classifier: Arc<dyn Classifier>,
    store: Arc<dyn HistoryStore>,
}

impl DetectionService {
    pub fn new(classifier: Arc<dyn Classifier>, store: Arc<dyn HistoryStore>) -> Self {
        Self { classifier, store }
    }

    pub fn classifier(&self) -> &dyn Classifier {
        self.classifier.as_ref()
    }

    pub async fn detect_text(
        &self,
        user_id: Option<&str>,
        text: &str,
    ) -> Result<Detection, DetectionError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(DetectionError::EmptyText);
        }
        if text.chars().count() < MIN_TEXT_CHARS {
            return Err(DetectionError::TextTooShort);
        }

        let response = self.classifier.analyze_text(text).await?;
        let outcome = interpret(&ClassificationResponse::from(response));
        log::info!("Text classified as {}", outcome.summary());

        let record = match user_id {
            Some(user_id) => {
                self.persist(user_id, DetectionKind::Text, &outcome, text.to_string())
                    .await
            }
            None => {
                log::debug!("No session, text result not saved");
                None
            }
        };
        Ok(Detection { outcome, record })
    }

    /// `image` is base64; embedded whitespace from line-wrapping encoders is
    /// ignored.
    pub async fn detect_image(
        &self,
        user_id: Option<&str>,
        image: &str,
    ) -> Result<Detection, DetectionError> {
        let payload: String = image.chars().filter(|c| !c.is_whitespace()).collect();
        if payload.is_empty() {
            return Err(DetectionError::EmptyImage);
        }
        let bytes = STANDARD
            .decode(&payload)
            .map_err(|e| DetectionError::InvalidImage(e.to_string()))?;

        let response = self.classifier.analyze_image(&payload).await?;
        let outcome = interpret(&ClassificationResponse::from(response));
        log::info!("Image classified as {}", outcome.summary());

        let Some(user_id) = user_id else {
            log::debug!("No session, image result not saved");
            return Ok(Detection {
                outcome,
                record: None,
            });
        };

        let preview = match tokio::task::spawn_blocking(move || {
            thumbnail::encode_thumbnail(&bytes)
        })
        .await
        {
            Ok(Ok(encoded)) => encoded,
            Ok(Err(e)) => {
                log::warn!("Could not build image preview, saving without it: {}", e);
                String::new()
            }
            Err(e) => {
                log::error!("Image preview task failed: {}", e);
                String::new()
            }
        };

        let record = self
            .persist(user_id, DetectionKind::Image, &outcome, preview)
            .await;
        Ok(Detection { outcome, record })
    }

    async fn persist(
        &self,
        user_id: &str,
        kind: DetectionKind,
        outcome: &DetectionOutcome,
        raw_input: String,
    ) -> Option<DetectionRecord> {
        let record = DetectionRecord::from_outcome(user_id, kind, outcome, raw_input);
        match self.store.create(&record).await {
            Ok(id) => Some(record.with_id(id)),
            Err(e) => {
                log::warn!("Detection result not saved to history: {}", e);
                None
            }
        }
    }
}
