pub mod client;

use async_trait::async_trait;
use shared::{HealthResponse, ImageAnalysisResponse, TextAnalysisResponse};

pub use client::ClassificationClient;

#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("Invalid classifier base URL: {0}")]
    InvalidBaseUrl(#[from] url::ParseError),
    #[error("Classifier request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Classifier returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Failed to parse classifier response: {0}")]
    Decode(String),
}

/// The remote AI-content classifier.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn health(&self) -> Result<HealthResponse, ClassifierError>;

    async fn analyze_text(&self, text: &str) -> Result<TextAnalysisResponse, ClassifierError>;

    /// `image` is the base64 encoded payload.
    async fn analyze_image(&self, image: &str) -> Result<ImageAnalysisResponse, ClassifierError>;
}
