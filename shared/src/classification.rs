use derive_more::From;
use serde::{Deserialize, Serialize};

use crate::history::DetectionKind;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TextAnalysisRequest {
    pub text: String,
}

/// One sentence the text model cites as evidence. `score` is always the
/// AI-likelihood of the sentence on a 0-1 scale, whichever list it appears in.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TextIndicator {
    pub sentence: String,
    pub score: f64,
    pub reason: String,
}

/// Probabilities are pre-scaled to 0-100 by the service.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TextAnalysisResponse {
    pub prediction: String,
    pub ai_probability: f64,
    pub human_probability: f64,
    pub confidence: String,
    #[serde(default)]
    pub ai_indicators: Vec<TextIndicator>,
    #[serde(default)]
    pub human_indicators: Vec<TextIndicator>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ImageAnalysisRequest {
    pub image: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ImageExplanation {
    pub indicator: String,
    pub description: String,
    /// "AI", "Real" or "Neutral".
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ImageAnalysisResponse {
    pub prediction: String,
    pub ai_probability: f64,
    pub real_probability: f64,
    pub confidence: String,
    #[serde(default)]
    pub explanations: Vec<ImageExplanation>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct HealthResponse {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub text_model: Option<String>,
    #[serde(default)]
    pub image_model: Option<String>,
}

#[derive(Clone, Debug, PartialEq, From)]
pub enum ClassificationResponse {
    Text(TextAnalysisResponse),
    Image(ImageAnalysisResponse),
}

impl ClassificationResponse {
    pub fn kind(&self) -> DetectionKind {
        match self {
            ClassificationResponse::Text(_) => DetectionKind::Text,
            ClassificationResponse::Image(_) => DetectionKind::Image,
        }
    }
}
