use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum_macros::{Display, EnumString};

/// Label texts written into a record's result summary.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Display, EnumString)]
pub enum DetectionLabel {
    #[strum(serialize = "AI-Generated")]
    AiGenerated,
    #[strum(serialize = "Human-Written")]
    HumanWritten,
    #[strum(serialize = "Real Image")]
    RealImage,
}

impl DetectionLabel {
    pub fn verdict(self) -> Verdict {
        match self {
            DetectionLabel::AiGenerated => Verdict::AiGenerated,
            DetectionLabel::HumanWritten | DetectionLabel::RealImage => Verdict::Authentic,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    AiGenerated,
    Authentic,
    Unknown,
}

impl Verdict {
    pub fn from_label(label: &str) -> Self {
        DetectionLabel::from_str(label)
            .map(DetectionLabel::verdict)
            .unwrap_or(Verdict::Unknown)
    }
}

/// Normalized result shown to the user, either fresh from the classifier or
/// replayed from a history record.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DetectionOutcome {
    pub label: String,
    pub verdict: Verdict,
    /// Integer percent confidence of the predicted label, 0..=100.
    pub probability: u8,
    pub explanation: String,
}

impl DetectionOutcome {
    pub fn new(label: DetectionLabel, probability: u8, explanation: String) -> Self {
        Self {
            label: label.to_string(),
            verdict: label.verdict(),
            probability,
            explanation,
        }
    }

    /// `"<probability>% <label>"`, the form persisted as a record's result.
    pub fn summary(&self) -> String {
        format!("{}% {}", self.probability, self.label)
    }
}
