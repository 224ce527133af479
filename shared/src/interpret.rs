//! Turns classifier responses and persisted history summaries into a
//! [`DetectionOutcome`]. Everything here is pure: the same input always renders
//! the same probability and explanation text.

use crate::classification::{
    ClassificationResponse, ImageAnalysisResponse, ImageExplanation, TextAnalysisResponse,
    TextIndicator,
};
use crate::outcome::{DetectionLabel, DetectionOutcome, Verdict};

pub const NO_INDICATORS: &str = "No specific indicators found.";
pub const NO_DETAILS: &str = "No detailed results available";
pub const UNKNOWN_LABEL: &str = "Unknown";
pub const DEFAULT_STORED_PROBABILITY: u8 = 50;

pub fn interpret(response: &ClassificationResponse) -> DetectionOutcome {
    match response {
        ClassificationResponse::Text(text) => interpret_text(text),
        ClassificationResponse::Image(image) => interpret_image(image),
    }
}

/// Replays a stored `"<percent>% <label>"` summary. Never fails: anything
/// unparsable degrades to 50% / "Unknown".
pub fn interpret_stored(summary: &str, explanation: Option<&str>) -> DetectionOutcome {
    let (percent_part, label_part) = match summary.split_once('%') {
        Some((percent, label)) => (percent, Some(label)),
        None => (summary, None),
    };

    let probability = percent_part
        .trim()
        .parse::<i64>()
        .map(|value| value.clamp(0, 100) as u8)
        .unwrap_or(DEFAULT_STORED_PROBABILITY);

    let label = label_part
        .map(str::trim)
        .filter(|label| !label.is_empty())
        .unwrap_or(UNKNOWN_LABEL)
        .to_string();

    DetectionOutcome {
        verdict: Verdict::from_label(&label),
        label,
        probability,
        explanation: explanation.unwrap_or(NO_DETAILS).to_string(),
    }
}

fn interpret_text(response: &TextAnalysisResponse) -> DetectionOutcome {
    let is_ai = is_ai(&response.prediction);
    let (label, probability, indicators) = if is_ai {
        (
            DetectionLabel::AiGenerated,
            response.ai_probability,
            &response.ai_indicators,
        )
    } else {
        (
            DetectionLabel::HumanWritten,
            response.human_probability,
            &response.human_indicators,
        )
    };

    let mut explanation = String::from("Reasons:\n\n");
    if indicators.is_empty() {
        explanation.push_str(NO_INDICATORS);
    } else {
        for (index, indicator) in indicators.iter().enumerate() {
            explanation.push_str(&format!("{}. \"{}\"\n\n", index + 1, indicator.sentence));
            explanation.push_str(&format!("   {}\n", indicator.reason));
            explanation.push_str(&format!(
                "   Confidence: {}%\n",
                indicator_confidence(indicator, is_ai)
            ));
            if index + 1 < indicators.len() {
                explanation.push('\n');
            }
        }
    }
    push_overall_confidence(&mut explanation, &response.confidence);

    DetectionOutcome::new(label, to_percent(probability), explanation)
}

fn interpret_image(response: &ImageAnalysisResponse) -> DetectionOutcome {
    let is_ai = is_ai(&response.prediction);
    let (label, probability) = if is_ai {
        (DetectionLabel::AiGenerated, response.ai_probability)
    } else {
        (DetectionLabel::RealImage, response.real_probability)
    };

    // Image evidence is one list covering both sides, rendered in full.
    let explanations: &[ImageExplanation] = &response.explanations;

    let mut explanation = String::from("Analysis:\n\n");
    if explanations.is_empty() {
        explanation.push_str(NO_INDICATORS);
    } else {
        for (index, entry) in explanations.iter().enumerate() {
            explanation.push_str(&format!("{}. {}\n", index + 1, entry.indicator));
            explanation.push_str(&format!("   {}\n", entry.description));
            if index + 1 < explanations.len() {
                explanation.push('\n');
            }
        }
    }
    push_overall_confidence(&mut explanation, &response.confidence);

    DetectionOutcome::new(label, to_percent(probability), explanation)
}

fn is_ai(prediction: &str) -> bool {
    prediction.trim().eq_ignore_ascii_case("AI")
}

// Indicator scores are AI-likelihoods; a human prediction shows the complement.
fn indicator_confidence(indicator: &TextIndicator, is_ai: bool) -> u8 {
    let score = if is_ai {
        indicator.score
    } else {
        1.0 - indicator.score
    };
    to_percent(score * 100.0)
}

fn push_overall_confidence(explanation: &mut String, confidence: &str) {
    explanation.push_str(&format!("\n\nOverall Confidence: {}", confidence));
}

fn to_percent(value: f64) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.round().clamp(0.0, 100.0) as u8
}
