pub mod classification;
pub mod history;
pub mod interpret;
pub mod outcome;

pub use classification::{
    ClassificationResponse, HealthResponse, ImageAnalysisRequest, ImageAnalysisResponse,
    ImageExplanation, TextAnalysisRequest, TextAnalysisResponse, TextIndicator,
};
pub use history::{
    DetectionKind, DetectionRecord, DetectionReport, HistoryEntry, HistoryView, ImagePreview,
    UndoTicket,
};
pub use interpret::{interpret, interpret_stored};
pub use outcome::{DetectionLabel, DetectionOutcome, Verdict};
