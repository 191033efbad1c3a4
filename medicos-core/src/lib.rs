//! Core of the medicos health assistant: a keyword rule table in front of a
//! remote generative model, per-user conversation state, and a report
//! pipeline that turns uploaded documents into simplified summaries.

pub mod dispatcher;
pub mod error;
pub mod extract;
pub mod gateway;
pub mod report;
pub mod rules;
pub mod session;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export commonly used types
pub use dispatcher::{Dispatcher, TREATMENT_MARKER, TurnOutcome, TurnRoute};
pub use error::{ExtractionError, GatewayError, GatewayErrorKind, ReportError, RuleError};
pub use extract::{DocumentFormat, ImageKind, OcrEngine, PageImage, TextExtractor};
pub use gateway::{
    ChatHandle, CompletionBackend, FALLBACK_REPLY, GatewayOptions, ModelGateway, ModelRole,
    ModelTurn, simplify_response,
};
pub use report::{ReportAnalysis, ReportAnalyzer};
pub use rules::{SymptomEntry, SymptomRules};
pub use session::{ConversationState, HistoryEntry, Role, SessionSnapshot, SessionStore};
