use std::time::Duration;

use thiserror::Error;

/// Why a gateway call produced no reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayErrorKind {
    /// The backend rejected or failed the request (network, quota, bad prompt).
    Request,
    /// The backend did not answer within the configured bound.
    Timeout,
}

/// Uniform failure of a remote model call.
///
/// Every backend failure is folded into this one type so that callers have a
/// single thing to turn into a user-visible message.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct GatewayError {
    pub kind: GatewayErrorKind,
    pub message: String,
}

impl GatewayError {
    pub fn new(kind: GatewayErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn request(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorKind::Request, message)
    }

    pub fn timeout(after: Duration) -> Self {
        Self::new(
            GatewayErrorKind::Timeout,
            format!("model did not respond within {}s", after.as_secs_f32()),
        )
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == GatewayErrorKind::Timeout
    }
}

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("PDF parsing failed: {0}")]
    PdfParsing(String),

    #[error("PDF rendering failed: {0}")]
    PdfRender(String),

    #[error("Image processing error: {0}")]
    Image(String),

    #[error("Text encoding error: {0}")]
    Encoding(String),

    #[error("OCR processing failed: {0}")]
    Ocr(String),

    #[error("Extraction task failed: {0}")]
    Task(String),
}

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Error analyzing report: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Error analyzing report: no text could be extracted from the document")]
    NoText,

    #[error("Error analyzing report: {0}")]
    Model(#[from] GatewayError),
}

#[derive(Error, Debug)]
pub enum RuleError {
    #[error("symptom keyword must not be empty")]
    EmptyKeyword,

    #[error("duplicate symptom keyword: {0}")]
    DuplicateKeyword(String),

    #[error("invalid rule table: {0}")]
    Parse(#[from] serde_json::Error),
}
