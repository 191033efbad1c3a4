use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ReportError;
use crate::extract::{DocumentFormat, TextExtractor};
use crate::gateway::ModelGateway;

/// Extracted text together with the model's simplified summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportAnalysis {
    pub source_text: String,
    pub summary: String,
}

pub fn simplify_report_prompt(report_text: &str) -> String {
    format!("Please simplify this medical report: {report_text}")
}

/// Extract → prompt → model. Keeps no state between calls.
#[derive(Clone)]
pub struct ReportAnalyzer {
    extractor: TextExtractor,
    gateway: Arc<ModelGateway>,
}

impl ReportAnalyzer {
    pub fn new(extractor: TextExtractor, gateway: Arc<ModelGateway>) -> Self {
        Self { extractor, gateway }
    }

    /// Analyzes the file at `path`, resolving its format from
    /// `content_type` and then from the extension.
    pub async fn analyze(
        &self,
        path: &Path,
        content_type: Option<&str>,
    ) -> Result<ReportAnalysis, ReportError> {
        let format = DocumentFormat::resolve(path, content_type);
        let source_text = self.extractor.extract(path, format).await.map_err(|e| {
            warn!(path = %path.display(), error = %e, "Report extraction failed");
            e
        })?;

        if source_text.trim().is_empty() {
            warn!(path = %path.display(), "No text extracted from report");
            return Err(ReportError::NoText);
        }

        info!(chars = source_text.len(), "Requesting report summary");
        let summary = self
            .gateway
            .send_once(&simplify_report_prompt(&source_text))
            .await?;

        Ok(ReportAnalysis {
            source_text,
            summary,
        })
    }
}
