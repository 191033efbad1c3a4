use medicos_core::{HistoryEntry, SessionSnapshot, TurnOutcome};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub user_id: Option<String>,
    #[serde(alias = "user_input")]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UserRequest {
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CurrentContext {
    pub symptom: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    pub chat_history: Vec<HistoryEntry>,
    pub current_context: CurrentContext,
}

impl From<TurnOutcome> for ChatResponse {
    fn from(outcome: TurnOutcome) -> Self {
        Self {
            response: outcome.response,
            chat_history: outcome.chat_history,
            current_context: CurrentContext {
                symptom: outcome.current_symptom,
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub chat_history: Vec<HistoryEntry>,
    pub current_context: CurrentContext,
}

impl From<SessionSnapshot> for HistoryResponse {
    fn from(snapshot: SessionSnapshot) -> Self {
        Self {
            chat_history: snapshot.chat_history,
            current_context: CurrentContext {
                symptom: snapshot.current_symptom,
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub filename: String,
    pub summary: String,
    pub source_text: String,
}
