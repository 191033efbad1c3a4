//! Per-turn dialogue logic.
//!
//! Each turn runs the symptom matcher first. A match sets the active symptom
//! and returns the canned reply. Without a match, a message asking about
//! treatment while a symptom is active gets the canned treatment text (or an
//! augmented model prompt when the rule has none). Everything else goes to
//! the model unchanged and leaves the active symptom as it was.

use std::sync::Arc;

use tracing::{info, warn};

use crate::gateway::ModelGateway;
use crate::rules::SymptomRules;
use crate::session::{ConversationState, HistoryEntry, Role, SessionStore};

/// Case-insensitive marker for a follow-up about treatment.
pub const TREATMENT_MARKER: &str = "treatment";

pub fn treatment_prompt(symptom: &str, user_input: &str) -> String {
    format!(
        "The user previously mentioned having {symptom} and is asking about treatment. Please provide appropriate medical advice.\n{user_input}"
    )
}

/// Which path produced the reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnRoute {
    SymptomMatch,
    CannedTreatment,
    ModelTreatment,
    Model,
}

/// Result of one turn, captured under the user's lock.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub response: String,
    pub role: Role,
    pub route: TurnRoute,
    pub chat_history: Vec<HistoryEntry>,
    pub current_symptom: Option<String>,
}

#[derive(Clone)]
pub struct Dispatcher {
    rules: Arc<SymptomRules>,
    sessions: Arc<SessionStore>,
    gateway: Arc<ModelGateway>,
}

impl Dispatcher {
    pub fn new(
        rules: Arc<SymptomRules>,
        sessions: Arc<SessionStore>,
        gateway: Arc<ModelGateway>,
    ) -> Self {
        Self {
            rules,
            sessions,
            gateway,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn rules(&self) -> &SymptomRules {
        &self.rules
    }

    /// Handles one user message and appends exactly two history entries.
    ///
    /// Model failures never escape: they become a `system` reply. History is
    /// only written once the reply is known, so dropping this future mid-call
    /// leaves the conversation unchanged.
    pub async fn handle_turn(&self, user_id: &str, user_input: &str) -> TurnOutcome {
        let shared = self.sessions.get_or_create(user_id, || {
            ConversationState::new(self.gateway.create_session())
        });
        let mut state = shared.lock().await;

        let (route, role, response) = self.respond(&mut state, user_input).await;
        state.record_turn(user_input, role, &response);

        info!(
            user_id = %user_id,
            chat_id = %state.chat.id(),
            route = ?route,
            symptom = ?state.current_symptom,
            history_len = state.history().len(),
            "Turn completed"
        );

        TurnOutcome {
            response,
            role,
            route,
            chat_history: state.history().to_vec(),
            current_symptom: state.current_symptom.clone(),
        }
    }

    async fn respond(
        &self,
        state: &mut ConversationState,
        user_input: &str,
    ) -> (TurnRoute, Role, String) {
        if let Some(entry) = self.rules.match_text(user_input) {
            state.current_symptom = Some(entry.keyword.clone());
            return (TurnRoute::SymptomMatch, Role::Bot, entry.initial_reply());
        }

        if let Some(symptom) = state.current_symptom.clone() {
            if user_input.to_lowercase().contains(TREATMENT_MARKER) {
                let canned = self
                    .rules
                    .get(&symptom)
                    .and_then(|entry| entry.treatment_response.clone());

                if let Some(treatment) = canned {
                    return (TurnRoute::CannedTreatment, Role::Bot, treatment);
                }

                let prompt = treatment_prompt(&symptom, user_input);
                let (role, text) = self.ask_model(state, &prompt).await;
                return (TurnRoute::ModelTreatment, role, text);
            }
        }

        let (role, text) = self.ask_model(state, user_input).await;
        (TurnRoute::Model, role, text)
    }

    async fn ask_model(&self, state: &mut ConversationState, prompt: &str) -> (Role, String) {
        match self.gateway.send(&mut state.chat, prompt).await {
            Ok(reply) => (Role::Bot, reply),
            Err(e) => {
                warn!(error = %e, "Model call failed, replying with system message");
                (Role::System, format!("Error: {e}"))
            }
        }
    }
}
