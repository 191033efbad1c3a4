//! Completion backend on top of rig's OpenRouter provider.

use async_trait::async_trait;
use medicos_core::{CompletionBackend, ModelRole, ModelTurn};
use rig::{
    agent::Agent,
    client::CompletionClient,
    completion::{Chat, Message},
    providers::openrouter,
};
use tracing::debug;

const HEALTH_ASSISTANT_PREAMBLE: &str = "You are a friendly health assistant. \
Give clear, general health information in plain language. \
You do not diagnose conditions; recommend consulting a doctor when symptoms are severe or persistent.";

const TEMPERATURE: f64 = 1.0;
const MAX_OUTPUT_TOKENS: u64 = 8192;

pub struct OpenRouterBackend {
    agent: Agent<openrouter::CompletionModel>,
    model: String,
}

impl OpenRouterBackend {
    pub fn new(api_key: &str, model: &str) -> Self {
        let client = openrouter::Client::new(api_key);
        let agent = client
            .agent(model)
            .preamble(HEALTH_ASSISTANT_PREAMBLE)
            .temperature(TEMPERATURE)
            .max_tokens(MAX_OUTPUT_TOKENS)
            .build();

        Self {
            agent,
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl CompletionBackend for OpenRouterBackend {
    async fn complete(&self, history: &[ModelTurn], prompt: &str) -> anyhow::Result<String> {
        debug!(model = %self.model, history_len = history.len(), "Calling OpenRouter");
        let reply = self
            .agent
            .chat(Message::user(prompt), to_rig_messages(history))
            .await?;
        Ok(reply)
    }
}

pub fn to_rig_message(turn: &ModelTurn) -> Message {
    match turn.role {
        ModelRole::User => Message::user(turn.content.clone()),
        ModelRole::Assistant => Message::assistant(turn.content.clone()),
    }
}

pub fn to_rig_messages(turns: &[ModelTurn]) -> Vec<Message> {
    turns.iter().map(to_rig_message).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_transcript_in_order() {
        let turns = vec![
            ModelTurn::user("I feel dizzy"),
            ModelTurn::assistant("Sit down and drink water."),
            ModelTurn::user("Thanks"),
        ];

        let messages = to_rig_messages(&turns);
        assert_eq!(messages.len(), 3);
        assert!(matches!(messages[0], Message::User { .. }));
        assert!(matches!(messages[1], Message::Assistant { .. }));
        assert!(matches!(messages[2], Message::User { .. }));
    }
}
