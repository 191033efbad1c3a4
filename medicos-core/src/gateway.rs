//! Wrapper around the remote generative model.
//!
//! The backend itself is opaque: it receives the transcript of earlier model
//! exchanges plus a new prompt and returns free text. [`ModelGateway`] adds
//! what every caller needs on top of that: a bounded timeout, trimming, the
//! fallback string for empty answers, and the optional response simplifier.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::GatewayError;

/// Returned in place of an empty or whitespace-only model answer.
pub const FALLBACK_REPLY: &str = "Sorry, I couldn't understand that.";

/// Number of lines kept by [`simplify_response`].
pub const SIMPLIFIED_LINE_COUNT: usize = 3;

pub const DEFAULT_MODEL_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelRole {
    User,
    Assistant,
}

/// One message of the model-side transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelTurn {
    pub role: ModelRole,
    pub content: String,
}

impl ModelTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ModelRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ModelRole::Assistant,
            content: content.into(),
        }
    }
}

/// History-bearing handle to a conversation with the model.
///
/// Only exchanges that actually reached the model are recorded here; canned
/// replies from the rule table never do.
#[derive(Debug, Clone)]
pub struct ChatHandle {
    id: Uuid,
    transcript: Vec<ModelTurn>,
}

impl ChatHandle {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            transcript: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn transcript(&self) -> &[ModelTurn] {
        &self.transcript
    }
}

/// The remote capability: send a message with prior context, receive text.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, history: &[ModelTurn], prompt: &str) -> anyhow::Result<String>;
}

#[derive(Debug, Clone)]
pub struct GatewayOptions {
    pub timeout: Duration,
    pub simplify: bool,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_MODEL_TIMEOUT,
            simplify: false,
        }
    }
}

#[derive(Clone)]
pub struct ModelGateway {
    backend: Arc<dyn CompletionBackend>,
    options: GatewayOptions,
}

impl ModelGateway {
    pub fn new(backend: Arc<dyn CompletionBackend>, options: GatewayOptions) -> Self {
        Self { backend, options }
    }

    /// Starts an empty conversation with the model.
    pub fn create_session(&self) -> ChatHandle {
        ChatHandle::new()
    }

    /// Sends `prompt` within the context of `handle`.
    ///
    /// On success the prompt and the raw answer are appended to the handle's
    /// transcript; on failure the handle is left untouched. If the returned
    /// future is dropped before completion the handle is also untouched.
    pub async fn send(&self, handle: &mut ChatHandle, prompt: &str) -> Result<String, GatewayError> {
        debug!(chat_id = %handle.id, prompt_len = prompt.len(), "Sending prompt to model");

        let call = self.backend.complete(&handle.transcript, prompt);
        let raw = match tokio::time::timeout(self.options.timeout, call).await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                warn!(chat_id = %handle.id, error = %e, "Model request failed");
                return Err(GatewayError::request(e.to_string()));
            }
            Err(_) => {
                warn!(chat_id = %handle.id, timeout = ?self.options.timeout, "Model request timed out");
                return Err(GatewayError::timeout(self.options.timeout));
            }
        };

        let reply = raw.trim();
        handle.transcript.push(ModelTurn::user(prompt));
        handle.transcript.push(ModelTurn::assistant(reply));

        if reply.is_empty() {
            debug!(chat_id = %handle.id, "Model returned no usable text");
            return Ok(FALLBACK_REPLY.to_string());
        }

        if self.options.simplify {
            Ok(simplify_response(reply))
        } else {
            Ok(reply.to_string())
        }
    }

    /// One-shot call on a fresh conversation.
    pub async fn send_once(&self, prompt: &str) -> Result<String, GatewayError> {
        let mut handle = self.create_session();
        self.send(&mut handle, prompt).await
    }
}

/// Keeps only the first [`SIMPLIFIED_LINE_COUNT`] lines of a response.
pub fn simplify_response(text: &str) -> String {
    let lines: Vec<&str> = text.split('\n').collect();
    if lines.len() > SIMPLIFIED_LINE_COUNT {
        lines[..SIMPLIFIED_LINE_COUNT].join("\n")
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedBackend;

    fn gateway(backend: Arc<ScriptedBackend>, options: GatewayOptions) -> ModelGateway {
        ModelGateway::new(backend, options)
    }

    #[test]
    fn simplifier_keeps_three_lines() {
        assert_eq!(simplify_response("a\nb\nc\nd\ne"), "a\nb\nc");
        assert_eq!(simplify_response("a\nb\nc"), "a\nb\nc");
        assert_eq!(simplify_response("single"), "single");
    }

    #[tokio::test]
    async fn send_trims_and_records_transcript() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_reply("  Drink water.\n ");
        let gateway = gateway(backend.clone(), GatewayOptions::default());

        let mut handle = gateway.create_session();
        let reply = gateway.send(&mut handle, "I feel thirsty").await.unwrap();

        assert_eq!(reply, "Drink water.");
        assert_eq!(
            handle.transcript(),
            &[ModelTurn::user("I feel thirsty"), ModelTurn::assistant("Drink water.")]
        );
    }

    #[tokio::test]
    async fn backend_sees_prior_exchanges() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_reply("first");
        backend.push_reply("second");
        let gateway = gateway(backend.clone(), GatewayOptions::default());

        let mut handle = gateway.create_session();
        gateway.send(&mut handle, "one").await.unwrap();
        gateway.send(&mut handle, "two").await.unwrap();

        let calls = backend.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].history.is_empty());
        assert_eq!(calls[1].history.len(), 2);
        assert_eq!(calls[1].prompt, "two");
    }

    #[tokio::test]
    async fn whitespace_reply_becomes_fallback() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_reply(" \n\t ");
        let gateway = gateway(backend, GatewayOptions::default());

        let reply = gateway.send_once("hello").await.unwrap();
        assert_eq!(reply, FALLBACK_REPLY);
    }

    #[tokio::test]
    async fn failure_is_uniform_and_leaves_transcript_untouched() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_error("quota exceeded");
        let gateway = gateway(backend, GatewayOptions::default());

        let mut handle = gateway.create_session();
        let err = gateway.send(&mut handle, "hello").await.unwrap_err();

        assert!(!err.is_timeout());
        assert!(err.to_string().contains("quota exceeded"));
        assert!(handle.transcript().is_empty());
    }

    #[tokio::test]
    async fn slow_backend_times_out() {
        let backend = Arc::new(ScriptedBackend::new().with_delay(Duration::from_secs(5)));
        backend.push_reply("too late");
        let gateway = gateway(
            backend,
            GatewayOptions {
                timeout: Duration::from_millis(50),
                simplify: false,
            },
        );

        let err = gateway.send_once("hello").await.unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn simplifier_applies_when_enabled() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_reply("1\n2\n3\n4\n5");
        let gateway = gateway(
            backend,
            GatewayOptions {
                simplify: true,
                ..GatewayOptions::default()
            },
        );

        assert_eq!(gateway.send_once("list").await.unwrap(), "1\n2\n3");
    }
}
