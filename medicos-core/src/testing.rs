//! In-process doubles for the remote capabilities, used by tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;

use crate::extract::{OcrEngine, PageImage};
use crate::gateway::{CompletionBackend, ModelTurn};

/// A prompt as seen by [`ScriptedBackend`].
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub history: Vec<ModelTurn>,
    pub prompt: String,
}

/// Completion backend that replays queued replies and records every call.
///
/// When the queue is empty it echoes the prompt back as `echo: <prompt>`.
#[derive(Default)]
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<Result<String, String>>>,
    calls: Mutex<Vec<RecordedCall>>,
    delay: Option<Duration>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push_reply(&self, reply: impl Into<String>) {
        self.replies.lock().unwrap().push_back(Ok(reply.into()));
    }

    pub fn push_error(&self, message: impl Into<String>) {
        self.replies.lock().unwrap().push_back(Err(message.into()));
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    async fn complete(&self, history: &[ModelTurn], prompt: &str) -> anyhow::Result<String> {
        self.calls.lock().unwrap().push(RecordedCall {
            history: history.to_vec(),
            prompt: prompt.to_string(),
        });

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.replies.lock().unwrap().pop_front();
        match next {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Ok(format!("echo: {prompt}")),
        }
    }
}

/// OCR engine returning fixed text, or failing when built with [`StubOcr::failing`].
pub struct StubOcr {
    text: Result<String, String>,
    pages_seen: Mutex<Vec<usize>>,
}

impl StubOcr {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: Ok(text.into()),
            pages_seen: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            text: Err(message.into()),
            pages_seen: Mutex::new(Vec::new()),
        }
    }

    /// Number of pages passed on each call.
    pub fn pages_seen(&self) -> Vec<usize> {
        self.pages_seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl OcrEngine for StubOcr {
    async fn recognize(&self, pages: &[PageImage]) -> anyhow::Result<String> {
        self.pages_seen.lock().unwrap().push(pages.len());
        self.text.clone().map_err(|message| anyhow!(message))
    }
}
