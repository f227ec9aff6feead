pub mod extract;
pub mod gemini;

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use extract::extract_json;
pub use gemini::GeminiProvider;

#[derive(Debug, Error)]
pub enum ProviderError {
    /// Quota exhausted. Distinguishable so callers can switch to a fallback
    /// path instead of failing hard.
    #[error("provider rate limited: {0}")]
    RateLimited(String),
    #[error("provider api error ({status}): {message}")]
    Api {
        status: u16,
        message: String,
        retryable: bool,
    },
    /// Expected embedded JSON was missing or unparseable. Never repaired.
    #[error("malformed provider output: {0}")]
    MalformedOutput(String),
    #[error("provider network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("provider returned no candidates")]
    EmptyResponse,
}

impl ProviderError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ProviderError::RateLimited(_))
    }
}

pub type Result<T> = std::result::Result<T, ProviderError>;

/// Sampling options passed through to the model.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct GenerationOptions {
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_output_tokens: Option<u32>,
    #[serde(default)]
    pub top_p: Option<f32>,
    #[serde(default)]
    pub top_k: Option<u32>,
}

/// Inline binary payload (e.g. an uploaded reference script) with its mime type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InlinePayload {
    pub mime_type: String,
    /// Base64-encoded bytes.
    pub data: String,
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub system: Option<String>,
    pub options: GenerationOptions,
    pub inline_data: Option<InlinePayload>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system: None,
            options: GenerationOptions::default(),
            inline_data: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_inline_data(mut self, mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        self.inline_data = Some(InlinePayload {
            mime_type: mime_type.into(),
            data: data.into(),
        });
        self
    }
}

#[derive(Debug, Clone)]
pub struct GeneratedText {
    pub text: String,
    pub input_tokens: Option<u32>,
    pub output_tokens: Option<u32>,
}

impl GeneratedText {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            input_tokens: None,
            output_tokens: None,
        }
    }
}

/// A remote generative text model. Non-deterministic, rate-limited, fallible.
#[async_trait]
pub trait TextProvider: Send + Sync {
    async fn generate(&self, request: GenerationRequest) -> Result<GeneratedText>;
}

/// Scripted provider for tests: pops queued outcomes in order, and records
/// every request it receives. With an empty queue it echoes the prompt.
#[derive(Default)]
pub struct StubProvider {
    script: Mutex<VecDeque<Result<GeneratedText>>>,
    calls: Mutex<Vec<GenerationRequest>>,
}

impl StubProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_text(&self, text: impl Into<String>) {
        self.script
            .lock()
            .expect("stub script lock")
            .push_back(Ok(GeneratedText::plain(text)));
    }

    pub fn push_error(&self, error: ProviderError) {
        self.script
            .lock()
            .expect("stub script lock")
            .push_back(Err(error));
    }

    pub fn calls(&self) -> Vec<GenerationRequest> {
        self.calls.lock().expect("stub calls lock").clone()
    }
}

#[async_trait]
impl TextProvider for StubProvider {
    async fn generate(&self, request: GenerationRequest) -> Result<GeneratedText> {
        self.calls
            .lock()
            .expect("stub calls lock")
            .push(request.clone());
        let scripted = self.script.lock().expect("stub script lock").pop_front();
        match scripted {
            Some(outcome) => outcome,
            None => Ok(GeneratedText::plain(format!("[stub] {}", request.prompt))),
        }
    }
}
