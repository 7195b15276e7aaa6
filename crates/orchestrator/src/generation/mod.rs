//! Generation service seam
//!
//! The generation service turns a prompt into text. It has no retries of its
//! own; callers classify its failures and retry through the executor.

mod openrouter;

pub use openrouter::{ChatMessage, OpenRouterClient, Role};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::failure::AgentFailure;

#[derive(Debug, Clone, PartialEq)]
pub struct GenerateOptions {
    pub system_prompt: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl GenerateOptions {
    pub fn new() -> Self {
        Self {
            system_prompt: None,
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenerationError {
    #[error("Generation request failed: {message}")]
    Request {
        message: String,
        status_code: Option<u16>,
    },

    #[error("Generation timed out after {0}ms")]
    Timeout(u64),

    #[error("Generation returned no content")]
    Empty,
}

impl GenerationError {
    pub fn request(message: impl Into<String>, status_code: Option<u16>) -> Self {
        Self::Request {
            message: message.into(),
            status_code,
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Request { status_code, .. } => *status_code,
            _ => None,
        }
    }
}

impl From<GenerationError> for AgentFailure {
    fn from(err: GenerationError) -> Self {
        match err {
            GenerationError::Timeout(ms) => AgentFailure::timeout(ms),
            GenerationError::Request {
                message,
                status_code,
            } => {
                let failure = AgentFailure::new(message);
                match status_code {
                    Some(code) => failure.with_status(code),
                    None => failure,
                }
            }
            GenerationError::Empty => AgentFailure::new("Generation returned no content"),
        }
    }
}

#[async_trait]
pub trait GenerationService: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        options: &GenerateOptions,
    ) -> Result<String, GenerationError>;
}

/// Applies a bounded wait to every call of the wrapped service. An elapsed
/// wait surfaces as [`GenerationError::Timeout`].
pub struct BoundedGenerator {
    inner: Arc<dyn GenerationService>,
    timeout: Duration,
}

impl BoundedGenerator {
    pub fn new(inner: Arc<dyn GenerationService>, timeout_ms: u64) -> Self {
        Self {
            inner,
            timeout: Duration::from_millis(timeout_ms),
        }
    }
}

#[async_trait]
impl GenerationService for BoundedGenerator {
    async fn generate(
        &self,
        prompt: &str,
        options: &GenerateOptions,
    ) -> Result<String, GenerationError> {
        match tokio::time::timeout(self.timeout, self.inner.generate(prompt, options)).await {
            Ok(result) => result,
            Err(_) => Err(GenerationError::Timeout(self.timeout.as_millis() as u64)),
        }
    }
}
