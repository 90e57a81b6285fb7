//! LLM Provider Strategy Pattern
//!
//! The reasoning controllers treat the language model as a black box: messages
//! in, text plus token/cost metadata out. Concrete backends (Ollama, OpenAI,
//! Anthropic, ...) live outside this crate and implement [`LlmProvider`].
//!
//! ## Usage
//!
//! ```rust,ignore
//! use reasoning_core::provider::{GenerationOptions, LlmProvider};
//!
//! let completion = provider
//!     .complete(&[Message::user(prompt)], &GenerationOptions::default())
//!     .await?;
//! ```
//!
//! Retries belong to the provider implementation; the engine calls once.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::message::Message;

/// Configuration for LLM generation
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationOptions {
    /// Model identifier (e.g., "llama3.2", "gpt-4", "claude-3-sonnet")
    pub model: String,

    /// Temperature for sampling (0.0 = deterministic, 1.0 = creative)
    pub temperature: f32,

    /// Maximum tokens to generate
    pub max_tokens: u32,

    /// Top-p nucleus sampling
    pub top_p: f32,

    /// Stop sequences
    pub stop_sequences: Vec<String>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            model: "llama3.2".into(),
            temperature: 0.0,
            max_tokens: 2048,
            top_p: 0.9,
            stop_sequences: Vec::new(),
        }
    }
}

impl GenerationOptions {
    /// Copy of these options with the given stop sequences
    pub fn with_stop(&self, stop: &[&str]) -> Self {
        Self {
            stop_sequences: stop.iter().map(|s| (*s).to_string()).collect(),
            ..self.clone()
        }
    }
}

/// Response from an LLM completion
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Completion {
    /// The generated text
    pub content: String,

    /// Model that generated this response
    pub model: String,

    /// Token usage statistics (if available)
    pub usage: Option<TokenUsage>,

    /// Monetary cost of the call, 0.0 when the provider does not price calls
    #[serde(default)]
    pub cost: f64,
}

impl Completion {
    /// Plain completion without usage metadata
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    /// Total tokens spent, 0 when unknown
    pub fn total_tokens(&self) -> u64 {
        self.usage.as_ref().map_or(0, |u| u64::from(u.total_tokens))
    }
}

/// Token usage statistics
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }
}

/// Strategy trait for LLM providers
///
/// Implement this trait to plug a backend into the reasoning controllers.
/// The engine works exclusively through this interface.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate a completion from messages.
    ///
    /// Providers must honour `options.stop_sequences`; the ReAct loop relies
    /// on generation halting before `"Observation:"`.
    async fn complete(&self, messages: &[Message], options: &GenerationOptions)
    -> Result<Completion>;

    /// Estimate token count for text (provider-specific tokenization).
    ///
    /// Observation trimming counts tokens with this.
    fn estimate_tokens(&self, text: &str) -> u32 {
        crate::trim::estimate_tokens(text)
    }
}

/// Running cost/token totals for one run
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Usage {
    pub cost: f64,
    pub tokens: u64,
}

impl Usage {
    pub fn new(cost: f64, tokens: u64) -> Self {
        Self { cost, tokens }
    }

    /// Fold another amount into this one
    pub fn add(&mut self, other: Self) {
        self.cost += other.cost;
        self.tokens = self.tokens.saturating_add(other.tokens);
    }
}

impl From<&Completion> for Usage {
    fn from(completion: &Completion) -> Self {
        Self::new(completion.cost, completion.total_tokens())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_options_defaults() {
        let opts = GenerationOptions::default();
        assert_eq!(opts.max_tokens, 2048);
        assert_eq!(opts.model, "llama3.2");
        assert!(opts.stop_sequences.is_empty());
    }

    #[test]
    fn test_with_stop_keeps_other_fields() {
        let opts = GenerationOptions {
            model: "gpt-4".into(),
            ..Default::default()
        };
        let stopped = opts.with_stop(&["Observation:"]);
        assert_eq!(stopped.model, "gpt-4");
        assert_eq!(stopped.stop_sequences, vec!["Observation:".to_string()]);
    }

    #[test]
    fn test_usage_sums_completions() {
        let a = Completion {
            usage: Some(TokenUsage::new(10, 5)),
            cost: 0.5,
            ..Completion::text("a")
        };
        let b = Completion::text("b");
        let mut total = Usage::from(&a);
        total.add(Usage::from(&b));
        assert_eq!(total.tokens, 15);
        assert!((total.cost - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_token_usage_saturates() {
        let usage = TokenUsage::new(u32::MAX, 10);
        assert_eq!(usage.total_tokens, u32::MAX);
    }
}
