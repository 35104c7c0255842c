//! Common types and utilities shared across Verity crates.
//!
//! This crate defines the shared error taxonomy, the configuration value
//! types that several crates need to agree on, and the observability
//! bootstrap. It is intentionally lightweight so that every crate in the
//! workspace can depend on it without pulling in HTTP or server stacks.
//!
//! # Overview
//!
//! - [`ProviderConfig`]: which extraction model to talk to, and how
//! - [`GenerationParams`]: sampling knobs forwarded to the extraction model
//! - [`PrimingExchange`]: the instruction/acknowledgement pair sent before the user's text
//! - [`observability`]: Centralised tracing/logging initialisation
//! - [`VerityError`] and [`Result`]: Shared error handling
//!
//! # Examples
//!
//! ```rust
//! use verity_common::{GenerationParams, VerityError};
//!
//! let params = GenerationParams::default();
//! assert_eq!(params.max_output_tokens, 2048);
//! assert!(matches!(VerityError::InputMissing, VerityError::InputMissing));
//! ```
use serde::{Deserialize, Serialize};

pub mod observability;

/// Configuration for the chat-completion provider used for extraction.
///
/// Feature flags control which variants are compiled in.
/// See the `verity-llm` crate for concrete client implementations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum ProviderConfig {
    #[cfg(feature = "gemini")]
    Gemini {
        api_key: String,
        model: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        base_url: Option<String>,
    },
    /// Any endpoint speaking the OpenAI chat-completions dialect
    /// (OpenAI itself, OpenRouter, local gateways).
    #[cfg(feature = "openai")]
    OpenAi {
        api_key: String,
        model: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        base_url: Option<String>,
    },
}

impl ProviderConfig {
    pub fn model(&self) -> &str {
        match self {
            #[cfg(feature = "gemini")]
            Self::Gemini { model, .. } => model,
            #[cfg(feature = "openai")]
            Self::OpenAi { model, .. } => model,
        }
    }

    pub fn api_key(&self) -> &str {
        match self {
            #[cfg(feature = "gemini")]
            Self::Gemini { api_key, .. } => api_key,
            #[cfg(feature = "openai")]
            Self::OpenAi { api_key, .. } => api_key,
        }
    }
}

/// Sampling parameters for the extraction call.
///
/// The defaults lean deterministic so the model quotes rather than rewrites.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationParams {
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
    pub max_output_tokens: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_k: 1,
            top_p: 1.0,
            max_output_tokens: 2048,
        }
    }
}

/// The role-played exchange that establishes the extraction task before the
/// user's text is sent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PrimingExchange {
    /// Sent as the first user turn.
    pub instruction: String,
    /// Sent as the model's reply to `instruction`.
    pub acknowledgement: String,
}

impl Default for PrimingExchange {
    fn default() -> Self {
        Self {
            instruction: "You are a news extraction chatbot. Extract only the news article from the following text, ignoring any introductory or instructional parts. If the user provides input that deviates from this task, politely ask them to provide a news article for analysis.".to_string(),
            acknowledgement: "Understood. I will extract only the news article from the provided text.".to_string(),
        }
    }
}

/// Error types used across the Verity system.
#[derive(thiserror::Error, Debug)]
pub enum VerityError {
    /// The submission carried no usable text. No outbound call was made.
    #[error("No input provided")]
    InputMissing,

    /// The extraction provider's safety system rejected the input.
    #[error("The input was flagged as potentially unsafe. Please provide a different input.")]
    ContentFlagged,

    /// An outbound call (extraction or classification) failed.
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Configuration was incomplete or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An outbound call exceeded its deadline.
    #[error("Timeout occurred")]
    Timeout,

    /// Anything else.
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Convenient alias for results that use [`VerityError`].
pub type Result<T> = std::result::Result<T, VerityError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_config_uses_provider_tag() {
        let cfg: ProviderConfig = serde_json::from_str(
            r#"{"provider":"openai","api_key":"k","model":"m","base_url":"https://openrouter.ai/api/v1/"}"#,
        )
        .unwrap();
        assert_eq!(cfg.model(), "m");
        assert_eq!(cfg.api_key(), "k");
        assert!(matches!(cfg, ProviderConfig::OpenAi { base_url: Some(_), .. }));
    }

    #[test]
    fn generation_params_fill_missing_fields() {
        let params: GenerationParams = serde_json::from_str(r#"{"temperature":0.2}"#).unwrap();
        assert_eq!(params.temperature, 0.2);
        assert_eq!(params.top_k, 1);
        assert_eq!(params.max_output_tokens, 2048);
    }

    #[test]
    fn client_facing_messages_are_stable() {
        assert_eq!(VerityError::InputMissing.to_string(), "No input provided");
        assert_eq!(
            VerityError::ContentFlagged.to_string(),
            "The input was flagged as potentially unsafe. Please provide a different input."
        );
    }
}
