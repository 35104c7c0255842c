use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use verity_common::{GenerationParams, PrimingExchange, Result};

/// Placeholder text a provider returns when the model produced nothing usable.
pub const NO_SCRIPT_GENERATED: &str = "No script generated";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// One turn of conversation history sent ahead of the user's prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub text: String,
}

impl ChatTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
        }
    }
}

/// Build the two-turn priming history: the instruction as a user turn and
/// the acknowledgement as the model's reply.
pub fn priming_history(exchange: &PrimingExchange) -> Vec<ChatTurn> {
    vec![
        ChatTurn::user(exchange.instruction.clone()),
        ChatTurn::model(exchange.acknowledgement.clone()),
    ]
}

/// What the extraction model handed back for one prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// Generated text, trimmed of surrounding whitespace.
    pub text: String,
    /// The provider's own safety system blocked the prompt or the answer.
    pub flagged: bool,
    pub model: Option<String>,
    pub tokens_used: Option<u32>,
}

impl ExtractionResult {
    pub fn from_text(text: impl AsRef<str>) -> Self {
        Self {
            text: text.as_ref().trim().to_string(),
            flagged: false,
            model: None,
            tokens_used: None,
        }
    }

    pub fn flagged() -> Self {
        Self {
            text: String::new(),
            flagged: true,
            model: None,
            tokens_used: None,
        }
    }
}

/// A chat-completion backend able to continue a conversation.
///
/// Implementations must not retry; a failed call is reported as an error
/// and the caller decides what to do with it.
#[async_trait]
pub trait ExtractionProvider: Send + Sync {
    /// Send `history` followed by `prompt` as the next user turn and return
    /// the model's reply.
    async fn complete(
        &self,
        history: &[ChatTurn],
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<ExtractionResult>;

    /// Get the model name being used
    fn model_name(&self) -> &str;

    /// Short provider identifier for logs.
    fn provider_name(&self) -> &'static str;
}
