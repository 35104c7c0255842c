use crate::{http_to_verity, with_trailing_slash};
use crate::traits::{ChatTurn, ExtractionProvider, ExtractionResult, Role, NO_SCRIPT_GENERATED};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use verity_common::{GenerationParams, Result, VerityError};
use verity_http::{Auth, HttpClient, RequestOpts};

pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1/";

/// Client for any endpoint speaking the OpenAI chat-completions dialect.
///
/// Point `base_url` at OpenRouter (`https://openrouter.ai/api/v1/`) or a
/// local gateway to use other hosted models.
pub struct OpenAiCompatProvider {
    client: HttpClient,
    api_key: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    top_p: f32,
    max_tokens: u32,
    n: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatChoiceMessage>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    total_tokens: Option<u32>,
}

impl OpenAiCompatProvider {
    /// Create a new client for the given API key and model.
    pub fn new(api_key: String, model: String, base_url: Option<&str>) -> Result<Self> {
        let base = with_trailing_slash(base_url.unwrap_or(OPENAI_API_BASE));
        let client = HttpClient::new(&base)
            .map_err(|e| VerityError::Config(format!("OpenAI base URL rejected: {e}")))?;

        Ok(Self {
            client,
            api_key,
            model,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = self.client.with_timeout(timeout);
        self
    }
}

fn wire_role(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Model => "assistant",
    }
}

#[async_trait]
impl ExtractionProvider for OpenAiCompatProvider {
    async fn complete(
        &self,
        history: &[ChatTurn],
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<ExtractionResult> {
        let mut messages: Vec<ChatMessage<'_>> = history
            .iter()
            .map(|turn| ChatMessage {
                role: wire_role(turn.role),
                content: &turn.text,
            })
            .collect();
        messages.push(ChatMessage {
            role: "user",
            content: prompt,
        });

        let req = ChatCompletionRequest {
            model: &self.model,
            messages,
            temperature: params.temperature,
            top_p: params.top_p,
            max_tokens: params.max_output_tokens,
            n: 1,
        };

        tracing::debug!(model = %self.model, turns = req.messages.len(), "openai.chat_completion");

        let resp: ChatCompletionResponse = self
            .client
            .post_json(
                "chat/completions",
                &req,
                RequestOpts {
                    auth: Some(Auth::Bearer(&self.api_key)),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| http_to_verity("openai", e))?;

        let model = resp.model.or_else(|| Some(self.model.clone()));
        let tokens_used = resp.usage.and_then(|u| u.total_tokens);
        let first = resp.choices.into_iter().next();

        if first
            .as_ref()
            .and_then(|c| c.finish_reason.as_deref())
            .is_some_and(|r| r == "content_filter")
        {
            tracing::warn!("openai.content_filter");
            return Ok(ExtractionResult {
                model,
                tokens_used,
                ..ExtractionResult::flagged()
            });
        }

        let text = first
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| NO_SCRIPT_GENERATED.to_string());

        Ok(ExtractionResult {
            model,
            tokens_used,
            ..ExtractionResult::from_text(text)
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }
}
