use crate::traits::{ChatTurn, ExtractionProvider, ExtractionResult, Role};
use crate::{http_to_verity, with_trailing_slash};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::time::Duration;
use verity_common::{GenerationParams, Result, VerityError};
use verity_http::{Auth, HttpClient, RequestOpts};

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/";

/// Finish reasons that mean the provider withheld the answer on policy grounds.
const BLOCKING_FINISH_REASONS: &[&str] = &["SAFETY", "BLOCKLIST", "PROHIBITED_CONTENT", "SPII"];

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent<'a> {
    role: &'static str,
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Debug, Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    temperature: f32,
    top_k: u32,
    top_p: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    prompt_feedback: Option<GeminiPromptFeedback>,
    usage_metadata: Option<GeminiUsageMetadata>,
    model_version: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiResponseContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponsePart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsageMetadata {
    total_token_count: Option<u32>,
}

fn wire_role(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Model => "model",
    }
}

/// Google Gemini `generateContent` client.
///
/// Requires a valid API key and internet access.
pub struct GeminiProvider {
    client: HttpClient,
    api_key: String,
    model: String,
}

impl GeminiProvider {
    /// Create a new client using the provided API key and model.
    ///
    /// `base_url` overrides the public endpoint (proxies, tests).
    pub fn new(api_key: String, model: String, base_url: Option<&str>) -> Result<Self> {
        let base = with_trailing_slash(base_url.unwrap_or(GEMINI_BASE_URL));
        let client = HttpClient::new(&base)
            .map_err(|e| VerityError::Config(format!("Gemini base URL rejected: {e}")))?;

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

#[async_trait]
impl ExtractionProvider for GeminiProvider {
    async fn complete(
        &self,
        history: &[ChatTurn],
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<ExtractionResult> {
        let mut contents: Vec<GeminiContent<'_>> = history
            .iter()
            .map(|turn| GeminiContent {
                role: wire_role(turn.role),
                parts: vec![GeminiPart { text: &turn.text }],
            })
            .collect();
        contents.push(GeminiContent {
            role: wire_role(Role::User),
            parts: vec![GeminiPart { text: prompt }],
        });

        let request = GeminiRequest {
            contents,
            generation_config: GeminiGenerationConfig {
                temperature: params.temperature,
                top_k: params.top_k,
                top_p: params.top_p,
                max_output_tokens: params.max_output_tokens,
            },
        };

        let path = format!("models/{}:generateContent", self.model);
        tracing::debug!(model = %self.model, turns = request.contents.len(), "gemini.generate");

        let resp: GeminiResponse = self
            .client
            .post_json(
                &path,
                &request,
                RequestOpts {
                    auth: Some(Auth::Query {
                        name: "key",
                        value: Cow::Borrowed(self.api_key.as_str()),
                    }),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| http_to_verity("gemini", e))?;

        let model = resp.model_version.or_else(|| Some(self.model.clone()));
        let tokens_used = resp.usage_metadata.and_then(|u| u.total_token_count);

        if let Some(reason) = resp.prompt_feedback.and_then(|f| f.block_reason) {
            tracing::warn!(%reason, "gemini.prompt_blocked");
            return Ok(ExtractionResult {
                model,
                tokens_used,
                ..ExtractionResult::flagged()
            });
        }

        // No candidate and no block reason reads as an empty reply.
        let Some(candidate) = resp.candidates.into_iter().next() else {
            tracing::debug!("gemini.no_candidates");
            return Ok(ExtractionResult {
                model,
                tokens_used,
                ..ExtractionResult::from_text("")
            });
        };

        if let Some(reason) = candidate
            .finish_reason
            .as_deref()
            .filter(|r| BLOCKING_FINISH_REASONS.contains(r))
        {
            tracing::warn!(%reason, "gemini.candidate_blocked");
            return Ok(ExtractionResult {
                model,
                tokens_used,
                ..ExtractionResult::flagged()
            });
        }

        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();

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
        "gemini"
    }
}
