//! C4: LLM client (spec §4.4).
//!
//! No teacher analogue — grounded in the pack's OpenAI-shaped clients
//! (e.g. `darval-multi-llm`, `Wandalen-api_llm`) for the "system prompt +
//! JSON-mode completion + typed parse" shape, built on the stack (`reqwest`,
//! `serde_json`) the teacher already depends on.

use crate::error::PredictionError;
use crate::graph::Graph;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

const SYSTEM_PROMPT: &str = r#"You turn a natural-language description of a software \
architecture into a JSON object matching this schema:
{
  "title": string,
  "footer": string,
  "with_legend": boolean,
  "containers": [{"id": string, "label": string, "technology": string,
    "description": string, "system": string, "is_user": boolean,
    "is_queue": boolean, "is_database": boolean, "is_external": boolean}],
  "relations": [{"from": string, "to": string, "direction": string,
    "label": string, "technology": string}]
}
Emit only the JSON object, no surrounding prose. `containers` must be
non-empty; every relation's `from`/`to` must name a container `id`."#;

/// A predicted [`Graph`] plus the provider bookkeeping spec §2/§4.6 step 7
/// needs to record a `ModelOutput` alongside it (model id, token usage, and
/// the raw completion text).
#[derive(Debug, Clone)]
pub struct Prediction {
    pub graph: Graph,
    pub model: String,
    pub raw_response: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

#[async_trait]
pub trait GraphPredictor: Send + Sync {
    /// `ctx` is a cancellation token threaded from the dispatcher's
    /// per-request context (spec §5); a cancelled token is expected to
    /// short-circuit the in-flight HTTP call rather than waiting it out.
    async fn predict(&self, ctx: &CancellationToken, prompt: &str) -> Result<Prediction, PredictionError>;
}

pub struct OpenAiGraphPredictor {
    client: reqwest::Client,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    base_url: String,
}

impl OpenAiGraphPredictor {
    pub fn new(api_key: String, model: String, max_tokens: u32, temperature: f32) -> Self {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .expect("llm http client");
        Self {
            client,
            api_key,
            model,
            max_tokens,
            temperature,
            base_url: "https://api.openai.com/v1".to_string(),
        }
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    response_format: serde_json::Value,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    model: String,
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Usage,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}

#[derive(Deserialize, Default)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[async_trait]
impl GraphPredictor for OpenAiGraphPredictor {
    async fn predict(&self, ctx: &CancellationToken, prompt: &str) -> Result<Prediction, PredictionError> {
        let request = ChatCompletionRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            response_format: json!({ "type": "json_object" }),
        };

        let send = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send();

        let resp = tokio::select! {
            result = send => result?,
            _ = ctx.cancelled() => {
                return Err(PredictionError::Provider("request cancelled".into()));
            }
        };

        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(PredictionError::Provider(body));
        }

        let body = resp.text().await?;
        let parsed: ChatCompletionResponse = serde_json::from_str(&body)?;
        let content = parsed
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .unwrap_or_default();

        let graph: Graph = serde_json::from_str(content)?;
        Ok(Prediction {
            graph,
            model: parsed.model,
            raw_response: content.to_string(),
            prompt_tokens: parsed.usage.prompt_tokens,
            completion_tokens: parsed.usage.completion_tokens,
        })
    }
}
