use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use tuner_core::api::{
    check_parameter, AiConfig, AiSearch, BusinessContext, Method, ParamMap, SearchError,
    SearchOutput, SearchRequest,
};

use super::prompt::{user_prompt, SYSTEM_PROMPT};

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// The JSON object the model is asked to answer with.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Suggestion {
    #[serde(default)]
    parameters: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    reasoning: Option<String>,
    #[serde(default)]
    factors: Vec<String>,
    #[serde(default, alias = "expected_accuracy")]
    expected_accuracy: Option<f64>,
}

/// AI parameter search over an OpenAI-compatible chat-completions endpoint.
pub struct ChatCompletionsAiSearch {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl ChatCompletionsAiSearch {
    pub fn new(cfg: &AiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()?;
        Ok(Self {
            client,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key: cfg.api_key.clone(),
            model: cfg.model.clone(),
            temperature: cfg.temperature,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    async fn complete(&self, user: String) -> Result<String, SearchError> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system".into(),
                    content: SYSTEM_PROMPT.into(),
                },
                ChatMessage {
                    role: "user".into(),
                    content: user,
                },
            ],
            temperature: self.temperature,
        };

        let resp = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(map_transport)?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(map_status(status, &text));
        }

        let parsed: ChatResponse = resp
            .json()
            .await
            .map_err(|e| SearchError::Malformed(e.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| SearchError::Malformed("response has no choices".into()))
    }
}

fn map_transport(e: reqwest::Error) -> SearchError {
    if e.is_timeout() {
        SearchError::Timeout
    } else {
        SearchError::Transport(e.into())
    }
}

fn map_status(status: StatusCode, body: &str) -> SearchError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => SearchError::Unauthorized,
        StatusCode::TOO_MANY_REQUESTS => SearchError::RateLimited,
        _ => SearchError::HttpStatus {
            status: status.as_u16(),
            body_snippet: body.chars().take(200).collect(),
        },
    }
}

/// Pulls the first `{ ... }` block out of a reply that may be wrapped in
/// prose or a code fence.
fn json_object(content: &str) -> Option<&str> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    (end > start).then(|| &content[start..=end])
}

/// Keeps only in-range numeric values for parameters the model actually has.
fn accepted_parameters(
    raw: serde_json::Map<String, serde_json::Value>,
    known: &ParamMap,
) -> ParamMap {
    raw.into_iter()
        .filter(|(k, _)| known.contains_key(k))
        .filter_map(|(k, v)| {
            let f = v.as_f64()?;
            match check_parameter(&k, f) {
                Ok(()) => Some((k, f)),
                Err(reason) => {
                    tracing::debug!(target: "tuner.ai", param = %k, %reason, "dropping suggested parameter");
                    None
                }
            }
        })
        .collect()
}

#[async_trait]
impl AiSearch for ChatCompletionsAiSearch {
    fn name(&self) -> &str {
        "chat_completions"
    }

    async fn run(
        &self,
        req: SearchRequest<'_>,
        context: &BusinessContext,
    ) -> Result<Option<SearchOutput>, SearchError> {
        if self.api_key.is_empty() {
            return Err(SearchError::Disabled);
        }
        if req.series.is_empty() {
            return Err(SearchError::EmptySeries);
        }

        let content = self.complete(user_prompt(&req, context)).await?;
        let Some(raw) = json_object(&content) else {
            tracing::debug!(target: "tuner.ai", model = %req.model.id, "reply without a json object");
            return Ok(None);
        };
        let suggestion: Suggestion =
            serde_json::from_str(raw).map_err(|e| SearchError::Malformed(e.to_string()))?;

        let mut parameters = accepted_parameters(suggestion.parameters, &req.model.parameters);
        if parameters.is_empty() && !req.model.parameters.is_empty() {
            return Ok(None);
        }
        // Fill keys the model left out so the record is a complete set.
        for (k, v) in &req.model.parameters {
            parameters.entry(k.clone()).or_insert(*v);
        }

        tracing::debug!(
            target: "tuner.ai",
            sku = %req.sku,
            model = %req.model.id,
            confidence = suggestion.confidence.unwrap_or_default(),
            "ai suggestion accepted"
        );
        Ok(Some(SearchOutput {
            parameters,
            confidence: suggestion.confidence,
            reasoning: suggestion.reasoning,
            factors: suggestion.factors,
            expected_accuracy: suggestion.expected_accuracy,
            method: Method::Ai,
        }))
    }
}
