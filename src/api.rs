use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{ApiConfig, Config};
use crate::error::{CompanionError, Result};

/// Both the sense lookup and card generation run at this temperature.
pub const GENERATION_TEMPERATURE: f32 = 0.2;

// Chat completions response
#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: Option<Message>,
}

#[derive(Debug, Deserialize)]
pub struct Message {
    pub content: Option<String>,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct RequestMessage {
    pub role: String,
    pub content: String,
}

impl RequestMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Named JSON schema the provider must conform its output to.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct JsonSchemaFormat {
    pub name: String,
    pub strict: bool,
    pub schema: serde_json::Value,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub kind: String,
    pub json_schema: JsonSchemaFormat,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub temperature: f32,
    pub messages: Vec<RequestMessage>,
    pub response_format: ResponseFormat,
}

impl CompletionRequest {
    pub fn new(
        model: impl Into<String>,
        messages: Vec<RequestMessage>,
        json_schema: JsonSchemaFormat,
    ) -> Self {
        Self {
            model: model.into(),
            temperature: GENERATION_TEMPERATURE,
            messages,
            response_format: ResponseFormat {
                kind: "json_schema".to_string(),
                json_schema,
            },
        }
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.message_with_role("system")
    }

    pub fn user_prompt(&self) -> Option<&str> {
        self.message_with_role("user")
    }

    fn message_with_role(&self, role: &str) -> Option<&str> {
        self.messages
            .iter()
            .find(|message| message.role == role)
            .map(|message| message.content.as_str())
    }
}

/// A language model that answers a prompt with text constrained by a JSON schema.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

pub struct ApiClient {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl ApiClient {
    pub fn new(config: &ApiConfig, api_key: impl Into<String>) -> Result<Self> {
        let client = ClientBuilder::new()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;

        Ok(ApiClient {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: api_key.into(),
        })
    }

    /// `None` when no API key is configured.
    pub fn from_config(config: &Config) -> Result<Option<Arc<dyn CompletionService>>> {
        match config.api_key() {
            Some(key) => {
                let client = ApiClient::new(&config.api, key)?;
                Ok(Some(Arc::new(client)))
            }
            None => {
                warn!("Missing OPENAI_API_KEY; completion requests will be rejected.");
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl CompletionService for ApiClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        debug!(
            model = request.model.as_str(),
            schema = request.response_format.json_schema.name.as_str(),
            "Sending completion request."
        );

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(CompanionError::UpstreamStatus {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        let completion: ChatCompletionResponse =
            serde_json::from_str(&body).map_err(CompanionError::ResponseParse)?;

        first_choice_content(completion)
    }
}

fn first_choice_content(completion: ChatCompletionResponse) -> Result<String> {
    completion
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message)
        .and_then(|message| message.content)
        .map(|content| content.trim().to_string())
        .filter(|content| !content.is_empty())
        .ok_or(CompanionError::EmptyResponse)
}

/// Strips one surrounding Markdown code fence, if the whole reply is wrapped in one.
pub fn strip_code_fence(content: &str) -> &str {
    let Some(inner) = content
        .strip_prefix("```")
        .and_then(|rest| rest.strip_suffix("```"))
    else {
        return content;
    };

    // Drop the info string (`json`) on the opening fence line.
    match inner.split_once('\n') {
        Some((info, body)) if !info.contains('{') => body.trim(),
        _ => inner.trim(),
    }
}

/// Parses completion text as JSON, failing with [`CompanionError::EmptyResponse`] on blank text.
pub fn parse_completion_json(content: &str) -> Result<serde_json::Value> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(CompanionError::EmptyResponse);
    }

    serde_json::from_str(strip_code_fence(trimmed)).map_err(CompanionError::ResponseParse)
}
