//! AI schedule analysis over an OpenAI-compatible chat completion API

use crate::breaker::ErrorClass;
use crate::config::AiConfig;
use crate::extraction::{ScheduleFinding, ScheduleType};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Errors from the AI backend
#[derive(Debug, Error)]
pub enum AiError {
    #[error("AI request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("AI backend returned HTTP {0}")]
    Status(u16),

    #[error("AI backend rate limited the request")]
    RateLimited,

    #[error("Malformed AI response: {0}")]
    Malformed(String),

    #[error("Environment variable {0} holding the AI API key is not set")]
    MissingApiKey(String),
}

impl AiError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Http(e) if e.is_timeout() => ErrorClass::Timeout,
            Self::Http(_) => ErrorClass::Network,
            Self::Status(code) if *code >= 500 => ErrorClass::Network,
            Self::Status(_) => ErrorClass::Other,
            Self::RateLimited => ErrorClass::RateLimited,
            Self::Malformed(_) => ErrorClass::Parse,
            Self::MissingApiKey(_) => ErrorClass::Other,
        }
    }
}

/// Structured answer requested from the model
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct AiAnswer {
    #[serde(default)]
    pub found: bool,
    #[serde(default)]
    pub days: Vec<String>,
    #[serde(default)]
    pub times: Vec<String>,
    #[serde(default)]
    pub frequency: Option<String>,
    #[serde(default)]
    pub schedule_text: String,
    /// 0-100
    #[serde(default)]
    pub confidence: f64,
}

impl AiAnswer {
    /// Confidence clamped to 0-100
    pub fn confidence_pct(&self) -> u8 {
        if self.confidence.is_finite() {
            self.confidence.clamp(0.0, 100.0).round() as u8
        } else {
            0
        }
    }

    pub fn into_finding(self) -> ScheduleFinding {
        let confidence = self.confidence_pct();
        ScheduleFinding {
            schedule_text: self.schedule_text.trim().to_string(),
            confidence,
            days: self.days,
            times: self.times,
            frequency: self.frequency.filter(|f| !f.trim().is_empty()),
        }
    }
}

/// Reads page text and answers whether it holds a schedule
#[async_trait]
pub trait AiBackend: Send + Sync {
    async fn analyze(&self, text: &str, schedule_type: ScheduleType) -> Result<AiAnswer, AiError>;
}

const SYSTEM_PROMPT: &str = "You extract recurring parish schedules from web page text. \
Answer with a single JSON object and nothing else.";

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// Chat-completions client
#[derive(Clone)]
pub struct OpenAiBackend {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
    max_content_chars: usize,
    timeout: Duration,
}

impl OpenAiBackend {
    pub fn new(client: Client, config: &AiConfig, api_key: impl Into<String>) -> Self {
        Self {
            client,
            base_url: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: api_key.into(),
            max_content_chars: config.max_content_chars,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    /// Reads the API key from the configured environment variable
    pub fn from_env(client: Client, config: &AiConfig) -> Result<Self, AiError> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| AiError::MissingApiKey(config.api_key_env.clone()))?;
        Ok(Self::new(client, config, api_key))
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn user_prompt(&self, text: &str, schedule_type: ScheduleType) -> String {
        let content: String = text.chars().take(self.max_content_chars).collect();
        format!(
            "Find the {label} schedule in the page text below.\n\
             Respond with JSON: {{\"found\": bool, \"days\": [string], \"times\": [string], \
             \"frequency\": string or null, \"schedule_text\": string, \"confidence\": 0-100}}.\n\
             Use found=false when the text has no {label} schedule.\n\n\
             PAGE TEXT:\n{content}",
            label = schedule_type.label(),
            content = content,
        )
    }
}

#[async_trait]
impl AiBackend for OpenAiBackend {
    async fn analyze(&self, text: &str, schedule_type: ScheduleType) -> Result<AiAnswer, AiError> {
        let prompt = self.user_prompt(text, schedule_type);
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
            temperature: 0.0,
            response_format: ResponseFormat {
                format_type: "json_object",
            },
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(AiError::RateLimited);
        }
        if !status.is_success() {
            return Err(AiError::Status(status.as_u16()));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| AiError::Malformed(e.to_string()))?;
        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AiError::Malformed("no choices in response".to_string()))?;

        parse_answer(&content)
    }
}

/// Parses the model's JSON, tolerating a surrounding code fence
pub fn parse_answer(content: &str) -> Result<AiAnswer, AiError> {
    let trimmed = content.trim();
    let body = match trimmed.strip_prefix("```") {
        Some(rest) => {
            let rest = rest.split_once('\n').map_or("", |(_, after)| after);
            rest.trim_end().trim_end_matches("```")
        }
        None => trimmed,
    };
    serde_json::from_str(body.trim()).map_err(|e| AiError::Malformed(e.to_string()))
}
