use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::models::{Author, Message};

/// Role vocabulary of the generation endpoint.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Model,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub role: TurnRole,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self { role: TurnRole::User, text: text.into() }
    }
}

impl From<&Message> for Turn {
    fn from(message: &Message) -> Self {
        let role = match message.author {
            Author::User => TurnRole::User,
            Author::Assistant => TurnRole::Model,
        };
        Self { role, text: message.content.clone() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl GenerationParams {
    /// Greetings: creative and brief.
    pub const GREETING: Self = Self { temperature: 0.95, max_output_tokens: 120 };
    /// Identity answers: creative, a short paragraph.
    pub const IDENTITY: Self = Self { temperature: 0.9, max_output_tokens: 300 };
    /// Ordinary conversation.
    pub const GENERIC: Self = Self { temperature: 0.7, max_output_tokens: 2048 };
}

/// One provider-agnostic generation request.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub system_instruction: Option<String>,
    pub turns: Vec<Turn>,
    pub params: GenerationParams,
}

impl GenerationRequest {
    /// A single user prompt with no history attached.
    pub fn single_shot(prompt: impl Into<String>, params: GenerationParams) -> Self {
        Self {
            system_instruction: None,
            turns: vec![Turn::user(prompt)],
            params,
        }
    }
}

/// Why a single attempt against the endpoint produced no usable text.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GenerationError {
    #[error("response blocked by safety filter: {0}")]
    Blocked(String),

    #[error("response contained no candidates")]
    Empty,

    #[error("API request failed with status {status}: {body}")]
    Http { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Well-formed reply refused by the caller's content check.
    #[error("reply rejected: {0}")]
    Rejected(String),
}

// Trait defining the interface for generation endpoints
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    async fn generate(
        &self,
        model: &str,
        api_key: &str,
        request: &GenerationRequest,
    ) -> Result<String, GenerationError>;
}

// --- Gemini (generateContent) Provider Implementation ---

const SAFETY_CATEGORIES: &[&str] = &[
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];
const SAFETY_THRESHOLD: &str = "BLOCK_MEDIUM_AND_ABOVE";

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GeminiRequestBody {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    generation_config: GeminiGenerationConfig,
    safety_settings: Vec<GeminiSafetySetting>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<TurnRole>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct GeminiPart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Serialize, Debug)]
struct GeminiSafetySetting {
    category: &'static str,
    threshold: &'static str,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    prompt_feedback: Option<GeminiPromptFeedback>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GeminiPromptFeedback {
    block_reason: Option<String>,
}

impl From<&GenerationRequest> for GeminiRequestBody {
    fn from(request: &GenerationRequest) -> Self {
        let contents = request
            .turns
            .iter()
            .map(|turn| GeminiContent {
                role: Some(turn.role),
                parts: vec![GeminiPart { text: Some(turn.text.clone()) }],
            })
            .collect();
        let system_instruction = request.system_instruction.as_ref().map(|text| GeminiContent {
            role: None,
            parts: vec![GeminiPart { text: Some(text.clone()) }],
        });
        Self {
            contents,
            system_instruction,
            generation_config: GeminiGenerationConfig {
                temperature: request.params.temperature,
                max_output_tokens: request.params.max_output_tokens,
            },
            safety_settings: SAFETY_CATEGORIES
                .iter()
                .map(|&category| GeminiSafetySetting { category, threshold: SAFETY_THRESHOLD })
                .collect(),
        }
    }
}

/// Turns a successful response body into text, or the failure it signals.
fn interpret_response(body: &str) -> Result<String, GenerationError> {
    let response: GeminiResponse = serde_json::from_str(body)
        .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;

    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(GenerationError::Blocked(reason));
    }
    let Some(candidate) = response.candidates.into_iter().next() else {
        return Err(GenerationError::Empty);
    };
    if candidate.finish_reason.as_deref() == Some("SAFETY") {
        return Err(GenerationError::Blocked("SAFETY".to_string()));
    }

    let text: String = candidate
        .content
        .map(|content| content.parts.into_iter().filter_map(|part| part.text).collect())
        .unwrap_or_default();
    if text.trim().is_empty() {
        return Err(GenerationError::Empty);
    }
    Ok(text)
}

pub struct GeminiProvider {
    client: Client,
    base_url: String,
}

impl GeminiProvider {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { client, base_url: base_url.into() })
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent", self.base_url.trim_end_matches('/'), model)
    }
}

#[async_trait]
impl GenerationProvider for GeminiProvider {
    async fn generate(
        &self,
        model: &str,
        api_key: &str,
        request: &GenerationRequest,
    ) -> Result<String, GenerationError> {
        let body = GeminiRequestBody::from(request);
        log::debug!("Sending generateContent request with {} turns to model {}", body.contents.len(), model);

        let response = self
            .client
            .post(self.endpoint(model))
            .query(&[("key", api_key)])
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::Transport(e.without_url().to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| GenerationError::Transport(e.without_url().to_string()))?;

        if !status.is_success() {
            return Err(GenerationError::Http { status: status.as_u16(), body: text });
        }
        interpret_response(&text)
    }
}
