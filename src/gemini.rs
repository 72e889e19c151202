//! Gemini `generateContent` wire contract.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::credential::{Credential, CredentialProbe};
use crate::error::{Result, StudioError};

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image";
pub const DEFAULT_PROBE_MODEL: &str = "gemini-3-flash-preview";

const PROBE_TEXT: &str = "test";

/// Thin client for the remote model endpoint. Holds no credential.
#[derive(Debug, Clone)]
pub struct GeminiApi {
    client: Client,
    base_url: String,
    probe_model: String,
}

impl GeminiApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            probe_model: DEFAULT_PROBE_MODEL.to_string(),
        }
    }

    pub fn with_probe_model(mut self, model: impl Into<String>) -> Self {
        self.probe_model = model.into();
        self
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent", self.base_url, model)
    }

    /// Submits one request and returns the parsed body, or a classified failure.
    pub async fn generate_content(
        &self,
        credential: &Credential,
        model: &str,
        body: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse> {
        let response = self
            .client
            .post(self.endpoint(model))
            .header("x-goog-api-key", credential.expose())
            .json(body)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &text));
        }

        let text = response
            .text()
            .await
            .map_err(classify_transport_error)?;
        debug!(model, bytes = text.len(), "generateContent response received");
        serde_json::from_str(&text)
            .map_err(|err| StudioError::Unknown(format!("malformed response: {err}")))
    }
}

#[async_trait]
impl CredentialProbe for GeminiApi {
    async fn probe(&self, candidate: &Credential) -> bool {
        let body = GenerateContentRequest::probe();
        match self
            .generate_content(candidate, &self.probe_model, &body)
            .await
        {
            Ok(response) => response.first_text().is_some_and(|t| !t.is_empty()),
            Err(err) => {
                warn!(
                    key = %candidate.fingerprint(),
                    kind = err.kind(),
                    "API key probe failed: {err}"
                );
                false
            }
        }
    }
}

fn classify_transport_error(err: reqwest::Error) -> StudioError {
    match err.status() {
        Some(status) => classify_status(status, &err.to_string()),
        None => StudioError::Unknown(err.to_string()),
    }
}

/// Maps a non-success status and its body onto the error taxonomy.
pub fn classify_status(status: StatusCode, body: &str) -> StudioError {
    let message = extract_error_message(body);
    let code = status.as_u16();
    let lower = body.to_lowercase();

    if code == 401 || code == 403 {
        return StudioError::AuthError(format!("{code}: {message}"));
    }
    if code == 400 && (lower.contains("api_key_invalid") || lower.contains("api key not valid")) {
        return StudioError::AuthError(format!("{code}: {message}"));
    }
    if code == 429 || lower.contains("resource_exhausted") {
        return StudioError::QuotaExceeded(format!("{code}: {message}"));
    }
    StudioError::Unknown(format!("{code}: {message}"))
}

fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .and_then(|envelope| envelope.error)
        .and_then(|detail| detail.message)
        .unwrap_or_else(|| body.trim().to_string())
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: Option<String>,
}

// Request types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    pub generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
pub struct Content {
    pub parts: Vec<RequestPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum RequestPart {
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
    Text {
        text: String,
    },
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_modalities: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_config: Option<ImageConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageConfig {
    pub aspect_ratio: String,
}

impl GenerateContentRequest {
    /// Image + instruction request with a fixed aspect ratio.
    pub fn image_edit(
        mime_type: &str,
        base64_data: String,
        instruction: String,
        aspect_ratio: &str,
    ) -> Self {
        Self {
            contents: vec![Content {
                parts: vec![
                    RequestPart::InlineData {
                        inline_data: InlineData {
                            mime_type: mime_type.to_string(),
                            data: base64_data,
                        },
                    },
                    RequestPart::Text { text: instruction },
                ],
            }],
            generation_config: GenerationConfig {
                response_modalities: Some(vec!["IMAGE".to_string(), "TEXT".to_string()]),
                image_config: Some(ImageConfig {
                    aspect_ratio: aspect_ratio.to_string(),
                }),
                max_output_tokens: None,
            },
        }
    }

    /// Cheapest possible round trip, used to validate a key.
    pub fn probe() -> Self {
        Self {
            contents: vec![Content {
                parts: vec![RequestPart::Text {
                    text: PROBE_TEXT.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                max_output_tokens: Some(1),
                ..Default::default()
            },
        }
    }
}

// Response types

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<CandidateContent>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CandidateContent {
    #[serde(default)]
    pub parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponsePart {
    #[serde(default)]
    pub inline_data: Option<InlineData>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    #[serde(default)]
    pub block_reason: Option<String>,
}

impl GenerateContentResponse {
    fn first_text(&self) -> Option<&str> {
        self.candidates
            .first()?
            .content
            .as_ref()?
            .parts
            .iter()
            .find_map(|part| part.text.as_deref())
    }
}
