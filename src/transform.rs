//! One image in, one restyled image out.

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use crate::credential::KeyManager;
use crate::data_url::{DataUrl, is_image_mime_type};
use crate::error::{Result, StudioError};
use crate::gemini::{DEFAULT_IMAGE_MODEL, GeminiApi, GenerateContentRequest, GenerateContentResponse};
use crate::image_processing::{REQUEST_MIME_TYPE, png_payload};

pub const TARGET_ASPECT_RATIO: &str = "1:1";

/// Appended to every preset prompt.
pub const OUTPUT_DIRECTIVE: &str = "Important: keep the original subject's shape and details intact while upgrading the lighting and background to professional studio quality. Respond with exactly one image and no explanatory text.";

const TEXT_DETAIL_LIMIT: usize = 200;

const NORMAL_FINISH_REASONS: [&str; 2] = ["STOP", "FINISH_REASON_UNSPECIFIED"];

pub fn compose_instruction(prompt: &str) -> String {
    format!("{} ({})", prompt.trim(), OUTPUT_DIRECTIVE)
}

/// Sends one transformation request per call. The key is resolved through
/// the [`KeyManager`] every time; nothing is cached here.
pub struct Transformer {
    keys: Arc<KeyManager>,
    api: Arc<GeminiApi>,
    model: String,
}

impl Transformer {
    pub fn new(keys: Arc<KeyManager>, api: Arc<GeminiApi>) -> Self {
        Self {
            keys,
            api,
            model: DEFAULT_IMAGE_MODEL.to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn keys(&self) -> &Arc<KeyManager> {
        &self.keys
    }

    pub async fn transform(&self, input: &DataUrl, prompt: &str) -> Result<DataUrl> {
        let Some(credential) = self.keys.resolve().await else {
            self.keys.reconcile_missing().await;
            return Err(StudioError::NoCredential);
        };

        let body = GenerateContentRequest::image_edit(
            REQUEST_MIME_TYPE,
            png_payload(input)?,
            compose_instruction(prompt),
            TARGET_ASPECT_RATIO,
        );

        let start = Instant::now();
        let outcome = match self
            .api
            .generate_content(&credential, &self.model, &body)
            .await
        {
            Ok(response) => extract_image(response),
            Err(err) => Err(err),
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        match &outcome {
            Ok(image) => info!(
                key = %credential.fingerprint(),
                model = %self.model,
                mime_type = image.mime_type(),
                duration_ms,
                "transformation succeeded"
            ),
            Err(err) => {
                warn!(
                    key = %credential.fingerprint(),
                    kind = err.kind(),
                    duration_ms,
                    "transformation failed: {err}"
                );
                if err.is_auth() {
                    self.keys.invalidate_if_current(&credential).await;
                }
            }
        }
        outcome
    }
}

/// Classifies a parsed response. The first inline image segment of the
/// first candidate wins; later segments and inline data with a non-image
/// media type are ignored.
pub fn extract_image(response: GenerateContentResponse) -> Result<DataUrl> {
    if let Some(reason) = response
        .prompt_feedback
        .and_then(|feedback| feedback.block_reason)
    {
        return Err(StudioError::ContentBlocked(reason));
    }

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or(StudioError::EmptyResponse)?;

    if let Some(reason) = candidate.finish_reason {
        if !NORMAL_FINISH_REASONS.contains(&reason.as_str()) {
            return Err(StudioError::ContentBlocked(reason));
        }
    }

    let parts = candidate.content.map(|c| c.parts).unwrap_or_default();
    let mut first_text = None;
    for part in parts {
        if let Some(inline) = part.inline_data {
            if is_image_mime_type(&inline.mime_type) {
                return Ok(DataUrl::new(inline.mime_type, inline.data));
            }
            warn!(mime_type = %inline.mime_type, "skipping non-image inline segment");
        }
        if first_text.is_none() {
            first_text = part.text.filter(|t| !t.trim().is_empty());
        }
    }

    match first_text {
        Some(text) => Err(StudioError::ModelTextOnly(truncate(&text, TEXT_DETAIL_LIMIT))),
        None => Err(StudioError::NoImageData),
    }
}

fn truncate(text: &str, limit: usize) -> String {
    let text = text.trim();
    match text.char_indices().nth(limit) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
