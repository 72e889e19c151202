use std::sync::Arc;

use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    schemars::JsonSchema,
    tool, tool_handler, tool_router,
};
use serde::{Deserialize, Serialize};

use crate::error::StudioError;
use crate::image_processing;
use crate::presets::{STUDIO_PRESETS, StudioStyle};
use crate::session::{ResultHistory, Studio};

#[derive(Debug, Deserialize, JsonSchema)]
pub struct TransformPhotoRequest {
    #[schemars(description = "Source photo as a base64 data URL or a local file path")]
    pub image: String,
    #[schemars(description = "Studio style preset id, e.g. CINEMATIC_FOOD")]
    pub style: Option<StudioStyle>,
}

#[derive(Serialize)]
struct TransformSummary {
    style: StudioStyle,
    timestamp: i64,
    #[serde(rename = "mimeType")]
    mime_type: String,
}

fn tool_error(err: &StudioError) -> McpError {
    let data = Some(serde_json::json!({
        "kind": err.kind(),
        "detail": err.to_string(),
    }));
    match err {
        StudioError::InvalidInput(_) => McpError::invalid_params(err.user_message(), data),
        _ => McpError::internal_error(err.user_message(), data),
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String, McpError> {
    serde_json::to_string(value).map_err(|err| {
        McpError::internal_error(
            "serialize tool response failed",
            Some(serde_json::Value::String(err.to_string())),
        )
    })
}

/// One instance per MCP session, each with its own result list.
#[derive(Clone)]
pub struct StudioToolServer {
    tool_router: ToolRouter<Self>,
    studio: Arc<Studio>,
    history: Arc<ResultHistory>,
}

impl StudioToolServer {
    pub fn new(studio: Arc<Studio>) -> Self {
        Self {
            tool_router: Self::tool_router(),
            studio,
            history: Arc::new(ResultHistory::new()),
        }
    }
}

#[tool_router]
impl StudioToolServer {
    #[tool(description = "List the available studio style presets with their ids and descriptions")]
    async fn list_studio_presets(&self) -> Result<CallToolResult, McpError> {
        let json = to_json(&STUDIO_PRESETS[..])?;
        Ok(CallToolResult::success(vec![Content::text(json)]))
    }

    #[tool(description = "Report whether an API key is configured and a transformation can run")]
    async fn studio_status(&self) -> Result<CallToolResult, McpError> {
        let keys = self.studio.keys();
        let json = to_json(&serde_json::json!({
            "ready": keys.is_ready().await,
            "mode": keys.mode(),
            "busy": self.studio.is_busy(),
        }))?;
        Ok(CallToolResult::success(vec![Content::text(json)]))
    }

    #[tool(
        description = "Restyle a photo with a studio preset and return the resulting image. This can take a while."
    )]
    async fn transform_photo(
        &self,
        Parameters(request): Parameters<TransformPhotoRequest>,
    ) -> Result<CallToolResult, McpError> {
        let image = image_processing::resolve_image_input(&request.image)
            .await
            .map_err(|err| tool_error(&err))?;
        let style = request.style.unwrap_or_default();
        let result = self
            .studio
            .generate(&self.history, &image, style)
            .await
            .map_err(|err| tool_error(&err))?;
        let output = result
            .result_url
            .parse::<crate::data_url::DataUrl>()
            .map_err(|err| tool_error(&err))?;

        let summary = to_json(&TransformSummary {
            style,
            timestamp: result.timestamp,
            mime_type: output.mime_type().to_string(),
        })?;
        Ok(CallToolResult::success(vec![
            Content::image(output.data().to_string(), output.mime_type().to_string()),
            Content::text(summary),
        ]))
    }
}

#[tool_handler]
impl ServerHandler for StudioToolServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            instructions: Some(
                "Restyles a single photo into a studio-quality shot using a fixed preset catalog."
                    .into(),
            ),
            ..Default::default()
        }
    }
}
