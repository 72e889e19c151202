use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::credential::KeyMode;
use crate::data_url::DataUrl;
use crate::error::StudioError;
use crate::image_processing;
use crate::presets::{STUDIO_PRESETS, StudioPreset, StudioStyle};
use crate::session::{ResultHistory, Studio};

const INDEX_HTML: &str = include_str!("../templates/index.html");
const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Header carrying the per-page session id.
pub const SESSION_HEADER: &str = "x-studio-session";

const THUMBNAILS: [(&str, &str); 5] = [
    (
        "cinematic_food.svg",
        include_str!("../templates/thumbnails/cinematic_food.svg"),
    ),
    (
        "top_down_gourmet.svg",
        include_str!("../templates/thumbnails/top_down_gourmet.svg"),
    ),
    (
        "sizzling_bbq.svg",
        include_str!("../templates/thumbnails/sizzling_bbq.svg"),
    ),
    (
        "cozy_interior.svg",
        include_str!("../templates/thumbnails/cozy_interior.svg"),
    ),
    (
        "aesthetic_lifestyle.svg",
        include_str!("../templates/thumbnails/aesthetic_lifestyle.svg"),
    ),
];

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    kind: &'static str,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusResponse {
    pub ready: bool,
    pub mode: KeyMode,
    pub busy: bool,
}

#[derive(Debug, Deserialize)]
pub struct SaveKeyRequest {
    pub key: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    data_url: String,
}

#[derive(Debug, Deserialize)]
pub struct TransformRequest {
    pub image: String,
    #[serde(default)]
    pub style: StudioStyle,
}

fn session_id(headers: &HeaderMap) -> Result<&str, StudioError> {
    headers
        .get(SESSION_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| StudioError::InvalidInput(format!("missing {SESSION_HEADER} header")))
}

async fn open_session(studio: &Studio, headers: &HeaderMap) -> Result<Arc<ResultHistory>, StudioError> {
    studio.sessions().open(session_id(headers)?).await
}

fn json_error(err: &StudioError) -> Response {
    (
        err.status_code(),
        Json(ErrorResponse {
            error: err.user_message(),
            kind: err.kind(),
        }),
    )
        .into_response()
}

pub fn router(studio: Arc<Studio>) -> Router {
    Router::new()
        .route("/", get(index_page))
        .route("/api/status", get(status))
        .route("/api/key", post(save_key).delete(invalidate_key))
        .route("/api/key/select", post(select_host_key))
        .route("/api/presets", get(list_presets))
        .route("/thumbnails/{file}", get(thumbnail))
        .route(
            "/api/upload",
            post(handle_image_upload).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route(
            "/api/transform",
            post(transform).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES * 2)),
        )
        .route("/api/results", get(list_results).delete(discard_results))
        .with_state(studio)
}

pub async fn index_page() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn current_status(studio: &Studio) -> StatusResponse {
    StatusResponse {
        ready: studio.keys().is_ready().await,
        mode: studio.keys().mode(),
        busy: studio.is_busy(),
    }
}

pub async fn status(State(studio): State<Arc<Studio>>) -> Json<StatusResponse> {
    Json(current_status(&studio).await)
}

pub async fn save_key(
    State(studio): State<Arc<Studio>>,
    Json(request): Json<SaveKeyRequest>,
) -> Response {
    match studio.keys().submit(&request.key).await {
        Ok(()) => Json(current_status(&studio).await).into_response(),
        Err(err) => json_error(&err),
    }
}

pub async fn invalidate_key(State(studio): State<Arc<Studio>>) -> Json<StatusResponse> {
    studio.keys().invalidate().await;
    Json(current_status(&studio).await)
}

pub async fn select_host_key(State(studio): State<Arc<Studio>>) -> Response {
    match studio.keys().activate_host().await {
        Ok(()) => Json(current_status(&studio).await).into_response(),
        Err(err) => json_error(&err),
    }
}

pub async fn list_presets() -> Json<&'static [StudioPreset]> {
    Json(&STUDIO_PRESETS[..])
}

pub async fn thumbnail(Path(file): Path<String>) -> Response {
    match THUMBNAILS.iter().find(|(name, _)| *name == file) {
        Some((_, svg)) => ([(header::CONTENT_TYPE, "image/svg+xml")], *svg).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

pub async fn handle_image_upload(mut multipart: Multipart) -> Response {
    let mut bytes = None;
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => {
                if field.name() == Some("file") {
                    if let Some(content_type) = field.content_type() {
                        if !content_type.starts_with("image/") {
                            return json_error(&StudioError::InvalidInput(
                                "only image files can be uploaded".into(),
                            ));
                        }
                    }
                    match field.bytes().await {
                        Ok(data) => bytes = Some(data),
                        Err(err) => {
                            return json_error(&StudioError::InvalidInput(format!(
                                "failed to read file: {err}"
                            )));
                        }
                    }
                    break;
                }
            }
            Ok(None) => break,
            Err(err) => {
                return json_error(&StudioError::InvalidInput(format!(
                    "failed to read form: {err}"
                )));
            }
        }
    }

    let Some(bytes) = bytes else {
        return json_error(&StudioError::InvalidInput("no file was uploaded".into()));
    };
    match image_processing::to_data_url(&bytes) {
        Ok(url) => (
            StatusCode::OK,
            Json(UploadResponse {
                data_url: url.to_string(),
            }),
        )
            .into_response(),
        Err(err) => json_error(&err),
    }
}

pub async fn transform(
    State(studio): State<Arc<Studio>>,
    headers: HeaderMap,
    Json(request): Json<TransformRequest>,
) -> Response {
    let history = match open_session(&studio, &headers).await {
        Ok(history) => history,
        Err(err) => return json_error(&err),
    };
    let image = match request.image.parse::<DataUrl>() {
        Ok(image) => image,
        Err(err) => return json_error(&err),
    };
    match studio.generate(&history, &image, request.style).await {
        Ok(result) => Json(result).into_response(),
        Err(err) => {
            warn!(kind = err.kind(), "transform request failed");
            json_error(&err)
        }
    }
}

pub async fn list_results(State(studio): State<Arc<Studio>>, headers: HeaderMap) -> Response {
    match open_session(&studio, &headers).await {
        Ok(history) => Json(history.list().await).into_response(),
        Err(err) => json_error(&err),
    }
}

/// Sent by the page when it is discarded; drops that session's results.
pub async fn discard_results(State(studio): State<Arc<Studio>>, headers: HeaderMap) -> Response {
    let discarded = match session_id(&headers) {
        Ok(id) => studio.sessions().discard(id).await,
        Err(err) => Err(err),
    };
    match discarded {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => json_error(&err),
    }
}
