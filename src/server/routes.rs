//! HTTP endpoint implementations.
//!
//! Both image endpoints accept a multipart upload, persist the file under a
//! sanitized name, and hand off to the orchestration service. Quota gating
//! happens in the middleware layer before these handlers run.

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Multipart, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;

use crate::service::sanitize_filename;
use crate::store::SearchResult;

use super::error::{ServerError, ServerResult};
use super::state::ServerState;

/// Image and optional label pulled out of a multipart form.
struct Upload {
    bytes: Vec<u8>,
    filename: String,
    text: Option<String>,
}

async fn read_upload(mut multipart: Multipart) -> ServerResult<Upload> {
    let mut bytes = None;
    let mut filename = None;
    let mut text = None;
    while let Some(field) = multipart.next_field().await? {
        match field.name() {
            Some("image") => {
                filename = field.file_name().map(str::to_owned);
                bytes = Some(field.bytes().await?.to_vec());
            }
            Some("text") => text = Some(field.text().await?),
            _ => {}
        }
    }
    let bytes =
        bytes.ok_or_else(|| ServerError::BadRequest("an `image` file field is required".into()))?;
    let filename = filename
        .ok_or_else(|| ServerError::BadRequest("the image field must carry a filename".into()))?;
    Ok(Upload {
        bytes,
        filename,
        text,
    })
}

/// Persist the upload under its sanitized identifier, keeping the original
/// extension for the stored file.
async fn persist_upload(state: &ServerState, upload: &Upload) -> ServerResult<(String, PathBuf)> {
    let (id, ext) = sanitize_filename(&upload.filename);
    let stored = state.config.upload_dir.join(format!("{id}{ext}"));
    tokio::fs::write(&stored, &upload.bytes).await?;
    Ok((id, stored))
}

/// `POST /image/embed` — add a labeled image to the catalog.
pub async fn embed_image(
    State(state): State<Arc<ServerState>>,
    multipart: Multipart,
) -> ServerResult<impl IntoResponse> {
    let upload = read_upload(multipart).await?;
    let label = match upload.text.as_deref().map(str::trim) {
        Some(text) if !text.is_empty() => text.to_owned(),
        _ => return Err(ServerError::BadRequest("a `text` label field is required".into())),
    };

    let (id, stored) = persist_upload(&state, &upload).await?;
    state.service.embed_upload(&stored, &label, &id).await?;
    info!(%id, "labeled image embedded");

    Ok(Json(json!({ "status": "success", "id": id })))
}

/// Best-match summary plus the verbatim ranked neighbor list.
#[derive(Debug, Serialize)]
pub struct DetectionResponse {
    pub found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
    pub matches: Vec<SearchResult>,
}

/// `POST /image/detect` — what is the main object in this image?
pub async fn detect_image(
    State(state): State<Arc<ServerState>>,
    multipart: Multipart,
) -> ServerResult<Json<DetectionResponse>> {
    let upload = read_upload(multipart).await?;
    let (_, stored) = persist_upload(&state, &upload).await?;

    let matches = state.service.detect(&stored).await?;
    let (found, label, score) = match matches.first() {
        Some(best) => (
            true,
            best.attributes
                .get("value")
                .and_then(Value::as_str)
                .map(str::to_owned),
            Some(best.score),
        ),
        None => (false, None, None),
    };
    Ok(Json(DetectionResponse {
        found,
        label,
        score,
        matches,
    }))
}

/// `GET /api` — service name, version, endpoints.
pub async fn api_info() -> ServerResult<impl IntoResponse> {
    Ok(Json(json!({
        "name": "objsearch",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": ["/image/embed", "/image/detect", "/health"],
    })))
}

/// `GET /health` — liveness probe.
pub async fn health_check() -> ServerResult<impl IntoResponse> {
    Ok(Json(json!({ "status": "ok" })))
}

pub async fn not_found() -> ServerError {
    ServerError::NotFound
}
