//! JSON endpoints for Files Records and new negotiations
//!
//! Bodies are decoded leniently (missing fields take their zero value) and any
//! failure becomes a 400 whose body is the error text. Handlers that return data
//! answer 201 with JSON, the others an empty 200.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use base64::Engine;
use filedrop_core::{FileEntry, StoreError};
use filedrop_signal::AuthGate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use super::AppState;

/// Length in bytes of a generated files-access secret
const FILES_SECRET_BYTES: usize = 20;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("invalid json")]
    InvalidJson,
    #[error("invalid password")]
    InvalidPassword,
    #[error("error while creating url")]
    CreateUrl,
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        debug!("Request failed: {}", self);
        (StatusCode::BAD_REQUEST, self.to_string()).into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct NewFilesRequest {
    pub password: String,
    pub files: Vec<FileEntry>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewFilesResponse {
    pub url: String,
    pub password_files: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AddFilesRequest {
    pub url: String,
    pub password_files: String,
    pub files: Vec<FileEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RemoveFilesRequest {
    pub url: String,
    pub password_files: String,
    pub files: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NewSignalingRequest {
    pub url: String,
    pub password_user: String,
}

#[derive(Debug, Serialize)]
pub struct NewSignalingResponse {
    pub id: String,
}

fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| {
        debug!("Rejecting body: {}", e);
        ApiError::InvalidJson
    })
}

fn created<T: Serialize>(body: T) -> Response {
    (StatusCode::CREATED, Json(body)).into_response()
}

fn generate_files_secret() -> String {
    let bytes: [u8; FILES_SECRET_BYTES] = rand::random();
    base64::engine::general_purpose::STANDARD_NO_PAD.encode(bytes)
}

pub async fn ping() -> &'static str {
    "pong"
}

/// POST /api/files/new
pub async fn new_files(State(state): State<AppState>, body: Bytes) -> Result<Response, ApiError> {
    let request: NewFilesRequest = parse_body(&body)?;
    let password_files = generate_files_secret();

    let id = state
        .store
        .create_files_record(
            request.password,
            password_files.clone(),
            request.files,
            state.files_ttl,
        )
        .await
        .map_err(|e| {
            debug!("Files record creation failed: {}", e);
            ApiError::CreateUrl
        })?;

    info!("Created files record {}", id);
    Ok(created(NewFilesResponse {
        url: id.to_string(),
        password_files,
    }))
}

/// POST /api/files/add
pub async fn add_files(State(state): State<AppState>, body: Bytes) -> Result<StatusCode, ApiError> {
    let request: AddFilesRequest = parse_body(&body)?;
    state
        .store
        .add_files(&request.url, &request.password_files, request.files)
        .await?;
    Ok(StatusCode::OK)
}

/// POST /api/files/remove
pub async fn remove_files(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let request: RemoveFilesRequest = parse_body(&body)?;
    state
        .store
        .remove_files(&request.url, &request.password_files, &request.files)
        .await?;
    Ok(StatusCode::OK)
}

/// GET /api/files/:id
pub async fn get_files(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let files = state.store.files(&id).await?;
    Ok(created(files))
}

/// POST /api/signaling/new
pub async fn new_signaling(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request: NewSignalingRequest = parse_body(&body)?;
    let files_id = AuthGate::new(Arc::clone(&state.store))
        .authorize_connector(&request.url, &request.password_user)
        .await
        .map_err(|_| ApiError::InvalidPassword)?;

    let id = state.store.create_signaling_record(files_id.as_str()).await?;
    debug!("Opened negotiation {} on {}", id, files_id);
    Ok(created(NewSignalingResponse { id: id.to_string() }))
}
