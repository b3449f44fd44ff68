use crate::config::ApiConfig;
use crate::error::PhotoError;
use crate::model::{GeoPoint, Photo, Thumbnail};
use crate::object_store::SignedUrl;
use crate::service::PhotoService;
use crate::upload::PhotoUpload;
use anyhow::{Context, Result};
use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use std::io;
use std::sync::Arc;
use tokio_util::io::StreamReader;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Multipart field carrying the uploaded file
pub const UPLOAD_FIELD: &str = "photo";

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub photos: Arc<PhotoService>,
}

#[derive(Debug, Serialize)]
pub struct PhotoListResponse {
    pub photos: Vec<Photo>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub id: Uuid,
    pub deleted: bool,
}

#[derive(Debug, Deserialize)]
pub struct SetDateRequest {
    /// RFC 3339 capture time
    pub date: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct SetLocationRequest {
    pub latitude: f64,
    pub longitude: f64,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn error_body(status: StatusCode, error: impl Into<String>, code: &str) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            code: code.to_string(),
        }),
    )
}

/// True when staging stopped because the request body hit the upload limit
fn exceeds_upload_limit(err: &PhotoError) -> bool {
    let PhotoError::Stage(io_err) = err else {
        return false;
    };
    io_err
        .get_ref()
        .and_then(|inner| inner.downcast_ref::<MultipartError>())
        .is_some_and(|e| e.status() == StatusCode::PAYLOAD_TOO_LARGE)
}

fn multipart_error(err: MultipartError) -> ApiError {
    let (status, code) = if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        (StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE")
    } else {
        (StatusCode::BAD_REQUEST, "BAD_REQUEST")
    };
    warn!(error = %err, code, "Multipart request rejected");
    error_body(status, format!("Multipart error: {}", err.body_text()), code)
}

/// Map a pipeline error to its HTTP status and error code
fn api_error(err: PhotoError) -> ApiError {
    let (status, code) = match &err {
        e if e.is_not_found() => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        e if exceeds_upload_limit(e) => (StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE"),
        PhotoError::Decode(_) => (StatusCode::UNPROCESSABLE_ENTITY, "DECODE_ERROR"),
        PhotoError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
        PhotoError::Stage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "UPLOAD_ERROR"),
        PhotoError::Analysis(_) => (StatusCode::INTERNAL_SERVER_ERROR, "ANALYSIS_ERROR"),
        PhotoError::Derivatives(_) => (StatusCode::INTERNAL_SERVER_ERROR, "THUMBNAIL_ERROR"),
        PhotoError::MetadataWrite(_) | PhotoError::ObjectUpload(_) | PhotoError::Store(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR")
        }
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
    };

    if status.is_server_error() {
        error!(error = %err, code, "Request failed");
    } else {
        warn!(error = %err, code, "Request rejected");
    }

    error_body(status, err.to_string(), code)
}

/// Create the API router
pub fn create_router(state: AppState, config: &ApiConfig) -> Router {
    let cors = if config.cors_enabled {
        if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = config
                .cors_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    } else {
        CorsLayer::new()
    };

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/api/v1/photos", get(list_photos).post(add_photo))
        .route("/api/v1/photos/:photo_id", get(get_photo).delete(delete_photo))
        .route("/api/v1/photos/:photo_id/date", put(set_photo_date))
        .route("/api/v1/photos/:photo_id/location", put(set_photo_location))
        .route("/api/v1/photos/:photo_id/url", get(get_photo_url))
        .route("/api/v1/photos/:photo_id/thumbnails", get(list_thumbnails))
        .route("/api/v1/thumbnails/:thumbnail_id/url", get(get_thumbnail_url))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "photos-service"
    }))
}

async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.photos.health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ready",
                "database": "connected"
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "not_ready",
                "database": "disconnected",
                "error": e.to_string()
            })),
        ),
    }
}

/// Stream the `photo` field straight into the ingestion pipeline
#[instrument(skip(state, multipart))]
async fn add_photo(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<Photo>), ApiError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let content_type = field.content_type().map(str::to_string);
        // MultipartError stays reachable through the io::Error for the 413 mapping
        let body = StreamReader::new(Box::pin(
            field.map_err(|e| io::Error::new(io::ErrorKind::Other, e)),
        ));

        let mut upload = PhotoUpload::new(body);
        if let Some(content_type) = content_type {
            upload = upload.with_content_type(content_type);
        }

        let photo = state.photos.add_photo(upload).await.map_err(api_error)?;
        info!(photo_id = %photo.id, "Photo uploaded");
        return Ok((StatusCode::CREATED, Json(photo)));
    }

    Err(error_body(
        StatusCode::BAD_REQUEST,
        format!("Missing multipart field \"{}\"", UPLOAD_FIELD),
        "BAD_REQUEST",
    ))
}

#[instrument(skip(state))]
async fn list_photos(State(state): State<AppState>) -> Result<Json<PhotoListResponse>, ApiError> {
    let photos = state.photos.get_photos().await.map_err(api_error)?;
    Ok(Json(PhotoListResponse {
        count: photos.len(),
        photos,
    }))
}

#[instrument(skip(state))]
async fn get_photo(
    State(state): State<AppState>,
    Path(photo_id): Path<Uuid>,
) -> Result<Json<Photo>, ApiError> {
    state
        .photos
        .get_photo(photo_id)
        .await
        .map(Json)
        .map_err(api_error)
}

#[instrument(skip(state))]
async fn delete_photo(
    State(state): State<AppState>,
    Path(photo_id): Path<Uuid>,
) -> Result<Json<DeleteResponse>, ApiError> {
    state
        .photos
        .delete_photo(photo_id)
        .await
        .map_err(api_error)?;

    Ok(Json(DeleteResponse {
        id: photo_id,
        deleted: true,
    }))
}

#[instrument(skip(state, request))]
async fn set_photo_date(
    State(state): State<AppState>,
    Path(photo_id): Path<Uuid>,
    Json(request): Json<SetDateRequest>,
) -> Result<Json<Photo>, ApiError> {
    state
        .photos
        .set_photo_date(photo_id, request.date)
        .await
        .map(Json)
        .map_err(api_error)
}

#[instrument(skip(state, request))]
async fn set_photo_location(
    State(state): State<AppState>,
    Path(photo_id): Path<Uuid>,
    Json(request): Json<SetLocationRequest>,
) -> Result<Json<Photo>, ApiError> {
    let location = GeoPoint {
        latitude: request.latitude,
        longitude: request.longitude,
    };

    state
        .photos
        .set_photo_location(photo_id, location)
        .await
        .map(Json)
        .map_err(api_error)
}

#[instrument(skip(state))]
async fn get_photo_url(
    State(state): State<AppState>,
    Path(photo_id): Path<Uuid>,
) -> Result<Json<SignedUrl>, ApiError> {
    state
        .photos
        .photo_url(photo_id)
        .await
        .map(Json)
        .map_err(api_error)
}

#[instrument(skip(state))]
async fn list_thumbnails(
    State(state): State<AppState>,
    Path(photo_id): Path<Uuid>,
) -> Result<Json<Vec<Thumbnail>>, ApiError> {
    state
        .photos
        .get_thumbnails(photo_id)
        .await
        .map(Json)
        .map_err(api_error)
}

#[instrument(skip(state))]
async fn get_thumbnail_url(
    State(state): State<AppState>,
    Path(thumbnail_id): Path<Uuid>,
) -> Result<Json<SignedUrl>, ApiError> {
    state
        .photos
        .thumbnail_url(thumbnail_id)
        .await
        .map(Json)
        .map_err(api_error)
}

/// Start the photos API server
pub async fn start_api_server(state: AppState, config: &ApiConfig) -> Result<()> {
    let router = create_router(state, config);
    let addr = format!("{}:{}", config.host, config.port);

    info!(address = %addr, "Starting photos API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .await
        .context("API server error")?;

    Ok(())
}
