use crate::errors::ApiError;
use crate::format::{DetectResponse, ResponseFormat};
use crate::metrics::Outcome;
use crate::state::AppState;
use crate::upload::Upload;
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, State, multipart::MultipartRejection},
    routing::{get, post},
};
use serde_json::{Value, json};
use std::time::Instant;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

const IMAGE_FIELD: &str = "image";

type MultipartResult = Result<Multipart, MultipartRejection>;

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/detect", post(detect))
        .route("/detect/boxes", post(detect_boxes))
        .route("/detect/summary", post(detect_summary))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn index() -> Json<Value> {
    Json(json!({
        "message": "Backend is running! Use POST /detect to analyze images."
    }))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "model": state.model.describe(),
        "classes": state.model.names().len(),
    }))
}

async fn detect(
    State(state): State<AppState>,
    multipart: MultipartResult,
) -> Result<Json<DetectResponse>, ApiError> {
    let format = state.default_format;
    handle_detect(state, format, multipart).await
}

async fn detect_boxes(
    State(state): State<AppState>,
    multipart: MultipartResult,
) -> Result<Json<DetectResponse>, ApiError> {
    handle_detect(state, ResponseFormat::DetailedBoxes, multipart).await
}

async fn detect_summary(
    State(state): State<AppState>,
    multipart: MultipartResult,
) -> Result<Json<DetectResponse>, ApiError> {
    handle_detect(state, ResponseFormat::LabelSummary, multipart).await
}

#[tracing::instrument(skip_all, fields(format = format.as_str()))]
async fn handle_detect(
    state: AppState,
    format: ResponseFormat,
    multipart: MultipartResult,
) -> Result<Json<DetectResponse>, ApiError> {
    let started = Instant::now();

    let result = match multipart {
        Ok(multipart) => detect_upload(&state, format, multipart).await,
        Err(rejection) => Err(rejection.into()),
    };

    let (outcome, objects) = match &result {
        Ok(response) => (Outcome::Ok, response.object_count()),
        Err(err) if err.is_client_error() => {
            tracing::info!(error = %err, "Rejected detection request");
            (Outcome::ClientError, 0)
        }
        Err(_) => (Outcome::ServerError, 0),
    };
    state
        .metrics
        .record(format, outcome, started.elapsed(), objects);

    result.map(Json)
}

async fn detect_upload(
    state: &AppState,
    format: ResponseFormat,
    multipart: Multipart,
) -> Result<DetectResponse, ApiError> {
    let upload = read_image_field(multipart).await?;
    run_detection(state, format, upload).await
}

/// First `image` field wins; other fields are skipped.
async fn read_image_field(mut multipart: Multipart) -> Result<Upload, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }

        let file_name = field.file_name().map(str::to_string);
        let bytes = field.bytes().await?;
        if bytes.is_empty() {
            return Err(ApiError::NoImage);
        }

        return Ok(Upload { file_name, bytes });
    }

    Err(ApiError::NoImage)
}

/// Save and infer on the blocking pool. The scratch file is removed when the
/// task ends, including when the model panics.
async fn run_detection(
    state: &AppState,
    format: ResponseFormat,
    upload: Upload,
) -> Result<DetectResponse, ApiError> {
    let model = state.model.clone();
    let scratch = state.scratch.clone();

    let task = tokio::task::spawn_blocking(move || -> anyhow::Result<DetectResponse> {
        let file = scratch.persist(&upload)?;
        let groups = model.detect(file.path())?;
        let response = format.format(&groups, model.names());
        tracing::debug!(objects = response.object_count(), "Detection complete");
        Ok(response)
    });

    match task.await {
        Ok(Ok(response)) => Ok(response),
        Ok(Err(err)) => Err(state.errors.internal(err)),
        Err(join_err) => Err(state
            .errors
            .internal(anyhow::anyhow!("Detection task failed: {}", join_err))),
    }
}
