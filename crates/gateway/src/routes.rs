use crate::error::ApiError;
use crate::pipeline::{PredictionResponse, Upload};
use crate::state::AppState;
use axum::{
    Json, Router,
    body::Body,
    extract::{
        DefaultBodyLimit, Multipart, Path, Request, State,
        multipart::{MultipartError, MultipartRejection},
        rejection::PathRejection,
    },
    response::Response,
    routing::{get, post},
};
use serde_json::json;
use std::sync::Arc;
use tower::ServiceExt;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

const IMAGE_FIELD: &str = "image";
const INDEX_FILE: &str = "index.html";

pub struct RouterSettings<'a> {
    pub body_limit_bytes: usize,
    /// Prebuilt single-page frontend; unknown paths fall back to its
    /// `index.html`.
    pub frontend_dir: Option<&'a std::path::Path>,
}

pub fn create_router(state: AppState, settings: RouterSettings<'_>) -> Router {
    let router = Router::new()
        .route("/predict", post(predict))
        .route("/static/predictions/*filename", get(serve_prediction))
        .route("/health", get(health));

    let router = match settings.frontend_dir {
        Some(dir) => {
            tracing::info!(dir = %dir.display(), "Serving frontend");
            router.fallback_service(
                ServeDir::new(dir).fallback(ServeFile::new(dir.join(INDEX_FILE))),
            )
        }
        None => router.fallback(not_found),
    };

    router
        .layer(DefaultBodyLimit::max(settings.body_limit_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn predict(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictionResponse>, ApiError> {
    let upload = match multipart {
        Ok(multipart) => read_image_field(multipart).await?,
        Err(rejection) => {
            tracing::debug!(%rejection, "Prediction request is not multipart");
            None
        }
    };

    let response = Arc::clone(&state.pipeline).handle_detached(upload).await?;

    Ok(Json(response))
}

/// The first `image` field wins; other fields are ignored.
async fn read_image_field(mut multipart: Multipart) -> Result<Option<Upload>, ApiError> {
    while let Some(field) = multipart.next_field().await.map_err(invalid_upload)? {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }

        let filename = field.file_name().map(str::to_string);
        let bytes = field.bytes().await.map_err(invalid_upload)?;

        return Ok(Some(Upload {
            filename,
            bytes: bytes.to_vec(),
        }));
    }

    Ok(None)
}

fn invalid_upload(err: MultipartError) -> ApiError {
    tracing::debug!(error = %err, "Malformed multipart body");
    ApiError::InvalidUpload {
        status: err.status(),
        message: err.body_text(),
    }
}

/// Content type, conditional and range requests are handled by `ServeFile`.
async fn serve_prediction(
    State(state): State<AppState>,
    filename: Result<Path<String>, PathRejection>,
    request: Request,
) -> Result<Response, ApiError> {
    let Path(filename) = filename.map_err(|_| ApiError::Forbidden)?;
    let path = state.store().resolve_prediction(&filename)?;

    match ServeFile::new(&path).oneshot(request).await {
        Ok(response) => Ok(response.map(Body::new)),
        Err(never) => match never {},
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

async fn not_found() -> ApiError {
    ApiError::NotFound
}
