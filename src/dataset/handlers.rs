use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::Response,
    routing::get,
    Json, Router,
};
use tracing::{info, instrument};

use super::{
    archive::{self, ArchiveStream},
    dto::{DatasetInfo, DATASET_INFO, PUBLIC_ARCHIVE_NAME},
};
use crate::{auth::extractors::AuthUser, error::AppError, state::AppState};

pub fn dataset_routes() -> Router<AppState> {
    Router::new()
        .route("/info", get(get_info))
        .route("/download", get(download))
}

pub async fn get_info() -> Json<DatasetInfo> {
    Json(DATASET_INFO)
}

/// Streams a freshly built archive of the dataset. The temp file is owned by
/// the response body and removed once the body is dropped.
#[instrument(skip(state))]
pub async fn download(
    State(state): State<AppState>,
    AuthUser(username): AuthUser,
) -> Result<Response, AppError> {
    let archive = archive::build(&state.config.dataset, &username).await?;
    let (stream, len) = ArchiveStream::open(archive)
        .await
        .map_err(|e| AppError::Build(e.into()))?;

    info!(%username, bytes = len, "sending dataset archive");
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/zip")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{PUBLIC_ARCHIVE_NAME}\""),
        )
        .header(header::CONTENT_LENGTH, len)
        .body(Body::from_stream(stream))
        .map_err(|e| AppError::Internal(e.into()))
}
