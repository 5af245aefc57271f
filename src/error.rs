use axum::response::{IntoResponse, Response};
use http::StatusCode;
use uuid::Uuid;

use api::recorder::RecordingStatus;

/// Why a recording attempt (or a storage step it depends on) did not succeed.
///
/// The `Display` text is what ends up in `last_error`.
#[derive(Debug, thiserror::Error)]
pub enum RecordingError {
    #[error("No available connections to start recording")]
    AdmissionDenied,
    #[error("Insufficient disk space")]
    InsufficientDiskSpace,
    #[error("No stream URL found for recording")]
    SourceUnavailable,
    #[error("No stream profile found for recording")]
    ProfileMissing,
    #[error("Failed to create proxy stream: {0}")]
    StreamCreationFailed(String),
    #[error("FFmpeg process failed: {0}")]
    CaptureProcessFailure(String),
    #[error("Recording exceeded scheduled end time")]
    CaptureDeadline,
    #[error("Failed to merge recording segments: {0}")]
    MergeFailure(String),
    #[error("illegal transition {from} -> {to}")]
    IllegalTransition {
        from: RecordingStatus,
        to: RecordingStatus,
    },
    #[error("recording {0} not found")]
    NotFound(Uuid),
    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug)]
pub enum AppError {
    ResourceNotFound,
    Conflict(String),
    DatabaseError(String),
    InternalServerError(anyhow::Error),
}

impl AppError {
    pub fn recording(err: RecordingError) -> Self {
        match err {
            RecordingError::NotFound(_) => AppError::ResourceNotFound,
            RecordingError::IllegalTransition { .. } => AppError::Conflict(err.to_string()),
            RecordingError::Database(e) => AppError::DatabaseError(e.to_string()),
            other => AppError::InternalServerError(other.into()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::InternalServerError(err) => {
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
            }
            AppError::ResourceNotFound => {
                (StatusCode::NOT_FOUND, "resource not exists".to_string()).into_response()
            }
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg).into_response(),
            AppError::DatabaseError(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("database error: {msg}"),
            )
                .into_response(),
        }
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        AppError::InternalServerError(err.into())
    }
}
