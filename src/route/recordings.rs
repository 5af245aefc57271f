use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use tracing::info;
use uuid::Uuid;

use api::recorder::RecordingStatus;
use api::request::{CancelRecording, QueryRecordings};
use api::response::{RecordingsResponse, SegmentsResponse};

use crate::context::Context;
use crate::error::{AppError, RecordingError};
use crate::recording::Recording;
use crate::result::Result;
use crate::segments::SegmentManager;
use crate::service::{RecordingPatch, RecordingsService, SegmentsService};

pub fn route() -> Router<Context> {
    Router::new()
        .route(api::path::RECORDINGS, get(list))
        .route(
            &api::path::recording("{id}"),
            get(show).delete(remove),
        )
        .route(&api::path::recording_segments("{id}"), get(segments))
        .route(&api::path::recording_cancel("{id}"), post(cancel))
}

async fn list(
    State(ctx): State<Context>,
    Query(query): Query<QueryRecordings>,
) -> Result<Json<RecordingsResponse>> {
    let (recordings, total_count) = RecordingsService::list(&ctx.db, &query)
        .await
        .map_err(AppError::recording)?;
    Ok(Json(RecordingsResponse {
        recordings: recordings.iter().map(Recording::to_api).collect(),
        total_count,
    }))
}

async fn show(
    State(ctx): State<Context>,
    Path(id): Path<Uuid>,
) -> Result<Json<api::response::Recording>> {
    Ok(Json(load(&ctx, id).await?.to_api()))
}

async fn segments(
    State(ctx): State<Context>,
    Path(id): Path<Uuid>,
) -> Result<Json<SegmentsResponse>> {
    load(&ctx, id).await?;
    let segments = SegmentsService::list(&ctx.db, id)
        .await
        .map_err(AppError::recording)?;
    Ok(Json(SegmentsResponse {
        segments: segments.iter().map(|s| s.to_api()).collect(),
    }))
}

async fn cancel(
    State(ctx): State<Context>,
    Path(id): Path<Uuid>,
    body: Option<Json<CancelRecording>>,
) -> Result<Json<api::response::Recording>> {
    let recording = load(&ctx, id).await?;
    let reason = body.and_then(|Json(b)| b.reason);

    let mut patch = RecordingPatch::default();
    if let Some(reason) = reason {
        patch = patch.last_error(reason);
    }
    let moved = RecordingsService::transition(
        &ctx.db,
        id,
        recording.status,
        RecordingStatus::Cancelled,
        patch,
        ctx.now(),
    )
    .await
    .map_err(AppError::recording)?;
    if !moved {
        return Err(AppError::Conflict(
            "recording status changed, retry".to_string(),
        ));
    }
    info!(recording_id = %id, from = %recording.status, "[http] recording cancelled");

    Ok(Json(load(&ctx, id).await?.to_api()))
}

async fn remove(State(ctx): State<Context>, Path(id): Path<Uuid>) -> Result<StatusCode> {
    let recording = load(&ctx, id).await?;
    if recording.status == RecordingStatus::Recording {
        return Err(AppError::Conflict(
            "recording in progress, cancel it first".to_string(),
        ));
    }
    SegmentManager::new(&ctx)
        .delete_recording(&recording)
        .await
        .map_err(AppError::recording)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn load(ctx: &Context, id: Uuid) -> Result<Recording> {
    RecordingsService::get(&ctx.db, id)
        .await
        .map_err(AppError::recording)?
        .ok_or_else(|| AppError::recording(RecordingError::NotFound(id)))
}
