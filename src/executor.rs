use std::collections::HashMap;
use std::time::Instant;

use chrono::Duration;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use api::recorder::RecordingStatus;

use crate::admission;
use crate::capture::{stop_with_timeout, CaptureProcess, CaptureRequest};
use crate::context::Context;
use crate::disk;
use crate::dispatch::Task;
use crate::error::RecordingError;
use crate::recording::{Recording, Segment, METADATA_PROXY_URL, METADATA_STREAM_ID};
use crate::segments::SegmentManager;
use crate::service::{RecordingPatch, RecordingsService, SegmentsService};
use crate::stream::StreamRequest;

type Result<T> = std::result::Result<T, RecordingError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Entry guard declined: missing, not `scheduled`, or claimed by another attempt
    Skipped,
    Completed,
    Failed,
    Cancelled,
}

enum Exit {
    Exited(Option<i32>),
    /// Stopped past padded end plus grace, with the exit code of the stop
    Deadline(Option<i32>),
}

/// One recording attempt, from admission to the terminal status
pub async fn run(ctx: &Context, id: Uuid) -> Result<AttemptOutcome> {
    let Some(recording) = RecordingsService::get(&ctx.db, id).await? else {
        debug!(recording_id = %id, "[executor] recording not found, skipping");
        return Ok(AttemptOutcome::Skipped);
    };
    if recording.status != RecordingStatus::Scheduled {
        debug!(
            recording_id = %id,
            status = %recording.status,
            "[executor] not scheduled, skipping"
        );
        return Ok(AttemptOutcome::Skipped);
    }

    if let Err(e) = admit(ctx, &recording).await {
        warn!(recording_id = %id, "[executor] admission denied: {}", e);
        fail(ctx, &recording, RecordingStatus::Scheduled, &e).await?;
        return Ok(AttemptOutcome::Failed);
    }

    let now = ctx.now();
    if now >= recording.padded_end() {
        let e = RecordingError::CaptureDeadline;
        warn!(recording_id = %id, "[executor] window already over: {}", e);
        fail(ctx, &recording, RecordingStatus::Scheduled, &e).await?;
        return Ok(AttemptOutcome::Failed);
    }

    let claimed = RecordingsService::transition(
        &ctx.db,
        id,
        RecordingStatus::Scheduled,
        RecordingStatus::Recording,
        RecordingPatch::default().actual_start(now).clear_actual_end(),
        now,
    )
    .await?;
    if !claimed {
        debug!(recording_id = %id, "[executor] lost the claim, skipping");
        return Ok(AttemptOutcome::Skipped);
    }
    info!(recording_id = %id, title = recording.title, "[executor] recording started");

    let mut recording = recording;
    recording.status = RecordingStatus::Recording;
    recording.actual_start = Some(now);
    recording.actual_end = None;

    match capture(ctx, &mut recording).await {
        Ok(AttemptOutcome::Completed) => complete(ctx, &recording).await,
        Ok(outcome) => Ok(outcome),
        Err(e) => {
            error!(recording_id = %id, "[executor] recording failed: {}", e);
            let failed = fail(ctx, &recording, RecordingStatus::Recording, &e).await?;
            if failed && matches!(e, RecordingError::CaptureDeadline) {
                salvage(ctx, &recording).await?;
            }
            Ok(AttemptOutcome::Failed)
        }
    }
}

/// Queue post-processing for whatever completed segments a failed attempt left
async fn salvage(ctx: &Context, recording: &Recording) -> Result<()> {
    if !SegmentsService::has_completed(&ctx.db, recording.id).await? {
        return Ok(());
    }
    info!(recording_id = %recording.id, "[executor] salvaging completed segments");
    if let Err(e) = ctx
        .dispatcher
        .enqueue(Task::ProcessRecording(recording.id), None)
        .await
    {
        error!(recording_id = %recording.id, "[executor] enqueue post-processing: {}", e);
    }
    Ok(())
}

async fn admit(ctx: &Context, recording: &Recording) -> Result<()> {
    if !admission::can_start(ctx.catalog.as_ref(), recording).await {
        return Err(RecordingError::AdmissionDenied);
    }

    let profile = SegmentManager::new(ctx).profile(recording).await;
    let required = disk::estimate_required_bytes(
        recording,
        profile.as_ref(),
        ctx.config.recorder.default_bytes_per_second,
    );
    let free = match ctx.disk.free_bytes(&ctx.config.recorder.recordings_dir) {
        Ok(free) => free,
        Err(e) => {
            error!(recording_id = %recording.id, "[executor] free space lookup failed: {}", e);
            return Err(RecordingError::InsufficientDiskSpace);
        }
    };
    if !disk::has_enough_disk_space(free, required, ctx.config.recorder.disk_safety_margin) {
        warn!(
            recording_id = %recording.id,
            free, required, "[executor] not enough disk space"
        );
        return Err(RecordingError::InsufficientDiskSpace);
    }
    Ok(())
}

/// Acquire the stream, run the capture and classify how it ended
async fn capture(ctx: &Context, recording: &mut Recording) -> Result<AttemptOutcome> {
    let source = ctx
        .catalog
        .resolve_source(&recording.source)
        .await?
        .ok_or(RecordingError::SourceUnavailable)?;
    let url = source
        .stream_url()
        .ok_or(RecordingError::SourceUnavailable)?
        .to_string();

    let manager = SegmentManager::new(ctx);
    let profile = manager
        .profile(recording)
        .await
        .ok_or(RecordingError::ProfileMissing)?;

    let mut variables: HashMap<String, String> = profile.variables.clone();
    if let Some(format) = &profile.format {
        variables.insert("format".to_string(), format.clone());
    }
    let request = StreamRequest {
        url,
        profile: profile.id.clone(),
        profile_variables: variables,
        metadata: json!({
            "recording_id": recording.id.to_string(),
            "type": "dvr_recording",
            "title": recording.title,
        }),
    };
    let endpoint = ctx
        .stream
        .create_stream(&request)
        .await
        .map_err(|e| RecordingError::StreamCreationFailed(e.to_string()))?
        .ok_or_else(|| RecordingError::StreamCreationFailed("no stream returned".to_string()))?;

    recording.metadata.insert(
        METADATA_STREAM_ID.to_string(),
        Value::String(endpoint.stream_id.clone()),
    );
    recording.metadata.insert(
        METADATA_PROXY_URL.to_string(),
        Value::String(endpoint.stream_endpoint.clone()),
    );
    RecordingsService::set_metadata(&ctx.db, recording.id, &recording.metadata, ctx.now()).await?;

    let segment = manager
        .create_segment(recording, profile.format.as_deref())
        .await?;

    let now = ctx.now();
    let remaining = (recording.padded_end() - now).num_seconds();
    let req = CaptureRequest {
        input_url: format!(
            "{}{}",
            ctx.config.stream.proxy_host.trim_end_matches('/'),
            endpoint.stream_endpoint
        ),
        output: segment.file_path.clone(),
        duration_seconds: Some(remaining.min(recording.total_duration_seconds()).max(1)),
    };
    info!(
        recording_id = %recording.id,
        url = req.input_url,
        output = %req.output.display(),
        "[executor] capture starting"
    );

    let mut process = match ctx.capture.spawn(&req).await {
        Ok(process) => process,
        Err(e) => {
            let msg = e.to_string();
            SegmentsService::mark_failed(&ctx.db, segment.id, ctx.now(), &msg).await?;
            return Err(RecordingError::CaptureProcessFailure(msg));
        }
    };

    match supervise(ctx, recording, &segment, process.as_mut()).await? {
        None => {
            if let Err(e) = manager.refresh_size(&segment).await {
                debug!(recording_id = %recording.id, "[executor] size refresh failed: {}", e);
            }
            info!(recording_id = %recording.id, "[executor] cancelled, capture stopped");
            Ok(AttemptOutcome::Cancelled)
        }
        Some(Exit::Deadline(code)) => {
            let e = RecordingError::CaptureDeadline;
            if is_clean_exit(ctx, code) {
                finish_segment(ctx, &manager, &segment).await?;
            } else {
                manager.refresh_size(&segment).await?;
                SegmentsService::mark_failed(&ctx.db, segment.id, ctx.now(), &e.to_string())
                    .await?;
            }
            Err(e)
        }
        Some(Exit::Exited(code)) => {
            if is_clean_exit(ctx, code) {
                finish_segment(ctx, &manager, &segment).await?;
                Ok(AttemptOutcome::Completed)
            } else {
                let stderr = process.stderr();
                let msg = if stderr.trim().is_empty() {
                    format!("exit code {:?}", code)
                } else {
                    stderr.trim().to_string()
                };
                SegmentsService::mark_failed(&ctx.db, segment.id, ctx.now(), &msg).await?;
                Err(RecordingError::CaptureProcessFailure(msg))
            }
        }
    }
}

/// Polls the running capture.
///
/// `None` means the recording was cancelled (or deleted) and the process stopped.
async fn supervise(
    ctx: &Context,
    recording: &Recording,
    segment: &Segment,
    process: &mut dyn CaptureProcess,
) -> Result<Option<Exit>> {
    let cfg = &ctx.config.capture;
    let manager = SegmentManager::new(ctx);
    let deadline = recording.padded_end() + Duration::seconds(cfg.end_grace as i64);
    let mut last_refresh = Instant::now();

    loop {
        tokio::select! {
            exit = process.wait() => return Ok(Some(Exit::Exited(exit?))),
            _ = tokio::time::sleep(cfg.poll_interval()) => {}
        }

        if last_refresh.elapsed() >= cfg.size_refresh_interval() {
            if let Err(e) = manager.refresh_size(segment).await {
                warn!(recording_id = %recording.id, "[executor] size refresh failed: {}", e);
            }
            last_refresh = Instant::now();
        }

        if ctx.now() > deadline {
            warn!(
                recording_id = %recording.id,
                "[executor] past padded end plus grace, stopping capture"
            );
            let code = stop_with_timeout(process, cfg.stop_timeout()).await?;
            return Ok(Some(Exit::Deadline(code)));
        }

        match RecordingsService::get(&ctx.db, recording.id).await {
            Ok(Some(current)) if current.status != RecordingStatus::Cancelled => {}
            Ok(_) => {
                stop_with_timeout(process, cfg.stop_timeout()).await?;
                return Ok(None);
            }
            Err(e) => warn!(recording_id = %recording.id, "[executor] status check failed: {}", e),
        }
    }
}

fn is_clean_exit(ctx: &Context, code: Option<i32>) -> bool {
    code == Some(0) || code == Some(ctx.config.capture.natural_end_exit_code)
}

async fn finish_segment(ctx: &Context, manager: &SegmentManager<'_>, segment: &Segment) -> Result<()> {
    let size = manager.refresh_size(segment).await?;
    SegmentsService::mark_completed(&ctx.db, segment.id, ctx.now(), size).await
}

async fn complete(ctx: &Context, recording: &Recording) -> Result<AttemptOutcome> {
    let now = ctx.now();
    let duration = recording.captured_seconds(now).unwrap_or_default();
    let done = RecordingsService::transition(
        &ctx.db,
        recording.id,
        RecordingStatus::Recording,
        RecordingStatus::Completed,
        RecordingPatch::default()
            .actual_end(now)
            .duration_seconds(duration)
            .clear_last_error(),
        now,
    )
    .await?;
    if !done {
        // The status moved under us; only cancellation can do that while recording.
        info!(recording_id = %recording.id, "[executor] finished after cancellation");
        return Ok(AttemptOutcome::Cancelled);
    }

    info!(
        recording_id = %recording.id,
        duration_seconds = duration,
        "[executor] recording completed"
    );
    if let Err(e) = ctx
        .dispatcher
        .enqueue(Task::ProcessRecording(recording.id), None)
        .await
    {
        error!(recording_id = %recording.id, "[executor] enqueue post-processing: {}", e);
    }
    Ok(AttemptOutcome::Completed)
}

/// Move to `failed` with the error text; `false` when the CAS was lost
async fn fail(
    ctx: &Context,
    recording: &Recording,
    from: RecordingStatus,
    err: &RecordingError,
) -> Result<bool> {
    let now = ctx.now();
    let mut patch = RecordingPatch::default()
        .actual_end(now)
        .last_error(err.to_string());
    if let Some(seconds) = recording.captured_seconds(now) {
        patch = patch.duration_seconds(seconds);
    }
    let moved = RecordingsService::transition(
        &ctx.db,
        recording.id,
        from,
        RecordingStatus::Failed,
        patch,
        now,
    )
    .await?;
    if !moved {
        debug!(recording_id = %recording.id, "[executor] status changed before failing");
    }
    Ok(moved)
}
