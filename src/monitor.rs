use chrono::Duration;
use tracing::{debug, error, info, warn};

use api::recorder::RecordingStatus;

use crate::context::Context;
use crate::dispatch::Task;
use crate::error::RecordingError;
use crate::service::{RecordingPatch, RecordingsService, SegmentsService};

pub const STUCK_MESSAGE: &str = "Recording exceeded maximum duration";
pub const MISSED_MESSAGE: &str = "Missed scheduled start time";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MonitorReport {
    pub stuck: usize,
    pub missed_dispatched: usize,
    pub missed_failed: usize,
    pub cancelled_for_disk: usize,
}

/// Runs every check; a failing check is logged and does not skip the rest
pub async fn sweep(ctx: &Context) -> MonitorReport {
    let mut report = MonitorReport::default();
    if let Err(e) = check_stuck(ctx, &mut report).await {
        error!("[monitor] stuck check failed: {}", e);
    }
    if let Err(e) = check_missed(ctx, &mut report).await {
        error!("[monitor] missed start check failed: {}", e);
    }
    if let Err(e) = check_disk(ctx, &mut report).await {
        error!("[monitor] disk check failed: {}", e);
    }
    report
}

async fn check_stuck(ctx: &Context, report: &mut MonitorReport) -> Result<(), RecordingError> {
    let cfg = &ctx.config.monitor;
    let now = ctx.now();
    let started_before = now - Duration::seconds(cfg.max_recording_duration);

    for recording in RecordingsService::started_before(&ctx.db, started_before).await? {
        if now <= recording.padded_end() + Duration::seconds(cfg.stuck_grace) {
            continue;
        }
        let mut patch = RecordingPatch::default()
            .actual_end(now)
            .last_error(STUCK_MESSAGE);
        if let Some(seconds) = recording.captured_seconds(now) {
            patch = patch.duration_seconds(seconds);
        }
        let moved = RecordingsService::transition(
            &ctx.db,
            recording.id,
            RecordingStatus::Recording,
            RecordingStatus::Failed,
            patch,
            now,
        )
        .await?;
        if !moved {
            continue;
        }
        report.stuck += 1;
        warn!(recording_id = %recording.id, "[monitor] stuck recording failed");

        if SegmentsService::has_completed(&ctx.db, recording.id).await? {
            if let Err(e) = ctx
                .dispatcher
                .enqueue(Task::ProcessRecording(recording.id), None)
                .await
            {
                error!(recording_id = %recording.id, "[monitor] enqueue post-processing: {}", e);
            }
        }
    }
    Ok(())
}

async fn check_missed(ctx: &Context, report: &mut MonitorReport) -> Result<(), RecordingError> {
    let now = ctx.now();
    let cutoff = now - Duration::seconds(ctx.config.monitor.missed_start);

    for recording in RecordingsService::scheduled_before(&ctx.db, cutoff).await? {
        if recording.padded_end() > now {
            info!(recording_id = %recording.id, "[monitor] missed start, starting late");
            match ctx
                .dispatcher
                .enqueue(Task::StartRecording(recording.id), None)
                .await
            {
                Ok(()) => report.missed_dispatched += 1,
                Err(e) => error!(recording_id = %recording.id, "[monitor] enqueue failed: {}", e),
            }
            continue;
        }

        let moved = RecordingsService::transition(
            &ctx.db,
            recording.id,
            RecordingStatus::Scheduled,
            RecordingStatus::Failed,
            RecordingPatch::default().actual_end(now).last_error(MISSED_MESSAGE),
            now,
        )
        .await?;
        if moved {
            report.missed_failed += 1;
            warn!(recording_id = %recording.id, "[monitor] missed recording failed");
        }
    }
    Ok(())
}

async fn check_disk(ctx: &Context, report: &mut MonitorReport) -> Result<(), RecordingError> {
    let cfg = &ctx.config.monitor;
    let free = match ctx.disk.free_bytes(&ctx.config.recorder.recordings_dir) {
        Ok(free) => free,
        Err(e) => {
            warn!("[monitor] free space lookup failed: {}", e);
            return Ok(());
        }
    };

    if free >= cfg.disk_warn_bytes {
        debug!(free, "[monitor] disk ok");
        return Ok(());
    }
    if free >= cfg.disk_critical_bytes {
        warn!(free, "[monitor] low disk space");
        return Ok(());
    }

    error!(free, "[monitor] critically low disk space, cancelling scheduled recordings");
    let now = ctx.now();
    for recording in RecordingsService::find_by_status(&ctx.db, RecordingStatus::Scheduled).await? {
        let moved = RecordingsService::transition(
            &ctx.db,
            recording.id,
            RecordingStatus::Scheduled,
            RecordingStatus::Cancelled,
            RecordingPatch::default().last_error(RecordingError::InsufficientDiskSpace.to_string()),
            now,
        )
        .await?;
        if moved {
            report.cancelled_for_disk += 1;
        }
    }
    Ok(())
}
