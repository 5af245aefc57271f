use chrono::Duration;
use tracing::{debug, info, warn};

use crate::context::Context;
use crate::dispatch::Task;
use crate::error::RecordingError;
use crate::service::RecordingsService;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub dispatched_now: usize,
    pub dispatched_delayed: usize,
    pub retried: usize,
}

/// Dispatch recordings about to start and requeue failed ones with retries left
pub async fn sweep(ctx: &Context) -> Result<SweepReport, RecordingError> {
    let cfg = &ctx.config.scheduler;
    let now = ctx.now();
    let mut report = SweepReport::default();

    let due = RecordingsService::due_in_window(
        &ctx.db,
        now - Duration::seconds(cfg.lookbehind),
        now + Duration::seconds(cfg.lookahead),
    )
    .await?;

    for recording in due {
        let until_start = recording.padded_start() - now;
        let delay = if until_start <= Duration::seconds(cfg.immediate_threshold) {
            report.dispatched_now += 1;
            None
        } else {
            report.dispatched_delayed += 1;
            until_start.to_std().ok()
        };
        debug!(
            recording_id = %recording.id,
            ?delay,
            "[scheduler] dispatching"
        );
        if let Err(e) = ctx
            .dispatcher
            .enqueue(Task::StartRecording(recording.id), delay)
            .await
        {
            warn!(recording_id = %recording.id, "[scheduler] enqueue failed: {}", e);
        }
    }

    let retry_before = now - Duration::seconds(cfg.retry_backoff);
    for recording in RecordingsService::retry_candidates(&ctx.db, retry_before).await? {
        if !RecordingsService::retry(&ctx.db, recording.id, now).await? {
            continue;
        }
        report.retried += 1;
        info!(
            recording_id = %recording.id,
            attempt = recording.retry_count + 1,
            max_retries = recording.max_retries,
            "[scheduler] retrying failed recording"
        );
        if let Err(e) = ctx
            .dispatcher
            .enqueue(Task::StartRecording(recording.id), None)
            .await
        {
            warn!(recording_id = %recording.id, "[scheduler] enqueue failed: {}", e);
        }
    }

    if report != SweepReport::default() {
        info!(
            now = report.dispatched_now,
            delayed = report.dispatched_delayed,
            retried = report.retried,
            "[scheduler] sweep"
        );
    }
    Ok(report)
}
