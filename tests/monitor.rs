mod common;

use std::sync::atomic::Ordering;

use api::recorder::RecordingStatus;
use chrono::Duration as Span;
use dvrman::dispatch::Task;
use dvrman::entity::recordings;
use dvrman::monitor::{self, MISSED_MESSAGE, STUCK_MESSAGE};
use dvrman::segments::SegmentManager;
use dvrman::service::{RecordingPatch, SegmentsService};
use sea_orm::{sea_query::Expr, ColumnTrait, EntityTrait, QueryFilter};

use common::{harness, GIB};

#[tokio::test]
async fn test_stuck_recording_is_failed() -> anyhow::Result<()> {
    let h = harness().await;
    let now = h.now();
    let started = now - Span::hours(13);
    let rec = h.insert(h.channel(started, started + Span::hours(1))).await;
    h.force(
        rec.id,
        RecordingStatus::Scheduled,
        RecordingStatus::Recording,
        RecordingPatch::default().actual_start(started),
    )
    .await;

    let report = monitor::sweep(&h.ctx).await;
    assert_eq!(report.stuck, 1);

    let failed = h.get(rec.id).await;
    assert_eq!(failed.status, RecordingStatus::Failed);
    assert_eq!(failed.last_error.as_deref(), Some(STUCK_MESSAGE));
    assert_eq!(failed.actual_end, Some(now));
    assert_eq!(failed.duration_seconds, Some(13 * 3600));
    // Nothing captured, nothing to process.
    assert!(h.dispatcher.take().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_stuck_recording_with_segments_is_processed() -> anyhow::Result<()> {
    let h = harness().await;
    let now = h.now();
    let started = now - Span::hours(13);
    let rec = h.insert(h.channel(started, started + Span::hours(1))).await;
    h.force(
        rec.id,
        RecordingStatus::Scheduled,
        RecordingStatus::Recording,
        RecordingPatch::default().actual_start(started),
    )
    .await;
    let segment = SegmentManager::new(&h.ctx).create_segment(&rec, None).await?;
    SegmentsService::mark_completed(&h.ctx.db, segment.id, now, Some(10)).await?;

    monitor::sweep(&h.ctx).await;
    assert_eq!(
        h.dispatcher.take(),
        vec![(Task::ProcessRecording(rec.id), None)]
    );
    Ok(())
}

#[tokio::test]
async fn test_long_recording_inside_window_is_left_alone() -> anyhow::Result<()> {
    let h = harness().await;
    let now = h.now();
    let started = now - Span::hours(13);
    // A fourteen hour event is still within its window.
    let rec = h.insert(h.channel(started, started + Span::hours(14))).await;
    h.force(
        rec.id,
        RecordingStatus::Scheduled,
        RecordingStatus::Recording,
        RecordingPatch::default().actual_start(started),
    )
    .await;
    let recent = h.live_recording().await;
    h.force(
        recent.id,
        RecordingStatus::Scheduled,
        RecordingStatus::Recording,
        RecordingPatch::default().actual_start(now - Span::hours(1)),
    )
    .await;

    assert_eq!(monitor::sweep(&h.ctx).await.stuck, 0);
    assert_eq!(h.get(rec.id).await.status, RecordingStatus::Recording);
    assert_eq!(h.get(recent.id).await.status, RecordingStatus::Recording);
    Ok(())
}

#[tokio::test]
async fn test_missed_start_within_window_is_dispatched() -> anyhow::Result<()> {
    let h = harness().await;
    let now = h.now();
    let rec = h
        .insert(h.channel(now - Span::minutes(10), now + Span::minutes(50)))
        .await;

    let report = monitor::sweep(&h.ctx).await;
    assert_eq!(report.missed_dispatched, 1);
    assert_eq!(h.dispatcher.take(), vec![(Task::StartRecording(rec.id), None)]);
    assert_eq!(h.get(rec.id).await.status, RecordingStatus::Scheduled);
    Ok(())
}

#[tokio::test]
async fn test_missed_start_after_window_is_failed() -> anyhow::Result<()> {
    let h = harness().await;
    let now = h.now();
    let rec = h
        .insert(h.channel(now - Span::hours(3), now - Span::hours(2)))
        .await;
    // Recently past its start: not missed yet.
    let fresh = h
        .insert(h.channel(now - Span::minutes(2), now + Span::hours(1)))
        .await;

    let report = monitor::sweep(&h.ctx).await;
    assert_eq!(report.missed_failed, 1);
    assert_eq!(report.missed_dispatched, 0);

    let failed = h.get(rec.id).await;
    assert_eq!(failed.status, RecordingStatus::Failed);
    assert_eq!(failed.last_error.as_deref(), Some(MISSED_MESSAGE));
    assert_eq!(failed.actual_end, Some(now));
    assert_eq!(h.get(fresh.id).await.status, RecordingStatus::Scheduled);
    Ok(())
}

#[tokio::test]
async fn test_critical_disk_cancels_scheduled_recordings() -> anyhow::Result<()> {
    let h = harness().await;
    h.disk.free.store(GIB / 2, Ordering::SeqCst);
    let now = h.now();
    let first = h.insert(h.channel(now + Span::hours(1), now + Span::hours(2))).await;
    let second = h.insert(h.channel(now + Span::hours(3), now + Span::hours(4))).await;
    let running = h.live_recording().await;
    h.force(
        running.id,
        RecordingStatus::Scheduled,
        RecordingStatus::Recording,
        RecordingPatch::default().actual_start(now),
    )
    .await;

    let report = monitor::sweep(&h.ctx).await;
    assert_eq!(report.cancelled_for_disk, 2);

    for id in [first.id, second.id] {
        let cancelled = h.get(id).await;
        assert_eq!(cancelled.status, RecordingStatus::Cancelled);
        assert_eq!(cancelled.last_error.as_deref(), Some("Insufficient disk space"));
    }
    assert_eq!(h.get(running.id).await.status, RecordingStatus::Recording);
    Ok(())
}

#[tokio::test]
async fn test_low_disk_only_warns() -> anyhow::Result<()> {
    let h = harness().await;
    h.disk.free.store(3 * GIB, Ordering::SeqCst);
    let now = h.now();
    let rec = h.insert(h.channel(now + Span::hours(1), now + Span::hours(2))).await;

    assert_eq!(monitor::sweep(&h.ctx).await.cancelled_for_disk, 0);
    assert_eq!(h.get(rec.id).await.status, RecordingStatus::Scheduled);
    Ok(())
}

#[tokio::test]
async fn test_failing_check_does_not_skip_the_rest() -> anyhow::Result<()> {
    let h = harness().await;
    let now = h.now();
    let started = now - Span::hours(13);
    let stuck = h.insert(h.channel(started, started + Span::hours(1))).await;
    h.force(
        stuck.id,
        RecordingStatus::Scheduled,
        RecordingStatus::Recording,
        RecordingPatch::default().actual_start(started),
    )
    .await;
    // An undecodable row breaks the stuck check.
    recordings::Entity::update_many()
        .col_expr(recordings::Column::SourceKind, Expr::value("bogus"))
        .filter(recordings::Column::Id.eq(stuck.id))
        .exec(&h.ctx.db)
        .await?;

    h.disk.free.store(GIB / 2, Ordering::SeqCst);
    let upcoming = h.insert(h.channel(now + Span::hours(1), now + Span::hours(2))).await;

    let report = monitor::sweep(&h.ctx).await;
    assert_eq!(report.stuck, 0);
    assert_eq!(report.cancelled_for_disk, 1);
    assert_eq!(h.get(upcoming.id).await.status, RecordingStatus::Cancelled);
    Ok(())
}
