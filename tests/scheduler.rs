mod common;

use std::time::Duration;

use api::recorder::RecordingStatus;
use chrono::Duration as Span;
use dvrman::dispatch::Task;
use dvrman::scheduler;
use dvrman::service::{RecordingPatch, RecordingsService};

use common::harness;

#[tokio::test]
async fn test_padded_start_ahead_is_delayed() -> anyhow::Result<()> {
    let h = harness().await;
    let now = h.now();
    let mut new = h.channel(now + Span::seconds(65), now + Span::minutes(31));
    new.pre_padding_seconds = 60;
    let rec = h.insert(new).await;

    let report = scheduler::sweep(&h.ctx).await?;
    assert_eq!(report.dispatched_delayed, 1);
    assert_eq!(report.dispatched_now, 0);
    assert_eq!(
        h.dispatcher.take(),
        vec![(Task::StartRecording(rec.id), Some(Duration::from_secs(5)))]
    );
    Ok(())
}

#[tokio::test]
async fn test_padded_start_passed_dispatches_now() -> anyhow::Result<()> {
    let h = harness().await;
    let now = h.now();
    let mut new = h.channel(now + Span::seconds(5), now + Span::minutes(31));
    new.pre_padding_seconds = 60;
    let rec = h.insert(new).await;

    let report = scheduler::sweep(&h.ctx).await?;
    assert_eq!(report.dispatched_now, 1);
    assert_eq!(h.dispatcher.take(), vec![(Task::StartRecording(rec.id), None)]);
    Ok(())
}

#[tokio::test]
async fn test_window_bounds() -> anyhow::Result<()> {
    let h = harness().await;
    let now = h.now();
    // Too far ahead, and too far behind for the scheduler.
    h.insert(h.channel(now + Span::minutes(3), now + Span::hours(1))).await;
    h.insert(h.channel(now - Span::minutes(2), now + Span::hours(1))).await;
    // Both edges are inclusive.
    let ahead = h.insert(h.channel(now + Span::seconds(120), now + Span::hours(1))).await;
    let behind = h.insert(h.channel(now - Span::seconds(60), now + Span::hours(1))).await;

    scheduler::sweep(&h.ctx).await?;
    let mut ids: Vec<_> = h.dispatcher.take().into_iter().map(|(t, _)| t.recording_id()).collect();
    ids.sort();
    let mut expected = vec![ahead.id, behind.id];
    expected.sort();
    assert_eq!(ids, expected);
    Ok(())
}

#[tokio::test]
async fn test_non_scheduled_recordings_are_not_dispatched() -> anyhow::Result<()> {
    let h = harness().await;
    let now = h.now();
    let rec = h.insert(h.channel(now + Span::seconds(30), now + Span::hours(1))).await;
    h.force(
        rec.id,
        RecordingStatus::Scheduled,
        RecordingStatus::Cancelled,
        RecordingPatch::default(),
    )
    .await;

    let report = scheduler::sweep(&h.ctx).await?;
    assert_eq!(report, scheduler::SweepReport::default());
    assert!(h.dispatcher.take().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_retries_are_bounded_and_spaced() -> anyhow::Result<()> {
    let h = harness().await;
    let now = h.now();
    // Far enough ahead that only the retry path picks it up.
    let rec = h.insert(h.channel(now + Span::days(1), now + Span::days(1) + Span::hours(1))).await;
    let fail = |h: &common::Harness| {
        let id = rec.id;
        let db = h.ctx.db.clone();
        let now = h.now();
        async move {
            assert!(RecordingsService::transition(
                &db,
                id,
                RecordingStatus::Scheduled,
                RecordingStatus::Failed,
                RecordingPatch::default().last_error("boom"),
                now,
            )
            .await
            .unwrap());
        }
    };

    fail(&h).await;
    for attempt in 1..=3 {
        let report = scheduler::sweep(&h.ctx).await?;
        assert_eq!(report.retried, 1, "attempt {}", attempt);
        assert_eq!(h.dispatcher.take(), vec![(Task::StartRecording(rec.id), None)]);

        let retried = h.get(rec.id).await;
        assert_eq!(retried.status, RecordingStatus::Scheduled);
        assert_eq!(retried.retry_count, attempt);
        assert_eq!(retried.last_retry_at, Some(h.now()));

        fail(&h).await;
        // Within the backoff nothing happens.
        h.clock.advance(Span::minutes(4));
        assert_eq!(scheduler::sweep(&h.ctx).await?.retried, 0);
        h.clock.advance(Span::minutes(1));
    }

    assert_eq!(scheduler::sweep(&h.ctx).await?.retried, 0);
    let exhausted = h.get(rec.id).await;
    assert_eq!(exhausted.status, RecordingStatus::Failed);
    assert_eq!(exhausted.retry_count, exhausted.max_retries);
    assert!(!RecordingsService::retry(&h.ctx.db, rec.id, h.now()).await?);
    Ok(())
}

#[tokio::test]
async fn test_zero_max_retries_never_retries() -> anyhow::Result<()> {
    let h = harness().await;
    let now = h.now();
    let mut new = h.channel(now + Span::days(1), now + Span::days(1) + Span::hours(1));
    new.max_retries = 0;
    let rec = h.insert(new).await;
    h.force(
        rec.id,
        RecordingStatus::Scheduled,
        RecordingStatus::Failed,
        RecordingPatch::default(),
    )
    .await;

    assert_eq!(scheduler::sweep(&h.ctx).await?.retried, 0);
    assert_eq!(h.get(rec.id).await.status, RecordingStatus::Failed);
    Ok(())
}
