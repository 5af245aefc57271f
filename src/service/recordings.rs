use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde_json::{Map, Value};
use std::path::Path;
use uuid::Uuid;

use api::recorder::{RecordingStatus, ScheduleType};
use api::request::QueryRecordings;

use crate::entity::recordings::{self, Entity as Recordings};
use crate::error::RecordingError;
use crate::recording::{Recording, SourceRef};

type Result<T> = std::result::Result<T, RecordingError>;

pub const DEFAULT_MAX_RETRIES: i32 = 3;

#[derive(Debug, Clone)]
pub struct NewRecording {
    pub source: SourceRef,
    pub owner: String,
    pub profile_id: Option<String>,
    pub title: String,
    pub schedule_type: ScheduleType,
    pub scheduled_start: DateTime<Utc>,
    pub scheduled_end: DateTime<Utc>,
    pub pre_padding_seconds: i64,
    pub post_padding_seconds: i64,
    pub max_retries: i32,
}

impl NewRecording {
    pub fn new(
        source: SourceRef,
        title: impl Into<String>,
        scheduled_start: DateTime<Utc>,
        scheduled_end: DateTime<Utc>,
    ) -> Self {
        Self {
            source,
            owner: String::new(),
            profile_id: None,
            title: title.into(),
            schedule_type: ScheduleType::Once,
            scheduled_start,
            scheduled_end,
            pre_padding_seconds: 0,
            post_padding_seconds: 0,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

/// Columns written together with a status change.
///
/// `Some(None)` clears a nullable column.
#[derive(Debug, Clone, Default)]
pub struct RecordingPatch {
    actual_start: Option<Option<i64>>,
    actual_end: Option<Option<i64>>,
    duration_seconds: Option<Option<i64>>,
    last_error: Option<Option<String>>,
}

impl RecordingPatch {
    pub fn actual_start(mut self, at: DateTime<Utc>) -> Self {
        self.actual_start = Some(Some(at.timestamp_millis()));
        self
    }

    pub fn actual_end(mut self, at: DateTime<Utc>) -> Self {
        self.actual_end = Some(Some(at.timestamp_millis()));
        self
    }

    pub fn clear_actual_end(mut self) -> Self {
        self.actual_end = Some(None);
        self
    }

    pub fn duration_seconds(mut self, seconds: i64) -> Self {
        self.duration_seconds = Some(Some(seconds));
        self
    }

    pub fn last_error(mut self, msg: impl Into<String>) -> Self {
        self.last_error = Some(Some(msg.into()));
        self
    }

    pub fn clear_last_error(mut self) -> Self {
        self.last_error = Some(None);
        self
    }
}

pub struct RecordingsService;

impl RecordingsService {
    pub async fn create(
        db: &DatabaseConnection,
        new: NewRecording,
        now: DateTime<Utc>,
    ) -> Result<Recording> {
        if new.pre_padding_seconds < 0 || new.post_padding_seconds < 0 {
            return Err(anyhow::anyhow!("padding must not be negative").into());
        }
        if new.max_retries < 0 {
            return Err(anyhow::anyhow!("max_retries must not be negative").into());
        }
        if new.scheduled_end < new.scheduled_start {
            return Err(anyhow::anyhow!("scheduled_end precedes scheduled_start").into());
        }

        let stamp = chrono::DateTime::<chrono::FixedOffset>::from(now);
        let model = recordings::ActiveModel {
            id: Set(Uuid::new_v4()),
            source_kind: Set(new.source.kind.as_str().to_string()),
            source_id: Set(new.source.id),
            owner: Set(new.owner),
            profile_id: Set(new.profile_id),
            title: Set(new.title),
            schedule_type: Set(new.schedule_type.as_str().to_string()),
            status: Set(RecordingStatus::Scheduled.as_str().to_string()),
            scheduled_start_ts: Set(new.scheduled_start.timestamp_millis()),
            scheduled_end_ts: Set(new.scheduled_end.timestamp_millis()),
            pre_padding_seconds: Set(new.pre_padding_seconds),
            post_padding_seconds: Set(new.post_padding_seconds),
            actual_start_ts: Set(None),
            actual_end_ts: Set(None),
            output_path: Set(None),
            file_size_bytes: Set(None),
            duration_seconds: Set(None),
            retry_count: Set(0),
            max_retries: Set(new.max_retries),
            last_error: Set(None),
            last_retry_ts: Set(None),
            metadata: Set(None),
            deleted_ts: Set(None),
            created_at: Set(stamp),
            updated_at: Set(stamp),
        };

        let inserted = model.insert(db).await?;
        Recording::try_from(inserted)
    }

    /// Live (not tombstoned) recording by id
    pub async fn get(db: &DatabaseConnection, id: Uuid) -> Result<Option<Recording>> {
        Recordings::find()
            .filter(recordings::Column::Id.eq(id))
            .filter(recordings::Column::DeletedTs.is_null())
            .one(db)
            .await?
            .map(Recording::try_from)
            .transpose()
    }

    pub async fn list(
        db: &DatabaseConnection,
        params: &QueryRecordings,
    ) -> Result<(Vec<Recording>, u64)> {
        let mut query = Recordings::find().filter(recordings::Column::DeletedTs.is_null());
        if let Some(status) = params.status {
            query = query.filter(recordings::Column::Status.eq(status.as_str()));
        }

        let total = query.clone().count(db).await?;

        query = query.order_by_desc(recordings::Column::ScheduledStartTs);
        if let Some(limit) = params.limit {
            query = query.limit(limit);
        }
        if let Some(offset) = params.offset {
            query = query.offset(offset);
        }

        let recordings = collect(query.all(db).await?)?;
        Ok((recordings, total))
    }

    pub async fn find_by_status(
        db: &DatabaseConnection,
        status: RecordingStatus,
    ) -> Result<Vec<Recording>> {
        let models = Recordings::find()
            .filter(recordings::Column::Status.eq(status.as_str()))
            .filter(recordings::Column::DeletedTs.is_null())
            .order_by_asc(recordings::Column::ScheduledStartTs)
            .all(db)
            .await?;
        collect(models)
    }

    /// `scheduled` recordings whose padded start lies in `[from, to]`
    pub async fn due_in_window(
        db: &DatabaseConnection,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Recording>> {
        let models = Recordings::find()
            .filter(recordings::Column::Status.eq(RecordingStatus::Scheduled.as_str()))
            .filter(recordings::Column::DeletedTs.is_null())
            .filter(Expr::cust_with_values(
                "(scheduled_start_ts - pre_padding_seconds * 1000) BETWEEN ? AND ?",
                [from.timestamp_millis(), to.timestamp_millis()],
            ))
            .order_by_asc(recordings::Column::ScheduledStartTs)
            .all(db)
            .await?;
        collect(models)
    }

    /// `failed` recordings with retries left whose last retry is at or before `retried_before`
    pub async fn retry_candidates(
        db: &DatabaseConnection,
        retried_before: DateTime<Utc>,
    ) -> Result<Vec<Recording>> {
        let models = Recordings::find()
            .filter(recordings::Column::Status.eq(RecordingStatus::Failed.as_str()))
            .filter(recordings::Column::DeletedTs.is_null())
            .filter(Expr::col(recordings::Column::RetryCount).lt(Expr::col(recordings::Column::MaxRetries)))
            .filter(
                Condition::any()
                    .add(recordings::Column::LastRetryTs.is_null())
                    .add(recordings::Column::LastRetryTs.lte(retried_before.timestamp_millis())),
            )
            .all(db)
            .await?;
        collect(models)
    }

    /// `recording` entries whose capture began before `started_before`
    pub async fn started_before(
        db: &DatabaseConnection,
        started_before: DateTime<Utc>,
    ) -> Result<Vec<Recording>> {
        let models = Recordings::find()
            .filter(recordings::Column::Status.eq(RecordingStatus::Recording.as_str()))
            .filter(recordings::Column::DeletedTs.is_null())
            .filter(recordings::Column::ActualStartTs.lt(started_before.timestamp_millis()))
            .all(db)
            .await?;
        collect(models)
    }

    /// `scheduled` entries whose start is before `cutoff`
    pub async fn scheduled_before(
        db: &DatabaseConnection,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Recording>> {
        let models = Recordings::find()
            .filter(recordings::Column::Status.eq(RecordingStatus::Scheduled.as_str()))
            .filter(recordings::Column::DeletedTs.is_null())
            .filter(recordings::Column::ScheduledStartTs.lt(cutoff.timestamp_millis()))
            .all(db)
            .await?;
        collect(models)
    }

    /// Compare-and-set the status from `from` to `to`, writing `patch` in the same statement.
    ///
    /// Returns `false` when the stored status was no longer `from`.
    pub async fn transition(
        db: &DatabaseConnection,
        id: Uuid,
        from: RecordingStatus,
        to: RecordingStatus,
        patch: RecordingPatch,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        if !from.can_transition_to(to) {
            return Err(RecordingError::IllegalTransition { from, to });
        }

        let mut update = Recordings::update_many()
            .col_expr(recordings::Column::Status, Expr::value(to.as_str()))
            .col_expr(
                recordings::Column::UpdatedAt,
                Expr::value(chrono::DateTime::<chrono::FixedOffset>::from(now)),
            );
        if let Some(v) = patch.actual_start {
            update = update.col_expr(recordings::Column::ActualStartTs, Expr::value(v));
        }
        if let Some(v) = patch.actual_end {
            update = update.col_expr(recordings::Column::ActualEndTs, Expr::value(v));
        }
        if let Some(v) = patch.duration_seconds {
            update = update.col_expr(recordings::Column::DurationSeconds, Expr::value(v));
        }
        if let Some(v) = patch.last_error {
            update = update.col_expr(recordings::Column::LastError, Expr::value(v));
        }

        let result = update
            .filter(recordings::Column::Id.eq(id))
            .filter(recordings::Column::Status.eq(from.as_str()))
            .filter(recordings::Column::DeletedTs.is_null())
            .exec(db)
            .await?;

        Ok(result.rows_affected == 1)
    }

    /// Atomic `failed -> scheduled` requeue, bounded by `max_retries`
    pub async fn retry(db: &DatabaseConnection, id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        let result = Recordings::update_many()
            .col_expr(
                recordings::Column::Status,
                Expr::value(RecordingStatus::Scheduled.as_str()),
            )
            .col_expr(
                recordings::Column::RetryCount,
                Expr::col(recordings::Column::RetryCount).add(1),
            )
            .col_expr(
                recordings::Column::LastRetryTs,
                Expr::value(now.timestamp_millis()),
            )
            .col_expr(
                recordings::Column::UpdatedAt,
                Expr::value(chrono::DateTime::<chrono::FixedOffset>::from(now)),
            )
            .filter(recordings::Column::Id.eq(id))
            .filter(recordings::Column::Status.eq(RecordingStatus::Failed.as_str()))
            .filter(recordings::Column::DeletedTs.is_null())
            .filter(Expr::col(recordings::Column::RetryCount).lt(Expr::col(recordings::Column::MaxRetries)))
            .exec(db)
            .await?;

        Ok(result.rows_affected == 1)
    }

    pub async fn set_output(
        db: &DatabaseConnection,
        id: Uuid,
        path: &Path,
        size: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        Recordings::update_many()
            .col_expr(
                recordings::Column::OutputPath,
                Expr::value(path.to_string_lossy().into_owned()),
            )
            .col_expr(recordings::Column::FileSizeBytes, Expr::value(size))
            .col_expr(
                recordings::Column::UpdatedAt,
                Expr::value(chrono::DateTime::<chrono::FixedOffset>::from(now)),
            )
            .filter(recordings::Column::Id.eq(id))
            .exec(db)
            .await?;
        Ok(())
    }

    pub async fn set_metadata(
        db: &DatabaseConnection,
        id: Uuid,
        metadata: &Map<String, Value>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let raw = serde_json::to_string(metadata).map_err(anyhow::Error::from)?;
        Recordings::update_many()
            .col_expr(recordings::Column::Metadata, Expr::value(raw))
            .col_expr(
                recordings::Column::UpdatedAt,
                Expr::value(chrono::DateTime::<chrono::FixedOffset>::from(now)),
            )
            .filter(recordings::Column::Id.eq(id))
            .exec(db)
            .await?;
        Ok(())
    }

    /// Tombstone; the row stays for history
    pub async fn mark_deleted(
        db: &DatabaseConnection,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let result = Recordings::update_many()
            .col_expr(
                recordings::Column::DeletedTs,
                Expr::value(now.timestamp_millis()),
            )
            .col_expr(
                recordings::Column::UpdatedAt,
                Expr::value(chrono::DateTime::<chrono::FixedOffset>::from(now)),
            )
            .filter(recordings::Column::Id.eq(id))
            .filter(recordings::Column::DeletedTs.is_null())
            .exec(db)
            .await?;
        Ok(result.rows_affected == 1)
    }
}

fn collect(models: Vec<recordings::Model>) -> Result<Vec<Recording>> {
    models.into_iter().map(Recording::try_from).collect()
}
