use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use std::path::Path;
use uuid::Uuid;

use api::recorder::SegmentStatus;

use crate::entity::recording_segments::{self, Entity as RecordingSegments};
use crate::error::RecordingError;
use crate::recording::Segment;

type Result<T> = std::result::Result<T, RecordingError>;

pub struct SegmentsService;

impl SegmentsService {
    /// `max(sequence_number) + 1`, starting at 1
    pub async fn next_sequence(db: &DatabaseConnection, recording_id: Uuid) -> Result<i32> {
        let last = RecordingSegments::find()
            .filter(recording_segments::Column::RecordingId.eq(recording_id))
            .order_by_desc(recording_segments::Column::SequenceNumber)
            .one(db)
            .await?;
        Ok(last.map(|s| s.sequence_number + 1).unwrap_or(1))
    }

    pub async fn create(
        db: &DatabaseConnection,
        recording_id: Uuid,
        sequence_number: i32,
        file_path: &Path,
        started_at: DateTime<Utc>,
    ) -> Result<Segment> {
        let model = recording_segments::ActiveModel {
            id: Set(Uuid::new_v4()),
            recording_id: Set(recording_id),
            sequence_number: Set(sequence_number),
            file_path: Set(file_path.to_string_lossy().into_owned()),
            started_ts: Set(started_at.timestamp_millis()),
            ended_ts: Set(None),
            file_size_bytes: Set(None),
            status: Set(SegmentStatus::Recording.as_str().to_string()),
            error_message: Set(None),
            created_at: Set(chrono::DateTime::<chrono::FixedOffset>::from(started_at)),
        };
        let inserted = model.insert(db).await?;
        Segment::try_from(inserted)
    }

    pub async fn update_size(db: &DatabaseConnection, id: Uuid, size: i64) -> Result<()> {
        RecordingSegments::update_many()
            .col_expr(recording_segments::Column::FileSizeBytes, Expr::value(size))
            .filter(recording_segments::Column::Id.eq(id))
            .exec(db)
            .await?;
        Ok(())
    }

    pub async fn mark_completed(
        db: &DatabaseConnection,
        id: Uuid,
        ended_at: DateTime<Utc>,
        size: Option<i64>,
    ) -> Result<()> {
        RecordingSegments::update_many()
            .col_expr(
                recording_segments::Column::Status,
                Expr::value(SegmentStatus::Completed.as_str()),
            )
            .col_expr(
                recording_segments::Column::EndedTs,
                Expr::value(ended_at.timestamp_millis()),
            )
            .col_expr(recording_segments::Column::FileSizeBytes, Expr::value(size))
            .filter(recording_segments::Column::Id.eq(id))
            .exec(db)
            .await?;
        Ok(())
    }

    pub async fn mark_failed(
        db: &DatabaseConnection,
        id: Uuid,
        ended_at: DateTime<Utc>,
        error: &str,
    ) -> Result<()> {
        RecordingSegments::update_many()
            .col_expr(
                recording_segments::Column::Status,
                Expr::value(SegmentStatus::Failed.as_str()),
            )
            .col_expr(
                recording_segments::Column::EndedTs,
                Expr::value(ended_at.timestamp_millis()),
            )
            .col_expr(
                recording_segments::Column::ErrorMessage,
                Expr::value(error.to_string()),
            )
            .filter(recording_segments::Column::Id.eq(id))
            .exec(db)
            .await?;
        Ok(())
    }

    /// All segments of a recording, by sequence
    pub async fn list(db: &DatabaseConnection, recording_id: Uuid) -> Result<Vec<Segment>> {
        let models = RecordingSegments::find()
            .filter(recording_segments::Column::RecordingId.eq(recording_id))
            .order_by_asc(recording_segments::Column::SequenceNumber)
            .all(db)
            .await?;
        models.into_iter().map(Segment::try_from).collect()
    }

    pub async fn completed(db: &DatabaseConnection, recording_id: Uuid) -> Result<Vec<Segment>> {
        let models = RecordingSegments::find()
            .filter(recording_segments::Column::RecordingId.eq(recording_id))
            .filter(recording_segments::Column::Status.eq(SegmentStatus::Completed.as_str()))
            .order_by_asc(recording_segments::Column::SequenceNumber)
            .all(db)
            .await?;
        models.into_iter().map(Segment::try_from).collect()
    }

    pub async fn has_completed(db: &DatabaseConnection, recording_id: Uuid) -> Result<bool> {
        let count = RecordingSegments::find()
            .filter(recording_segments::Column::RecordingId.eq(recording_id))
            .filter(recording_segments::Column::Status.eq(SegmentStatus::Completed.as_str()))
            .count(db)
            .await?;
        Ok(count > 0)
    }
}
