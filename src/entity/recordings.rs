use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "recordings")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub source_kind: String, // channel, episode, series
    pub source_id: String,
    pub owner: String,
    pub profile_id: Option<String>,
    pub title: String,
    pub schedule_type: String,
    pub status: String, // scheduled, recording, completed, failed, cancelled
    pub scheduled_start_ts: i64,
    pub scheduled_end_ts: i64,
    pub pre_padding_seconds: i64,
    pub post_padding_seconds: i64,
    pub actual_start_ts: Option<i64>,
    pub actual_end_ts: Option<i64>,
    pub output_path: Option<String>,
    pub file_size_bytes: Option<i64>,
    pub duration_seconds: Option<i64>,
    pub retry_count: i32,
    pub max_retries: i32,
    pub last_error: Option<String>,
    pub last_retry_ts: Option<i64>,
    pub metadata: Option<String>, // JSON object
    pub deleted_ts: Option<i64>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
