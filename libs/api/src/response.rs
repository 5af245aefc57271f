use serde::{Deserialize, Serialize};

use crate::recorder::{RecordingStatus, ScheduleType, SegmentStatus, SourceKind};

/// Recording as exposed over HTTP; instants are milliseconds since epoch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recording {
    pub id: String,
    pub source_kind: SourceKind,
    pub source_id: String,
    pub owner: String,
    pub profile_id: Option<String>,
    pub title: String,
    pub schedule_type: ScheduleType,
    pub status: RecordingStatus,
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
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    pub id: String,
    pub sequence_number: i32,
    pub file_path: String,
    pub started_ts: i64,
    pub ended_ts: Option<i64>,
    pub duration_seconds: Option<i64>,
    pub file_size_bytes: Option<i64>,
    pub status: SegmentStatus,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingsResponse {
    pub recordings: Vec<Recording>,
    pub total_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentsResponse {
    pub segments: Vec<Segment>,
}
