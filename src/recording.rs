use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde_json::{Map, Value};
use uuid::Uuid;

use api::recorder::{RecordingStatus, ScheduleType, SegmentStatus, SourceKind};

use crate::entity::{recording_segments, recordings};
use crate::error::RecordingError;

pub const METADATA_STREAM_ID: &str = "stream_id";
pub const METADATA_PROXY_URL: &str = "proxy_url";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceRef {
    pub kind: SourceKind,
    pub id: String,
}

impl SourceRef {
    pub fn new(kind: SourceKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Recording {
    pub id: Uuid,
    pub source: SourceRef,
    pub owner: String,
    pub profile_id: Option<String>,
    pub title: String,
    pub schedule_type: ScheduleType,
    pub status: RecordingStatus,
    pub scheduled_start: DateTime<Utc>,
    pub scheduled_end: DateTime<Utc>,
    pub pre_padding_seconds: i64,
    pub post_padding_seconds: i64,
    pub actual_start: Option<DateTime<Utc>>,
    pub actual_end: Option<DateTime<Utc>>,
    pub output_path: Option<PathBuf>,
    pub file_size_bytes: Option<i64>,
    pub duration_seconds: Option<i64>,
    pub retry_count: i32,
    pub max_retries: i32,
    pub last_error: Option<String>,
    pub last_retry_at: Option<DateTime<Utc>>,
    pub metadata: Map<String, Value>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Recording {
    pub fn padded_start(&self) -> DateTime<Utc> {
        self.scheduled_start - Duration::seconds(self.pre_padding_seconds)
    }

    pub fn padded_end(&self) -> DateTime<Utc> {
        self.scheduled_end + Duration::seconds(self.post_padding_seconds)
    }

    /// Scheduled window plus both paddings
    pub fn total_duration_seconds(&self) -> i64 {
        (self.scheduled_end - self.scheduled_start).num_seconds()
            + self.pre_padding_seconds
            + self.post_padding_seconds
    }

    /// Seconds captured from `actual_start` up to `until`, once started
    pub fn captured_seconds(&self, until: DateTime<Utc>) -> Option<i64> {
        self.actual_start
            .map(|start| (until - start).num_seconds().max(0))
    }

    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }

    pub fn to_api(&self) -> api::response::Recording {
        api::response::Recording {
            id: self.id.to_string(),
            source_kind: self.source.kind,
            source_id: self.source.id.clone(),
            owner: self.owner.clone(),
            profile_id: self.profile_id.clone(),
            title: self.title.clone(),
            schedule_type: self.schedule_type,
            status: self.status,
            scheduled_start_ts: self.scheduled_start.timestamp_millis(),
            scheduled_end_ts: self.scheduled_end.timestamp_millis(),
            pre_padding_seconds: self.pre_padding_seconds,
            post_padding_seconds: self.post_padding_seconds,
            actual_start_ts: self.actual_start.map(|t| t.timestamp_millis()),
            actual_end_ts: self.actual_end.map(|t| t.timestamp_millis()),
            output_path: self
                .output_path
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned()),
            file_size_bytes: self.file_size_bytes,
            duration_seconds: self.duration_seconds,
            retry_count: self.retry_count,
            max_retries: self.max_retries,
            last_error: self.last_error.clone(),
            last_retry_ts: self.last_retry_at.map(|t| t.timestamp_millis()),
        }
    }
}

impl TryFrom<recordings::Model> for Recording {
    type Error = RecordingError;

    fn try_from(m: recordings::Model) -> Result<Self, Self::Error> {
        let metadata = match m.metadata.as_deref() {
            Some(raw) if !raw.is_empty() => match serde_json::from_str::<Value>(raw) {
                Ok(Value::Object(map)) => map,
                Ok(_) => Map::new(),
                Err(e) => {
                    return Err(anyhow::anyhow!("recording {} metadata: {}", m.id, e).into())
                }
            },
            _ => Map::new(),
        };

        Ok(Self {
            id: m.id,
            source: SourceRef {
                kind: SourceKind::from_str(&m.source_kind).map_err(anyhow::Error::from)?,
                id: m.source_id,
            },
            owner: m.owner,
            profile_id: m.profile_id,
            title: m.title,
            schedule_type: ScheduleType::from_str(&m.schedule_type)
                .map_err(anyhow::Error::from)?,
            status: RecordingStatus::from_str(&m.status).map_err(anyhow::Error::from)?,
            scheduled_start: from_ts(m.scheduled_start_ts),
            scheduled_end: from_ts(m.scheduled_end_ts),
            pre_padding_seconds: m.pre_padding_seconds,
            post_padding_seconds: m.post_padding_seconds,
            actual_start: m.actual_start_ts.map(from_ts),
            actual_end: m.actual_end_ts.map(from_ts),
            output_path: m.output_path.map(PathBuf::from),
            file_size_bytes: m.file_size_bytes,
            duration_seconds: m.duration_seconds,
            retry_count: m.retry_count,
            max_retries: m.max_retries,
            last_error: m.last_error,
            last_retry_at: m.last_retry_ts.map(from_ts),
            metadata,
            deleted_at: m.deleted_ts.map(from_ts),
        })
    }
}

#[derive(Debug, Clone)]
pub struct Segment {
    pub id: Uuid,
    pub recording_id: Uuid,
    pub sequence_number: i32,
    pub file_path: PathBuf,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub file_size_bytes: Option<i64>,
    pub status: SegmentStatus,
    pub error_message: Option<String>,
}

impl Segment {
    pub fn duration_seconds(&self) -> Option<i64> {
        self.ended_at
            .map(|end| (end - self.started_at).num_seconds().max(0))
    }

    pub fn to_api(&self) -> api::response::Segment {
        api::response::Segment {
            id: self.id.to_string(),
            sequence_number: self.sequence_number,
            file_path: self.file_path.to_string_lossy().into_owned(),
            started_ts: self.started_at.timestamp_millis(),
            ended_ts: self.ended_at.map(|t| t.timestamp_millis()),
            duration_seconds: self.duration_seconds(),
            file_size_bytes: self.file_size_bytes,
            status: self.status,
            error_message: self.error_message.clone(),
        }
    }
}

impl TryFrom<recording_segments::Model> for Segment {
    type Error = RecordingError;

    fn try_from(m: recording_segments::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: m.id,
            recording_id: m.recording_id,
            sequence_number: m.sequence_number,
            file_path: PathBuf::from(m.file_path),
            started_at: from_ts(m.started_ts),
            ended_at: m.ended_ts.map(from_ts),
            file_size_bytes: m.file_size_bytes,
            status: SegmentStatus::from_str(&m.status).map_err(anyhow::Error::from)?,
            error_message: m.error_message,
        })
    }
}

pub fn from_ts(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}
