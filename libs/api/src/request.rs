use serde::{Deserialize, Serialize};

use crate::recorder::RecordingStatus;

#[derive(Debug, Default, Serialize, Deserialize, Clone)]
pub struct QueryRecordings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<RecordingStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
}

#[derive(Debug, Default, Serialize, Deserialize, Clone)]
pub struct CancelRecording {
    /// Stored as `last_error` on the cancelled recording
    #[serde(default)]
    pub reason: Option<String>,
}
