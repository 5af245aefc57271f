use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Lifecycle status of a scheduled recording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingStatus {
    /// Waiting for its start window
    Scheduled,
    /// A capture attempt is running
    Recording,
    /// Capture finished successfully
    Completed,
    /// Last attempt failed, may be retried
    Failed,
    /// Stopped by a user or by the system, terminal
    Cancelled,
}

impl RecordingStatus {
    pub const ALL: [RecordingStatus; 5] = [
        RecordingStatus::Scheduled,
        RecordingStatus::Recording,
        RecordingStatus::Completed,
        RecordingStatus::Failed,
        RecordingStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordingStatus::Scheduled => "scheduled",
            RecordingStatus::Recording => "recording",
            RecordingStatus::Completed => "completed",
            RecordingStatus::Failed => "failed",
            RecordingStatus::Cancelled => "cancelled",
        }
    }

    /// Edges of the lifecycle graph.
    ///
    /// `scheduled -> failed` covers admission denial and missed starts,
    /// which fail a recording before any capture began. The retry edge
    /// `failed -> scheduled` is additionally bounded by `max_retries`,
    /// which the repository checks in the same statement.
    pub fn can_transition_to(&self, next: RecordingStatus) -> bool {
        use RecordingStatus::*;
        matches!(
            (self, next),
            (Scheduled, Recording)
                | (Scheduled, Failed)
                | (Scheduled, Cancelled)
                | (Recording, Completed)
                | (Recording, Failed)
                | (Recording, Cancelled)
                | (Failed, Scheduled)
        )
    }
}

impl std::fmt::Display for RecordingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordingStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(RecordingStatus::Scheduled),
            "recording" => Ok(RecordingStatus::Recording),
            "completed" => Ok(RecordingStatus::Completed),
            "failed" => Ok(RecordingStatus::Failed),
            "cancelled" => Ok(RecordingStatus::Cancelled),
            _ => Err(UnknownVariant(s.to_string())),
        }
    }
}

/// Status of one physical capture fragment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentStatus {
    Recording,
    Completed,
    Failed,
}

impl SegmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentStatus::Recording => "recording",
            SegmentStatus::Completed => "completed",
            SegmentStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for SegmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SegmentStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "recording" => Ok(SegmentStatus::Recording),
            "completed" => Ok(SegmentStatus::Completed),
            "failed" => Ok(SegmentStatus::Failed),
            _ => Err(UnknownVariant(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleType {
    #[default]
    Once,
    Series,
    Daily,
    Weekly,
}

impl ScheduleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleType::Once => "once",
            ScheduleType::Series => "series",
            ScheduleType::Daily => "daily",
            ScheduleType::Weekly => "weekly",
        }
    }
}

impl FromStr for ScheduleType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "once" => Ok(ScheduleType::Once),
            "series" => Ok(ScheduleType::Series),
            "daily" => Ok(ScheduleType::Daily),
            "weekly" => Ok(ScheduleType::Weekly),
            _ => Err(UnknownVariant(s.to_string())),
        }
    }
}

/// Kind of content a recording points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Channel,
    Episode,
    Series,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Channel => "channel",
            SourceKind::Episode => "episode",
            SourceKind::Series => "series",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "channel" => Ok(SourceKind::Channel),
            "episode" => Ok(SourceKind::Episode),
            "series" => Ok(SourceKind::Series),
            _ => Err(UnknownVariant(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant(pub String);

impl std::fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown variant: {}", self.0)
    }
}

impl std::error::Error for UnknownVariant {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states_have_no_exits() {
        for next in RecordingStatus::ALL {
            assert!(!RecordingStatus::Completed.can_transition_to(next));
            assert!(!RecordingStatus::Cancelled.can_transition_to(next));
        }
    }

    #[test]
    fn test_retry_edge_only_from_failed() {
        for from in RecordingStatus::ALL {
            let allowed = from.can_transition_to(RecordingStatus::Scheduled);
            assert_eq!(allowed, from == RecordingStatus::Failed, "{from}");
        }
    }

    #[test]
    fn test_recording_cannot_restart() {
        assert!(!RecordingStatus::Recording.can_transition_to(RecordingStatus::Recording));
        assert!(!RecordingStatus::Completed.can_transition_to(RecordingStatus::Recording));
        assert!(!RecordingStatus::Failed.can_transition_to(RecordingStatus::Recording));
    }

    #[test]
    fn test_status_string_roundtrip_matches_serde() {
        for status in RecordingStatus::ALL {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
            assert_eq!(status.as_str().parse::<RecordingStatus>().unwrap(), status);
        }
        assert!("Active".parse::<RecordingStatus>().is_err());
    }
}
