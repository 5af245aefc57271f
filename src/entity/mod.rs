pub mod recording_segments;
pub mod recordings;
