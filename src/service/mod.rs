pub mod database;
pub mod recordings;
pub mod segments;

pub use database::DatabaseService;
pub use recordings::{NewRecording, RecordingPatch, RecordingsService};
pub use segments::SegmentsService;
