use crate::request::QueryRecordings;

pub const RECORDINGS: &str = "/api/recordings";

pub fn recordings(qry: &QueryRecordings) -> String {
    let query = serde_html_form::to_string(qry).unwrap_or_default();
    if query.is_empty() {
        RECORDINGS.to_string()
    } else {
        format!("{}?{}", RECORDINGS, query)
    }
}

pub fn recording(id: &str) -> String {
    format!("/api/recordings/{}", id)
}

pub fn recording_segments(id: &str) -> String {
    format!("/api/recordings/{}/segments", id)
}

pub fn recording_cancel(id: &str) -> String {
    format!("/api/recordings/{}/cancel", id)
}
