use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure modes of the external calendar lookup. Every variant is
/// recoverable for the availability search: the orchestrator logs it and
/// treats the day as having no external busy intervals.
#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("Calendar adapter not configured")]
    NotConfigured,

    #[error("Calendar adapter configuration error: {0}")]
    Configuration(String),

    #[error("Calendar request timed out")]
    Timeout,

    #[error("Calendar API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Calendar transport error: {0}")]
    Http(String),

    #[error("Invalid calendar response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Serialize)]
pub struct FreeBusyRequest {
    pub calendar_id: String,
    pub date: NaiveDate,
}

/// One busy window as reported by the calendar provider, RFC 3339 instants.
#[derive(Debug, Clone, Deserialize)]
pub struct BusyWindow {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Deserialize)]
pub struct FreeBusyResponse {
    pub busy: Vec<BusyWindow>,
}
