//! Persisted recording rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::DetectionEvent;

/// A saved recording together with its detection timeline, ordered by
/// session time of first sighting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Recording {
    pub id: String,
    pub filename: String,
    pub path: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    pub duration_secs: Option<f64>,
    pub notes: Option<String>,
    pub detections: Vec<DetectionEvent>,
}

/// Values needed to insert a recording; the row id is generated on insert.
#[derive(Debug, Clone)]
pub struct NewRecording {
    pub filename: String,
    pub path: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    pub duration_secs: Option<f64>,
    pub notes: Option<String>,
    pub detections: Vec<DetectionEvent>,
}
