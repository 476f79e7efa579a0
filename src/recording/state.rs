use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{db::Recording, models::DetectionEvent};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum RecorderStatus {
    #[default]
    Idle,
    Recording,
}

#[derive(Debug, Clone, Serialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct RecorderSnapshot {
    pub status: RecorderStatus,
    pub session_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub elapsed_secs: f64,
    pub detections: usize,
    pub notes: String,
}

impl RecorderSnapshot {
    pub fn idle() -> Self {
        Self::default()
    }
}

/// Notifications broadcast by the recording controller.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RecorderEvent {
    StateChanged { snapshot: RecorderSnapshot },
    Heartbeat { elapsed_secs: f64, detections: usize },
    Detection { event: DetectionEvent },
    SessionSaved { recording: Recording },
    SessionDiscarded { session_id: String },
}
