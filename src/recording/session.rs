//! Recording session value object.
//!
//! A `RecordingSession` is created at "start recording" and consumed at
//! "stop recording", where it becomes an immutable `SessionSnapshot` handed
//! to the video library.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{DetectionEvent, ScanResult};

use super::{clock::SessionClock, dedup::DetectionDeduplicator};

#[derive(Debug)]
pub struct RecordingSession {
    id: String,
    clock: SessionClock,
    detections: DetectionDeduplicator,
    notes: String,
}

impl RecordingSession {
    pub fn start() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            clock: SessionClock::start(),
            detections: DetectionDeduplicator::new(),
            notes: String::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn clock(&self) -> SessionClock {
        self.clock
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.clock.started_at()
    }

    pub fn elapsed(&self) -> f64 {
        self.clock.elapsed()
    }

    /// Feed a scan stamped with its session time.
    pub fn accept(&mut self, scan: ScanResult, time: f64) -> Option<DetectionEvent> {
        self.detections.accept(scan, time)
    }

    pub fn events(&self) -> &[DetectionEvent] {
        self.detections.events()
    }

    pub fn notes(&self) -> &str {
        &self.notes
    }

    pub fn set_notes(&mut self, notes: impl Into<String>) {
        self.notes = notes.into();
    }

    pub fn finish(self) -> SessionSnapshot {
        let duration_secs = self.clock.elapsed();
        let stopped_at = Utc::now();
        SessionSnapshot {
            id: self.id,
            started_at: self.clock.started_at(),
            stopped_at,
            duration_secs,
            events: self.detections.into_events(),
            notes: self.notes,
        }
    }
}

/// Finalized, read-only view of a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub stopped_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub events: Vec<DetectionEvent>,
    pub notes: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::QrCorners;

    #[test]
    fn new_session_starts_empty() {
        let session = RecordingSession::start();
        assert!(session.events().is_empty());
        assert!(session.notes().is_empty());
        assert!(!session.id().is_empty());
    }

    #[test]
    fn finish_keeps_events_in_detection_order() {
        let mut session = RecordingSession::start();
        session.accept(ScanResult::new("B", QrCorners::default()), 2.0);
        session.accept(ScanResult::new("A", QrCorners::default()), 1.0);
        session.accept(ScanResult::new("B", QrCorners::default()), 2.0);
        session.set_notes("box 7");

        let snapshot = session.finish();
        assert_eq!(snapshot.events.len(), 2);
        assert_eq!(snapshot.events[0].text, "B");
        assert_eq!(snapshot.events[1].text, "A");
        assert_eq!(snapshot.notes, "box 7");
        assert!(snapshot.stopped_at >= snapshot.started_at);
    }

    #[test]
    fn sessions_do_not_share_state() {
        let mut first = RecordingSession::start();
        first.accept(ScanResult::new("A", QrCorners::default()), 1.0);
        let mut second = RecordingSession::start();
        assert!(second.accept(ScanResult::new("A", QrCorners::default()), 1.0).is_some());
        assert_ne!(first.id(), second.id());
    }
}
