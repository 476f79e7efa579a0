use std::collections::HashSet;

use crate::models::{DetectionEvent, ScanResult};

/// Identity of a detection: payload text plus time in hundredths of a second.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    text: String,
    centis: i64,
}

impl DedupKey {
    pub fn new(text: &str, time: f64) -> Self {
        Self {
            text: text.to_string(),
            centis: (time * 100.0).round() as i64,
        }
    }
}

/// Collapses the per-frame scan stream into discrete detection events.
///
/// Owns the key set and the ordered event list for exactly one session.
#[derive(Debug, Default)]
pub struct DetectionDeduplicator {
    seen: HashSet<DedupKey>,
    events: Vec<DetectionEvent>,
}

impl DetectionDeduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a positive scan at `time` session seconds. Returns the new event,
    /// or `None` if an event with the same key was already recorded.
    pub fn accept(&mut self, scan: ScanResult, time: f64) -> Option<DetectionEvent> {
        let key = DedupKey::new(&scan.text, time);
        if !self.seen.insert(key) {
            return None;
        }

        let event = DetectionEvent::from_scan(scan, time);
        self.events.push(event.clone());
        Some(event)
    }

    pub fn events(&self) -> &[DetectionEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn into_events(self) -> Vec<DetectionEvent> {
        self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::QrCorners;

    fn scan(text: &str) -> ScanResult {
        ScanResult::new(text, QrCorners::default())
    }

    #[test]
    fn same_text_and_time_is_recorded_once() {
        let mut dedup = DetectionDeduplicator::new();
        assert!(dedup.accept(scan("ORDER-42"), 3.5).is_some());
        assert!(dedup.accept(scan("ORDER-42"), 3.5).is_none());
        assert_eq!(dedup.len(), 1);
    }

    #[test]
    fn times_equal_after_rounding_share_a_key() {
        let mut dedup = DetectionDeduplicator::new();
        assert!(dedup.accept(scan("A"), 1.231).is_some());
        assert!(dedup.accept(scan("A"), 1.229).is_none());
        assert_eq!(dedup.events().len(), 1);
        assert_eq!(dedup.events()[0].time, 1.231);
    }

    #[test]
    fn different_time_or_text_is_a_new_event() {
        let mut dedup = DetectionDeduplicator::new();
        assert!(dedup.accept(scan("A"), 1.0).is_some());
        assert!(dedup.accept(scan("A"), 1.01).is_some());
        assert!(dedup.accept(scan("B"), 1.0).is_some());
        assert_eq!(dedup.len(), 3);
    }

    #[test]
    fn repeated_stream_keeps_first_occurrence_in_order() {
        let mut dedup = DetectionDeduplicator::new();
        let stream = [("X", 0.5), ("Y", 0.75), ("X", 0.5), ("Y", 0.75), ("X", 2.0)];
        for (text, time) in stream {
            dedup.accept(scan(text), time);
        }
        let texts: Vec<_> = dedup
            .events()
            .iter()
            .map(|e| (e.text.as_str(), e.time))
            .collect();
        assert_eq!(texts, vec![("X", 0.5), ("Y", 0.75), ("X", 2.0)]);
    }
}
