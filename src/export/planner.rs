//! Segment planning.
//!
//! Detection-driven planning yields one fixed-length window per detection,
//! never merged even when windows overlap. Manual planning yields one
//! user-chosen interval and enforces a minimum length. The two paths keep
//! separate validation rules.

use serde::Serialize;

use crate::models::DetectionEvent;

use super::{config::ExportPolicy, error::ExportError};

/// `[start, end)` in session seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SegmentSource {
    Detection { text: String, time: f64 },
    Manual,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSegment {
    /// 1-based position of the detection in its recording, or 1 for a manual
    /// range.
    pub ordinal: usize,
    pub source: SegmentSource,
    pub range: TimeRange,
    pub label: String,
}

impl ExportSegment {
    /// Output file name for a clip cut from the video named `stem`.
    pub fn output_filename(&self, stem: &str, ext: &str) -> String {
        match self.source {
            SegmentSource::Detection { .. } => format!("{stem}_QR_{}.{ext}", self.label),
            SegmentSource::Manual => format!(
                "{stem}_clip_{}_{}.{ext}",
                format_mm_ss(self.range.start).replace(':', "-"),
                format_mm_ss(self.range.end).replace(':', "-"),
            ),
        }
    }
}

/// One window per detection, in input order: `start = max(0, t - lead)`,
/// `end = start + window`. The end is not clamped to the video length.
pub fn plan_from_detections(
    events: &[DetectionEvent],
    lead_secs: f64,
    window_secs: f64,
) -> Vec<ExportSegment> {
    events
        .iter()
        .enumerate()
        .map(|(index, event)| detection_segment(index + 1, event, lead_secs, window_secs))
        .collect()
}

/// Like [`plan_from_detections`] but only for the given 1-based ordinals.
/// Ordinals keep their position in the full list, so labels stay stable.
pub fn plan_selected_detections(
    events: &[DetectionEvent],
    ordinals: &[usize],
    lead_secs: f64,
    window_secs: f64,
) -> Result<Vec<ExportSegment>, ExportError> {
    ordinals
        .iter()
        .map(|&ordinal| {
            let event = ordinal
                .checked_sub(1)
                .and_then(|index| events.get(index))
                .ok_or(ExportError::UnknownDetection {
                    ordinal,
                    count: events.len(),
                })?;
            Ok(detection_segment(ordinal, event, lead_secs, window_secs))
        })
        .collect()
}

fn detection_segment(
    ordinal: usize,
    event: &DetectionEvent,
    lead_secs: f64,
    window_secs: f64,
) -> ExportSegment {
    let start = (event.time - lead_secs).max(0.0);
    ExportSegment {
        ordinal,
        source: SegmentSource::Detection {
            text: event.text.clone(),
            time: event.time,
        },
        range: TimeRange {
            start,
            end: start + window_secs,
        },
        label: format!("{ordinal}_{}", sanitize(&event.text)),
    }
}

/// A single segment for a user-picked range. Endpoint order is not trusted;
/// negative times are clamped to zero.
pub fn plan_from_range(
    start: f64,
    end: f64,
    min_secs: f64,
) -> Result<Vec<ExportSegment>, ExportError> {
    let invalid = || ExportError::InvalidRange {
        start,
        end,
        min: min_secs,
    };

    if !start.is_finite() || !end.is_finite() {
        return Err(invalid());
    }

    let lo = start.min(end).max(0.0);
    let hi = start.max(end).max(0.0);
    // tolerate float noise so e.g. 5.0..5.1 counts as 0.1s
    if hi - lo + 1e-9 < min_secs {
        return Err(invalid());
    }

    Ok(vec![ExportSegment {
        ordinal: 1,
        source: SegmentSource::Manual,
        range: TimeRange { start: lo, end: hi },
        label: format!("{}-{}", format_mm_ss(lo), format_mm_ss(hi)),
    }])
}

impl ExportPolicy {
    pub fn plan_detections(&self, events: &[DetectionEvent]) -> Vec<ExportSegment> {
        plan_from_detections(events, self.lead_secs, self.window_secs)
    }

    pub fn plan_selected(
        &self,
        events: &[DetectionEvent],
        ordinals: &[usize],
    ) -> Result<Vec<ExportSegment>, ExportError> {
        plan_selected_detections(events, ordinals, self.lead_secs, self.window_secs)
    }

    pub fn plan_range(&self, start: f64, end: f64) -> Result<Vec<ExportSegment>, ExportError> {
        plan_from_range(start, end, self.min_range_secs)
    }
}

/// Replace everything outside `[A-Za-z0-9]` with `_`.
pub fn sanitize(text: &str) -> String {
    text.chars()
        .map(|ch| if ch.is_ascii_alphanumeric() { ch } else { '_' })
        .collect()
}

/// `mm:ss` with whole seconds, e.g. `01:05`. Minutes grow past two digits.
pub fn format_mm_ss(secs: f64) -> String {
    let total = secs.max(0.0).floor() as u64;
    format!("{:02}:{:02}", total / 60, total % 60)
}

/// Parse `12.5` or `mm:ss` (seconds may be fractional) into seconds.
pub fn parse_timestamp(value: &str) -> Result<f64, ExportError> {
    let invalid = || ExportError::InvalidTimestamp(value.to_string());
    let trimmed = value.trim();

    let secs = match trimmed.split_once(':') {
        Some((minutes, seconds)) => {
            let minutes: u64 = minutes.parse().map_err(|_| invalid())?;
            let seconds: f64 = seconds.parse().map_err(|_| invalid())?;
            if !(0.0..60.0).contains(&seconds) {
                return Err(invalid());
            }
            minutes as f64 * 60.0 + seconds
        }
        None => trimmed.parse::<f64>().map_err(|_| invalid())?,
    };

    if !secs.is_finite() || secs < 0.0 {
        return Err(invalid());
    }
    Ok(secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BoundingBox;

    fn event(text: &str, time: f64) -> DetectionEvent {
        DetectionEvent {
            text: text.to_string(),
            time,
            bounding_box: BoundingBox::default(),
        }
    }

    #[test]
    fn detection_window_is_lead_plus_window() {
        let segments = plan_from_detections(&[event("A", 10.0)], 2.0, 5.0);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].range, TimeRange { start: 8.0, end: 13.0 });
    }

    #[test]
    fn early_detection_clamps_to_zero() {
        let segments = plan_from_detections(&[event("A", 1.0)], 2.0, 5.0);
        assert_eq!(segments[0].range, TimeRange { start: 0.0, end: 5.0 });
    }

    #[test]
    fn overlapping_windows_are_not_merged() {
        let events = [event("A", 10.0), event("A", 10.5), event("B", 3.0)];
        let segments = plan_from_detections(&events, 2.0, 5.0);
        assert_eq!(segments.len(), 3);
        let ordinals: Vec<_> = segments.iter().map(|s| s.ordinal).collect();
        assert_eq!(ordinals, vec![1, 2, 3]);
        assert_eq!(segments[2].range.start, 1.0);
    }

    #[test]
    fn empty_detections_plan_nothing() {
        assert!(plan_from_detections(&[], 2.0, 5.0).is_empty());
    }

    #[test]
    fn labels_are_ordinal_and_sanitized_text() {
        let segments = plan_from_detections(&[event("https://x.io/a?b=1", 4.0)], 2.0, 5.0);
        assert_eq!(segments[0].label, "1_https___x_io_a_b_1");
        assert_eq!(
            segments[0].output_filename("2024-05-01_10-00-00", "mp4"),
            "2024-05-01_10-00-00_QR_1_https___x_io_a_b_1.mp4"
        );
    }

    #[test]
    fn selected_ordinals_keep_numbering() {
        let events = [event("A", 1.0), event("B", 2.0), event("C", 30.0)];
        let segments = plan_selected_detections(&events, &[3, 1], 2.0, 5.0).unwrap();
        assert_eq!(segments[0].label, "3_C");
        assert_eq!(segments[0].range, TimeRange { start: 28.0, end: 33.0 });
        assert_eq!(segments[1].label, "1_A");

        assert!(matches!(
            plan_selected_detections(&events, &[0], 2.0, 5.0),
            Err(ExportError::UnknownDetection { ordinal: 0, count: 3 })
        ));
        assert!(plan_selected_detections(&events, &[4], 2.0, 5.0).is_err());
    }

    #[test]
    fn manual_range_order_is_normalized() {
        let forward = plan_from_range(4.0, 10.0, MIN).unwrap();
        let backward = plan_from_range(10.0, 4.0, MIN).unwrap();
        assert_eq!(forward, backward);
        assert_eq!(forward[0].range, TimeRange { start: 4.0, end: 10.0 });
        assert_eq!(forward[0].label, "00:04-00:10");
    }

    const MIN: f64 = 0.1;

    #[test]
    fn manual_range_minimum_duration() {
        assert!(matches!(
            plan_from_range(5.0, 5.05, MIN),
            Err(ExportError::InvalidRange { .. })
        ));
        assert!(plan_from_range(5.0, 5.2, MIN).is_ok());
        assert!(plan_from_range(5.0, 5.1, MIN).is_ok());
        assert!(plan_from_range(7.0, 7.0, MIN).is_err());
    }

    #[test]
    fn manual_range_rejects_non_finite_and_clamps_negative() {
        assert!(plan_from_range(f64::NAN, 3.0, MIN).is_err());
        assert!(plan_from_range(0.0, f64::INFINITY, MIN).is_err());

        let segments = plan_from_range(-3.0, 2.0, MIN).unwrap();
        assert_eq!(segments[0].range, TimeRange { start: 0.0, end: 2.0 });
        assert!(plan_from_range(-3.0, -1.0, MIN).is_err());
    }

    #[test]
    fn manual_output_filename_uses_dashes() {
        let segments = plan_from_range(65.0, 130.4, MIN).unwrap();
        assert_eq!(
            segments[0].output_filename("clip", "mp4"),
            "clip_clip_01-05_02-10.mp4"
        );
    }

    #[test]
    fn formats_and_parses_timestamps() {
        assert_eq!(format_mm_ss(0.0), "00:00");
        assert_eq!(format_mm_ss(59.99), "00:59");
        assert_eq!(format_mm_ss(754.0), "12:34");

        assert_eq!(parse_timestamp("12.5").unwrap(), 12.5);
        assert_eq!(parse_timestamp("1:05").unwrap(), 65.0);
        assert_eq!(parse_timestamp(" 02:30.5 ").unwrap(), 150.5);
        assert!(parse_timestamp("1:75").is_err());
        assert!(parse_timestamp("-4").is_err());
        assert!(parse_timestamp("abc").is_err());
    }
}
