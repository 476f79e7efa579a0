//! QR detection data model.
//!
//! A `DetectionEvent` is one deduplicated QR sighting, stamped with
//! session-clock seconds. Events are created by the deduplicator and never
//! mutated afterwards.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Corner locations reported by the QR decoder, in source-frame pixels.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct QrCorners {
    pub top_left: Point,
    pub top_right: Point,
    pub bottom_right: Point,
    pub bottom_left: Point,
}

/// Axis-aligned rectangle in source-frame pixel coordinates.
///
/// Serialized with the short `w`/`h` keys used by the metadata sidecar files.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    #[serde(rename = "w")]
    pub width: f64,
    #[serde(rename = "h")]
    pub height: f64,
}

impl BoundingBox {
    /// Smallest rectangle containing all four corners. A perspective-skewed
    /// code still gets a box that covers it.
    pub fn from_corners(corners: &QrCorners) -> Self {
        let points = [
            corners.top_left,
            corners.top_right,
            corners.bottom_right,
            corners.bottom_left,
        ];

        let min_x = points.iter().map(|p| p.x).fold(f64::INFINITY, f64::min);
        let min_y = points.iter().map(|p| p.y).fold(f64::INFINITY, f64::min);
        let max_x = points.iter().map(|p| p.x).fold(f64::NEG_INFINITY, f64::max);
        let max_y = points.iter().map(|p| p.y).fold(f64::NEG_INFINITY, f64::max);

        Self {
            x: min_x,
            y: min_y,
            width: max_x - min_x,
            height: max_y - min_y,
        }
    }
}

/// A positive result from the external QR decoder for a single frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanResult {
    pub text: String,
    pub corners: QrCorners,
}

impl ScanResult {
    pub fn new(text: impl Into<String>, corners: QrCorners) -> Self {
        Self {
            text: text.into(),
            corners,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetectionEvent {
    pub text: String,
    /// Seconds since the recording session started.
    pub time: f64,
    #[serde(rename = "bbox")]
    pub bounding_box: BoundingBox,
}

impl DetectionEvent {
    pub fn from_scan(scan: ScanResult, time: f64) -> Self {
        let bounding_box = BoundingBox::from_corners(&scan.corners);
        Self {
            text: scan.text,
            time,
            bounding_box,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x: f64, y: f64, size: f64) -> QrCorners {
        QrCorners {
            top_left: Point::new(x, y),
            top_right: Point::new(x + size, y),
            bottom_right: Point::new(x + size, y + size),
            bottom_left: Point::new(x, y + size),
        }
    }

    #[test]
    fn bounding_box_of_axis_aligned_code() {
        let bbox = BoundingBox::from_corners(&square(10.0, 20.0, 50.0));
        assert_eq!(
            bbox,
            BoundingBox {
                x: 10.0,
                y: 20.0,
                width: 50.0,
                height: 50.0
            }
        );
    }

    #[test]
    fn bounding_box_covers_rotated_code() {
        let corners = QrCorners {
            top_left: Point::new(50.0, 0.0),
            top_right: Point::new(100.0, 50.0),
            bottom_right: Point::new(50.0, 100.0),
            bottom_left: Point::new(0.0, 50.0),
        };
        let bbox = BoundingBox::from_corners(&corners);
        assert_eq!(bbox.x, 0.0);
        assert_eq!(bbox.y, 0.0);
        assert_eq!(bbox.width, 100.0);
        assert_eq!(bbox.height, 100.0);
    }

    #[test]
    fn detection_serializes_with_sidecar_keys() {
        let event = DetectionEvent::from_scan(ScanResult::new("PKG-1", square(1.0, 2.0, 3.0)), 4.5);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["text"], "PKG-1");
        assert_eq!(json["time"], 4.5);
        assert_eq!(json["bbox"]["w"], 3.0);
        assert_eq!(json["bbox"]["h"], 3.0);
    }
}
