pub mod detection;

pub use detection::{BoundingBox, DetectionEvent, Point, QrCorners, ScanResult};
