pub mod config;
pub mod error;
pub mod orchestrator;
pub mod planner;
pub mod transcoder;

pub use config::ExportPolicy;
pub use error::{ExportError, SegmentError};
pub use orchestrator::{BatchStage, ExportBatchResult, ExportOrchestrator, FolderSelection, SegmentOutcome};
pub use planner::{
    format_mm_ss, parse_timestamp, plan_from_detections, plan_from_range, sanitize,
    ExportSegment, SegmentSource, TimeRange,
};
pub use transcoder::{FfmpegTranscoder, TranscodeRequest, Transcoder};
