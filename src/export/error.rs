use std::{io, path::PathBuf};

use serde::Serialize;
use thiserror::Error;

/// Failures that stop a plan or a whole batch before any clip is produced.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("invalid range {start}..{end}: clips must be finite and at least {min}s long")]
    InvalidRange { start: f64, end: f64, min: f64 },

    #[error("invalid timestamp '{0}': expected seconds or mm:ss")]
    InvalidTimestamp(String),

    #[error("detection #{ordinal} does not exist (recording has {count})")]
    UnknownDetection { ordinal: usize, count: usize },

    #[error("input video not found: {}", .0.display())]
    MissingInput(PathBuf),

    #[error("failed to create output directory {}", .path.display())]
    OutputDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Failure of a single clip. Recorded in the batch result, never propagated.
#[derive(Debug, Clone, Error, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SegmentError {
    #[error("ffmpeg failed with {}: {stderr}", describe_exit(.code))]
    Transcode { code: Option<i32>, stderr: String },

    #[error("ffmpeg spawn error: {message}")]
    Spawn { message: String },

    #[error("transcode timed out after {secs}s")]
    TimedOut { secs: u64 },

    #[error("export cancelled before this segment finished")]
    Cancelled,
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {code}"),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transcode_error_carries_stderr() {
        let err = SegmentError::Transcode {
            code: Some(1),
            stderr: "Invalid data found".into(),
        };
        assert_eq!(err.to_string(), "ffmpeg failed with code 1: Invalid data found");

        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "transcode");
        assert_eq!(json["code"], 1);
    }
}
