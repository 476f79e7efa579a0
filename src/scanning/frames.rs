//! Frame delivery from the capture host.
//!
//! The camera and QR decoder live outside this crate. The host pushes one
//! `Frame` per displayed video frame onto a bounded channel; a frame carries
//! the decoder's result for that frame, or `None` when no code was found.
//! A host that knows where the frame sits in the video sets `captured_at`;
//! otherwise the scan loop stamps the frame with the live session clock.

use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use tokio::{
    sync::mpsc,
    time::{Duration, Instant},
};
use tokio_util::sync::CancellationToken;

use crate::models::{QrCorners, ScanResult};

const FRAME_CHANNEL_CAPACITY: usize = 8;

#[derive(Debug, Clone)]
pub struct Frame {
    pub sequence: u64,
    /// Seconds into the recording at which the frame was captured.
    pub captured_at: Option<f64>,
    pub scan: Option<ScanResult>,
}

pub type FrameSender = mpsc::Sender<Frame>;
pub type FrameReceiver = mpsc::Receiver<Frame>;

pub fn frame_channel() -> (FrameSender, FrameReceiver) {
    mpsc::channel(FRAME_CHANNEL_CAPACITY)
}

/// A positive scan stamped with session-clock time by the scan loop.
#[derive(Debug, Clone)]
pub struct TimedScan {
    pub scan: ScanResult,
    pub time: f64,
}

/// One line of a JSON-lines scan log: `{"at": 1.25, "text": "...", "corners": {...}}`.
/// Lines without `text` are frames where nothing was decoded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanLogEntry {
    pub at: f64,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub corners: Option<QrCorners>,
}

impl ScanLogEntry {
    fn to_scan(&self) -> Option<ScanResult> {
        self.text
            .as_ref()
            .map(|text| ScanResult::new(text.clone(), self.corners.unwrap_or_default()))
    }
}

pub fn parse_scan_log(contents: &str) -> Result<Vec<ScanLogEntry>> {
    let mut entries = Vec::new();
    for (index, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let entry: ScanLogEntry = serde_json::from_str(line)
            .with_context(|| format!("invalid scan log entry on line {}", index + 1))?;
        entries.push(entry);
    }
    Ok(entries)
}

pub fn read_scan_log(path: &Path) -> Result<Vec<ScanLogEntry>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read scan log {}", path.display()))?;
    parse_scan_log(&contents)
}

/// Feed recorded scan results into a frame channel, standing in for a live
/// camera. With `realtime`, each frame is delivered at its `at` offset from
/// the moment replay begins and timed by the session clock. Otherwise frames
/// go out as fast as they are consumed, carrying `at` as their capture time.
/// Returns the number of frames delivered.
pub async fn replay_scan_log(
    entries: Vec<ScanLogEntry>,
    frames: FrameSender,
    realtime: bool,
    cancel_token: CancellationToken,
) -> u64 {
    let replay_start = Instant::now();
    let mut delivered = 0u64;

    for (sequence, entry) in entries.iter().enumerate() {
        if realtime {
            let due = replay_start + Duration::from_secs_f64(entry.at.max(0.0));
            tokio::select! {
                _ = tokio::time::sleep_until(due) => {}
                _ = cancel_token.cancelled() => break,
            }
        } else {
            tokio::task::yield_now().await;
        }

        if cancel_token.is_cancelled() {
            break;
        }

        let frame = Frame {
            sequence: sequence as u64,
            captured_at: (!realtime).then_some(entry.at.max(0.0)),
            scan: entry.to_scan(),
        };
        if frames.send(frame).await.is_err() {
            debug!("frame receiver closed; stopping replay");
            break;
        }
        delivered += 1;
    }

    info!("scan log replay delivered {delivered} of {} frames", entries.len());
    delivered
}
