use anyhow::{bail, Context, Result};
use log::info;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::recording::SessionClock;

use super::frames::{FrameReceiver, TimedScan};
use super::loop_worker::{scan_loop, ScanStats};

/// Owns the scan loop task for the active session.
pub struct ScanController {
    handle: Option<JoinHandle<ScanStats>>,
    cancel_token: Option<CancellationToken>,
}

impl Default for ScanController {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanController {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
        }
    }

    pub fn start_scanning(
        &mut self,
        clock: SessionClock,
        frames: FrameReceiver,
        detections: mpsc::UnboundedSender<TimedScan>,
    ) -> Result<()> {
        if self.handle.is_some() {
            bail!("scanning already active");
        }

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(scan_loop(clock, frames, detections, cancel_token.clone()));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        info!("scan loop started");
        Ok(())
    }

    /// Cancel the loop and wait for it to exit. Idempotent.
    pub async fn stop_scanning(&mut self) -> Result<ScanStats> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
        self.join().await
    }

    /// Wait for the loop to end on its own, after the frame source closes
    /// and every queued frame has been scanned.
    pub async fn wait_for_source_end(&mut self) -> Result<ScanStats> {
        let stats = self.join().await;
        self.cancel_token = None;
        stats
    }

    async fn join(&mut self) -> Result<ScanStats> {
        match self.handle.take() {
            Some(handle) => {
                let stats = handle.await.context("scan loop task failed to join")?;
                info!(
                    "scan loop stopped: {} frames, {} with a code",
                    stats.frames, stats.positive_frames
                );
                Ok(stats)
            }
            None => Ok(ScanStats::default()),
        }
    }
}
