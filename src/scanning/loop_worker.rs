use log::{debug, info, warn};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::recording::SessionClock;

use super::frames::{FrameReceiver, TimedScan};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanStats {
    pub frames: u64,
    pub positive_frames: u64,
}

/// Per-frame scan loop.
///
/// Waits for the next frame, stamps positive results with the frame's capture
/// time (or session-clock time when the host gave none) and forwards them to
/// the session. Never sleeps on its own: it runs exactly
/// as often as the host delivers frames. Exits when cancelled, when the frame
/// source closes, or when the session stops listening.
pub async fn scan_loop(
    clock: SessionClock,
    mut frames: FrameReceiver,
    detections: mpsc::UnboundedSender<TimedScan>,
    cancel_token: CancellationToken,
) -> ScanStats {
    let mut stats = ScanStats::default();

    loop {
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                info!("scan loop shutting down");
                break;
            }
            frame = frames.recv() => {
                let Some(frame) = frame else {
                    info!("frame source closed after {} frames", stats.frames);
                    break;
                };
                stats.frames += 1;

                let Some(scan) = frame.scan else {
                    continue;
                };
                stats.positive_frames += 1;

                let time = frame.captured_at.unwrap_or_else(|| clock.elapsed());
                debug!("frame {} decoded '{}' at {:.2}s", frame.sequence, scan.text, time);
                if detections.send(TimedScan { scan, time }).is_err() {
                    warn!("detection receiver dropped; stopping scan loop");
                    break;
                }
            }
        }
    }

    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{QrCorners, ScanResult};
    use crate::scanning::frames::{frame_channel, Frame};

    fn frame(sequence: u64, text: Option<&str>) -> Frame {
        Frame {
            sequence,
            captured_at: None,
            scan: text.map(|t| ScanResult::new(t, QrCorners::default())),
        }
    }

    #[tokio::test]
    async fn forwards_only_positive_frames() {
        let (frame_tx, frame_rx) = frame_channel();
        let (det_tx, mut det_rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(scan_loop(
            SessionClock::start(),
            frame_rx,
            det_tx,
            CancellationToken::new(),
        ));

        frame_tx.send(frame(0, None)).await.unwrap();
        frame_tx.send(frame(1, Some("A"))).await.unwrap();
        frame_tx.send(frame(2, None)).await.unwrap();
        frame_tx.send(frame(3, Some("B"))).await.unwrap();
        drop(frame_tx);

        let stats = worker.await.unwrap();
        assert_eq!(stats.frames, 4);
        assert_eq!(stats.positive_frames, 2);

        let first = det_rx.recv().await.unwrap();
        let second = det_rx.recv().await.unwrap();
        assert_eq!(first.scan.text, "A");
        assert_eq!(second.scan.text, "B");
        assert!(second.time >= first.time);
        assert!(det_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn capture_time_overrides_session_clock() {
        let (frame_tx, frame_rx) = frame_channel();
        let (det_tx, mut det_rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(scan_loop(
            SessionClock::start(),
            frame_rx,
            det_tx,
            CancellationToken::new(),
        ));

        frame_tx
            .send(Frame {
                captured_at: Some(42.5),
                ..frame(0, Some("A"))
            })
            .await
            .unwrap();
        drop(frame_tx);
        worker.await.unwrap();

        assert_eq!(det_rx.recv().await.unwrap().time, 42.5);
    }

    #[tokio::test]
    async fn cancellation_stops_an_idle_loop() {
        let (_frame_tx, frame_rx) = frame_channel();
        let (det_tx, _det_rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();
        let worker = tokio::spawn(scan_loop(SessionClock::start(), frame_rx, det_tx, token.clone()));

        token.cancel();
        let stats = worker.await.unwrap();
        assert_eq!(stats, ScanStats::default());
    }
}
