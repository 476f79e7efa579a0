use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::{anyhow, Context, Result};
use log::{info, warn};
use tokio::{
    sync::{broadcast, mpsc, Mutex},
    task::JoinHandle,
    time,
};

use crate::{
    chime::ChimeHandle,
    db::Recording,
    library::{RecordedVideo, VideoLibrary},
    scanning::{FrameReceiver, ScanController, TimedScan},
};

use super::{RecorderEvent, RecorderSnapshot, RecorderStatus, RecordingSession, SessionSnapshot};

const EVENT_CHANNEL_CAPACITY: usize = 64;

enum WindDown {
    /// Cancel the scan loop immediately.
    Cancel,
    /// Let the scan loop consume everything the frame source sent.
    DrainSource,
}

struct ActiveRecording {
    session: Arc<Mutex<RecordingSession>>,
    scanner: ScanController,
    consumer: JoinHandle<()>,
    ticker: JoinHandle<()>,
}

impl ActiveRecording {
    async fn snapshot(&self) -> RecorderSnapshot {
        let session = self.session.lock().await;
        RecorderSnapshot {
            status: RecorderStatus::Recording,
            session_id: Some(session.id().to_string()),
            started_at: Some(session.started_at()),
            elapsed_secs: session.elapsed(),
            detections: session.events().len(),
            notes: session.notes().to_string(),
        }
    }

    /// Stop the heartbeat and the scan loop, wait until every pending
    /// detection reached the session, then hand the session back.
    async fn wind_down(mut self, mode: WindDown) -> Result<RecordingSession> {
        self.ticker.abort();
        let _ = self.ticker.await;

        match mode {
            WindDown::Cancel => self.scanner.stop_scanning().await?,
            WindDown::DrainSource => self.scanner.wait_for_source_end().await?,
        };
        self.consumer
            .await
            .context("detection consumer task failed to join")?;

        let session = Arc::try_unwrap(self.session)
            .map_err(|_| anyhow!("recording session is still shared"))?
            .into_inner();
        Ok(session)
    }
}

/// A finished session whose save failed, kept until `retry_save` succeeds.
struct PendingSave {
    snapshot: SessionSnapshot,
    video: RecordedVideo,
}

/// Owns the single active recording session and the tasks feeding it.
#[derive(Clone)]
pub struct RecordingController {
    active: Arc<Mutex<Option<ActiveRecording>>>,
    unsaved: Arc<Mutex<Option<PendingSave>>>,
    library: VideoLibrary,
    chime: ChimeHandle,
    events: broadcast::Sender<RecorderEvent>,
    tick_interval: Duration,
}

impl RecordingController {
    pub fn new(library: VideoLibrary, chime: ChimeHandle) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            active: Arc::new(Mutex::new(None)),
            unsaved: Arc::new(Mutex::new(None)),
            library,
            chime,
            events,
            tick_interval: Duration::from_secs(1),
        }
    }

    pub fn with_tick_interval(mut self, tick_interval: Duration) -> Self {
        self.tick_interval = tick_interval;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RecorderEvent> {
        self.events.subscribe()
    }

    /// Begin a new session reading from `frames`. Any session already running
    /// is discarded.
    pub async fn start_recording(&self, frames: FrameReceiver) -> Result<RecorderSnapshot> {
        let mut guard = self.active.lock().await;

        if let Some(previous) = guard.take() {
            let discarded = previous.wind_down(WindDown::Cancel).await?;
            warn!(
                "Discarding active session {} ({} detections) to start a new one",
                discarded.id(),
                discarded.events().len()
            );
            self.emit(RecorderEvent::SessionDiscarded {
                session_id: discarded.id().to_string(),
            });
        }

        let session = RecordingSession::start();
        let clock = session.clock();
        let session_id = session.id().to_string();
        let session = Arc::new(Mutex::new(session));
        let detection_count = Arc::new(AtomicUsize::new(0));

        let (detections_tx, detections_rx) = mpsc::unbounded_channel();
        let mut scanner = ScanController::new();
        scanner.start_scanning(clock, frames, detections_tx)?;

        let consumer = self.spawn_consumer(session.clone(), detections_rx, detection_count.clone());

        let events = self.events.clone();
        let tick_interval = self.tick_interval;
        let ticker = tokio::spawn(async move {
            let mut interval = time::interval(tick_interval);
            // the first tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                let _ = events.send(RecorderEvent::Heartbeat {
                    elapsed_secs: clock.elapsed(),
                    detections: detection_count.load(Ordering::SeqCst),
                });
            }
        });

        let active = ActiveRecording {
            session,
            scanner,
            consumer,
            ticker,
        };
        let snapshot = active.snapshot().await;
        *guard = Some(active);

        info!("Recording session {session_id} started");
        self.emit(RecorderEvent::StateChanged {
            snapshot: snapshot.clone(),
        });
        Ok(snapshot)
    }

    fn spawn_consumer(
        &self,
        session: Arc<Mutex<RecordingSession>>,
        mut detections: mpsc::UnboundedReceiver<TimedScan>,
        detection_count: Arc<AtomicUsize>,
    ) -> JoinHandle<()> {
        let events = self.events.clone();
        let chime = self.chime.clone();

        tokio::spawn(async move {
            while let Some(TimedScan { scan, time }) = detections.recv().await {
                let accepted = session.lock().await.accept(scan, time);
                let Some(event) = accepted else {
                    continue;
                };

                detection_count.fetch_add(1, Ordering::SeqCst);
                info!("QR detected at {:.2}s: {}", event.time, event.text);
                chime.ring();
                let _ = events.send(RecorderEvent::Detection { event });
            }
        })
    }

    pub async fn snapshot(&self) -> RecorderSnapshot {
        let guard = self.active.lock().await;
        match guard.as_ref() {
            Some(active) => active.snapshot().await,
            None => RecorderSnapshot::idle(),
        }
    }

    pub async fn set_notes(&self, notes: impl Into<String>) -> Result<()> {
        let guard = self.active.lock().await;
        let active = guard
            .as_ref()
            .ok_or_else(|| anyhow!("no active recording"))?;
        active.session.lock().await.set_notes(notes);
        Ok(())
    }

    /// Stop scanning now and save the session with the recorded `video`.
    pub async fn stop_recording(&self, video: RecordedVideo) -> Result<Recording> {
        self.end_and_save(video, WindDown::Cancel).await
    }

    /// Wait for the frame source to close, then save like `stop_recording`.
    pub async fn finish_recording(&self, video: RecordedVideo) -> Result<Recording> {
        self.end_and_save(video, WindDown::DrainSource).await
    }

    async fn end_and_save(&self, video: RecordedVideo, mode: WindDown) -> Result<Recording> {
        let active = self
            .active
            .lock()
            .await
            .take()
            .ok_or_else(|| anyhow!("no active recording to stop"))?;

        let session = active.wind_down(mode).await?;
        let snapshot = session.finish();
        info!(
            "Recording session {} stopped after {:.1}s with {} detections",
            snapshot.id,
            snapshot.duration_secs,
            snapshot.events.len()
        );
        self.emit(RecorderEvent::StateChanged {
            snapshot: RecorderSnapshot::idle(),
        });

        self.save(PendingSave { snapshot, video }).await
    }

    /// Save the last session whose save failed, with the same video.
    pub async fn retry_save(&self) -> Result<Recording> {
        let pending = self
            .unsaved
            .lock()
            .await
            .take()
            .ok_or_else(|| anyhow!("no unsaved session to retry"))?;
        info!("Retrying save of session {}", pending.snapshot.id);
        self.save(pending).await
    }

    /// The finished session still waiting for a successful save, if any.
    pub async fn unsaved_session(&self) -> Option<SessionSnapshot> {
        self.unsaved
            .lock()
            .await
            .as_ref()
            .map(|pending| pending.snapshot.clone())
    }

    async fn save(&self, pending: PendingSave) -> Result<Recording> {
        match self.library.save(&pending.snapshot, &pending.video).await {
            Ok(recording) => {
                self.emit(RecorderEvent::SessionSaved {
                    recording: recording.clone(),
                });
                Ok(recording)
            }
            Err(err) => {
                let id = pending.snapshot.id.clone();
                warn!(
                    "Session {id} with {} detections kept unsaved: {err:#}",
                    pending.snapshot.events.len()
                );
                *self.unsaved.lock().await = Some(pending);
                Err(err.context(format!("failed to save session {id}")))
            }
        }
    }

    /// Drop the active session without saving. No-op when idle.
    pub async fn cancel_recording(&self) -> Result<()> {
        let Some(active) = self.active.lock().await.take() else {
            return Ok(());
        };

        let session = active.wind_down(WindDown::Cancel).await?;
        info!("Recording session {} cancelled", session.id());
        self.emit(RecorderEvent::SessionDiscarded {
            session_id: session.id().to_string(),
        });
        self.emit(RecorderEvent::StateChanged {
            snapshot: RecorderSnapshot::idle(),
        });
        Ok(())
    }

    fn emit(&self, event: RecorderEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }
}
