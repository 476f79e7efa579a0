//! Audible cue played when a new QR code is detected.
//!
//! Audio objects are not `Send`, so playback lives on a dedicated thread that
//! receives commands over a channel. Without the `chime` feature the cue is a
//! log line.

#[cfg(feature = "chime")]
mod beep;

use std::{
    fmt::Display,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::Sender,
        Arc, Mutex,
    },
};

use log::{debug, warn};

enum ChimeCommand {
    Ring,
    Shutdown,
}

#[derive(Clone)]
pub struct ChimeHandle {
    tx: Arc<Mutex<Option<Sender<ChimeCommand>>>>,
    enabled: Arc<AtomicBool>,
}

impl ChimeHandle {
    pub fn new(enabled: bool) -> Self {
        Self {
            tx: Arc::new(Mutex::new(None)),
            enabled: Arc::new(AtomicBool::new(enabled)),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Play the cue. Never fails: audio problems are logged and ignored.
    pub fn ring(&self) {
        if !self.is_enabled() {
            return;
        }

        match self.ensure_thread() {
            Ok(Some(tx)) => {
                if tx.send(ChimeCommand::Ring).is_err() {
                    warn!("chime thread is gone");
                }
            }
            Ok(None) => debug!("detection chime"),
            Err(err) => warn!("chime unavailable: {err}"),
        }
    }

    /// Turn the cue off for good after the audio device failed, so later
    /// detections do not try a dead thread.
    #[cfg_attr(not(feature = "chime"), allow(dead_code))]
    fn audio_failed(&self, err: impl Display) {
        warn!("{err}; detection chime disabled");
        self.set_enabled(false);
        if let Ok(mut guard) = self.tx.lock() {
            guard.take();
        }
    }

    pub fn shutdown(&self) {
        if let Ok(mut guard) = self.tx.lock() {
            if let Some(tx) = guard.take() {
                let _ = tx.send(ChimeCommand::Shutdown);
            }
        }
    }

    #[cfg(feature = "chime")]
    fn ensure_thread(&self) -> Result<Option<Sender<ChimeCommand>>, String> {
        use rodio::{OutputStream, Sink};
        use std::time::Duration;

        let mut guard = self.tx.lock().map_err(|e| e.to_string())?;
        if let Some(tx) = guard.as_ref() {
            return Ok(Some(tx.clone()));
        }

        let (tx, rx) = std::sync::mpsc::channel::<ChimeCommand>();
        let chime = self.clone();

        std::thread::Builder::new()
            .name("detection-chime".to_string())
            .spawn(move || {
                let (_stream, handle) = match OutputStream::try_default() {
                    Ok(output) => output,
                    Err(err) => {
                        chime.audio_failed(format!("failed to open audio output: {err}"));
                        return;
                    }
                };
                let sink = match Sink::try_new(&handle) {
                    Ok(sink) => sink,
                    Err(err) => {
                        chime.audio_failed(format!("failed to create audio sink: {err}"));
                        return;
                    }
                };

                while let Ok(cmd) = rx.recv() {
                    match cmd {
                        ChimeCommand::Ring => {
                            sink.append(beep::Beep::new(1046.5, Duration::from_millis(120)));
                        }
                        ChimeCommand::Shutdown => break,
                    }
                }
            })
            .map_err(|e| e.to_string())?;

        *guard = Some(tx.clone());
        Ok(Some(tx))
    }

    #[cfg(not(feature = "chime"))]
    fn ensure_thread(&self) -> Result<Option<Sender<ChimeCommand>>, String> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_chime_is_silent() {
        let chime = ChimeHandle::new(false);
        chime.ring();
        assert!(!chime.is_enabled());
    }

    #[test]
    fn audio_failure_disables_every_clone() {
        let chime = ChimeHandle::new(true);
        let (tx, _rx) = std::sync::mpsc::channel();
        *chime.tx.lock().unwrap() = Some(tx);

        let audio_thread = chime.clone();
        audio_thread.audio_failed("no output device");

        assert!(!chime.is_enabled());
        assert!(chime.tx.lock().unwrap().is_none());
        chime.ring();
        assert!(chime.tx.lock().unwrap().is_none());
    }
}
