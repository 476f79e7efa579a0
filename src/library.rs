//! Video library: video files plus JSON sidecars on disk, indexed in SQLite.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    db::{Database, NewRecording, Recording},
    models::DetectionEvent,
    recording::SessionSnapshot,
};

const DEFAULT_VIDEO_EXT: &str = "webm";

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("video file not found: {0}")]
    NotFound(String),
    #[error("invalid video filename: {0}")]
    InvalidName(String),
}

/// Encoded video produced by the external recorder.
#[derive(Debug, Clone)]
pub enum RecordedVideo {
    Bytes(Vec<u8>),
    File(PathBuf),
}

impl RecordedVideo {
    fn extension(&self) -> String {
        match self {
            RecordedVideo::File(path) => path
                .extension()
                .and_then(|ext| ext.to_str())
                .filter(|ext| !ext.is_empty())
                .unwrap_or(DEFAULT_VIDEO_EXT)
                .to_ascii_lowercase(),
            RecordedVideo::Bytes(_) => DEFAULT_VIDEO_EXT.to_string(),
        }
    }
}

/// Metadata written next to each video as `<stem>.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Sidecar {
    pub video: String,
    pub created_at: DateTime<Utc>,
    pub detections: Vec<DetectionEvent>,
    pub notes: String,
}

#[derive(Clone)]
pub struct VideoLibrary {
    storage_dir: PathBuf,
    db: Database,
}

impl VideoLibrary {
    pub fn new(storage_dir: PathBuf, db: Database) -> Self {
        Self { storage_dir, db }
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    /// Store the video, its sidecar and the database rows for a finished
    /// session. The copied video and sidecar are removed again if a later
    /// step fails.
    pub async fn save(&self, snapshot: &SessionSnapshot, video: &RecordedVideo) -> Result<Recording> {
        tokio::fs::create_dir_all(&self.storage_dir)
            .await
            .with_context(|| format!("failed to create {}", self.storage_dir.display()))?;

        let stem = snapshot
            .started_at
            .with_timezone(&Local)
            .format("%Y-%m-%d_%H-%M-%S")
            .to_string();
        let filename = self.unused_filename(&stem, &video.extension()).await;
        let video_path = self.storage_dir.join(&filename);

        match video {
            RecordedVideo::Bytes(bytes) => tokio::fs::write(&video_path, bytes)
                .await
                .with_context(|| format!("failed to write {}", video_path.display()))?,
            RecordedVideo::File(source) => {
                tokio::fs::copy(source, &video_path).await.with_context(|| {
                    format!("failed to copy {} into library", source.display())
                })?;
            }
        }

        let sidecar = Sidecar {
            video: filename.clone(),
            created_at: snapshot.started_at,
            detections: snapshot.events.clone(),
            notes: snapshot.notes.clone(),
        };
        let sidecar_path = sidecar_path(&video_path);
        let written = async {
            let size_bytes = tokio::fs::metadata(&video_path)
                .await
                .with_context(|| format!("failed to stat {}", video_path.display()))?
                .len();
            write_sidecar(&sidecar_path, &sidecar).await?;
            self.db
                .insert_recording(NewRecording {
                    filename: filename.clone(),
                    path: video_path.to_string_lossy().into_owned(),
                    size_bytes,
                    created_at: snapshot.started_at,
                    duration_secs: Some(snapshot.duration_secs),
                    notes: (!snapshot.notes.is_empty()).then(|| snapshot.notes.clone()),
                    detections: snapshot.events.clone(),
                })
                .await
        }
        .await;

        match written {
            Ok(recording) => {
                info!(
                    "Saved {} ({} bytes, {} detections)",
                    filename,
                    recording.size_bytes,
                    recording.detections.len()
                );
                Ok(recording)
            }
            Err(err) => {
                remove_if_present(&video_path).await;
                remove_if_present(&sidecar_path).await;
                Err(err)
            }
        }
    }

    pub async fn list(&self) -> Result<Vec<Recording>> {
        self.db.list_recordings().await
    }

    /// Recordings with a detection containing `text`, each carrying only the
    /// matching detections.
    pub async fn search_by_qr(&self, text: &str) -> Result<Vec<Recording>> {
        self.db.search_recordings_by_qr(text).await
    }

    pub async fn get(&self, filename: &str) -> Result<Recording> {
        check_filename(filename)?;
        self.db
            .get_recording_by_filename(filename)
            .await?
            .ok_or_else(|| LibraryError::NotFound(filename.to_string()).into())
    }

    /// Absolute path of an existing video file in the library.
    pub async fn video_path(&self, filename: &str) -> Result<PathBuf> {
        check_filename(filename)?;
        let path = self.storage_dir.join(filename);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            Ok(path)
        } else {
            Err(LibraryError::NotFound(filename.to_string()).into())
        }
    }

    /// Remove the video, its sidecar and its rows. Returns `false` if none of
    /// them existed.
    pub async fn delete(&self, filename: &str) -> Result<bool> {
        check_filename(filename)?;
        let video_path = self.storage_dir.join(filename);

        let removed_file = remove_file(&video_path).await?;
        remove_file(&sidecar_path(&video_path)).await?;
        let removed_row = self.db.delete_recording_by_filename(filename).await?;

        if removed_file || removed_row {
            info!("Deleted {filename}");
        }
        Ok(removed_file || removed_row)
    }

    pub async fn update_notes(&self, filename: &str, notes: &str) -> Result<()> {
        check_filename(filename)?;
        let stored = (!notes.is_empty()).then(|| notes.to_string());
        if !self.db.update_recording_notes(filename, stored).await? {
            return Err(LibraryError::NotFound(filename.to_string()).into());
        }

        let sidecar_path = sidecar_path(&self.storage_dir.join(filename));
        match tokio::fs::read_to_string(&sidecar_path).await {
            Ok(contents) => {
                let mut sidecar: Sidecar = serde_json::from_str(&contents)
                    .with_context(|| format!("failed to parse {}", sidecar_path.display()))?;
                sidecar.notes = notes.to_string();
                write_sidecar(&sidecar_path, &sidecar).await?;
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                warn!("No sidecar for {filename}; notes updated in database only");
            }
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read {}", sidecar_path.display()))
            }
        }
        Ok(())
    }

    /// First free name for `stem`. A name is taken when either the video or
    /// its sidecar exists, since videos with different extensions share
    /// the `<stem>.json` sidecar name.
    async fn unused_filename(&self, stem: &str, ext: &str) -> String {
        let mut candidate = format!("{stem}.{ext}");
        let mut suffix = 2;
        while self.is_taken(&candidate).await {
            candidate = format!("{stem}_{suffix}.{ext}");
            suffix += 1;
        }
        candidate
    }

    async fn is_taken(&self, filename: &str) -> bool {
        let video_path = self.storage_dir.join(filename);
        for path in [sidecar_path(&video_path), video_path] {
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                return true;
            }
        }
        false
    }
}

pub fn sidecar_path(video_path: &Path) -> PathBuf {
    video_path.with_extension("json")
}

fn check_filename(filename: &str) -> Result<()> {
    let plain = Path::new(filename)
        .file_name()
        .is_some_and(|name| name == filename);
    if filename.is_empty() || !plain {
        return Err(LibraryError::InvalidName(filename.to_string()).into());
    }
    Ok(())
}

async fn write_sidecar(path: &Path, sidecar: &Sidecar) -> Result<()> {
    let serialized = serde_json::to_string_pretty(sidecar)?;
    tokio::fs::write(path, serialized)
        .await
        .with_context(|| format!("failed to write {}", path.display()))
}

async fn remove_file(path: &Path) -> Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err).with_context(|| format!("failed to remove {}", path.display())),
    }
}

async fn remove_if_present(path: &Path) {
    if let Err(err) = remove_file(path).await {
        warn!("{err:#}");
    }
}
