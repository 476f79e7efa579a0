//! CLI command implementations.

use std::{
    io::BufRead,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Context, Result};
use chrono::Local;
use directories::ProjectDirs;
use log::warn;
use serde::Serialize;
use serde_json::json;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
    chime::ChimeHandle,
    cli::{Cli, Commands, ConfigAction, ExportTarget},
    db::{Database, Recording},
    exit_codes::ExitCode,
    export::{
        format_mm_ss, parse_timestamp, ExportBatchResult, ExportError, ExportOrchestrator,
        ExportSegment, FfmpegTranscoder, FolderSelection, SegmentSource,
    },
    library::{LibraryError, RecordedVideo, VideoLibrary},
    recording::{RecorderEvent, RecordingController},
    scanning::{frame_channel, read_scan_log, replay_scan_log},
    settings::SettingsStore,
};

struct Output {
    json: bool,
    quiet: bool,
}

impl Output {
    fn json(&self, value: &impl Serialize) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }

    fn line(&self, text: impl AsRef<str>) {
        if !self.quiet {
            println!("{}", text.as_ref());
        }
    }
}

pub async fn dispatch(cli: Cli) -> ExitCode {
    let out = Output {
        json: cli.json,
        quiet: cli.quiet,
    };

    match execute(cli, &out).await {
        Ok(code) => code,
        Err(err) => {
            let code = exit_code_for(&err);
            if out.json {
                println!(
                    "{}",
                    json!({ "status": "error", "code": code.as_i32(), "message": format!("{err:#}") })
                );
            } else {
                eprintln!("Error: {err:#}");
            }
            code
        }
    }
}

async fn execute(cli: Cli, out: &Output) -> Result<ExitCode> {
    let data_dir = resolve_data_dir(cli.data_dir.as_deref())?;
    let settings = SettingsStore::open(&data_dir)?;

    match cli.command {
        Commands::Config { action } => config(action, &settings, out),
        Commands::Record {
            scans,
            video,
            notes,
            no_realtime,
        } => {
            let library = open_library(&settings)?;
            record(&settings, library, &scans, video, notes, !no_realtime, out).await
        }
        Commands::List => {
            let recordings = open_library(&settings)?.list().await?;
            print_recordings(&recordings, out)?;
            Ok(ExitCode::Success)
        }
        Commands::Search { text } => {
            let recordings = open_library(&settings)?.search_by_qr(&text).await?;
            if !out.json && recordings.is_empty() {
                out.line(format!("No recordings contain '{text}'."));
                return Ok(ExitCode::Success);
            }
            print_recordings(&recordings, out)?;
            Ok(ExitCode::Success)
        }
        Commands::Show { filename } => {
            let recording = open_library(&settings)?.get(&filename).await?;
            show(&recording, out)?;
            Ok(ExitCode::Success)
        }
        Commands::Path { filename } => {
            let path = open_library(&settings)?.video_path(&filename).await?;
            if out.json {
                out.json(&json!({ "path": path }))?;
            } else {
                println!("{}", path.display());
            }
            Ok(ExitCode::Success)
        }
        Commands::Delete { filename } => {
            if !open_library(&settings)?.delete(&filename).await? {
                return Err(LibraryError::NotFound(filename).into());
            }
            if out.json {
                out.json(&json!({ "status": "deleted", "filename": filename }))?;
            } else {
                out.line(format!("Deleted {filename}"));
            }
            Ok(ExitCode::Success)
        }
        Commands::Notes { filename, text } => {
            open_library(&settings)?.update_notes(&filename, &text).await?;
            if out.json {
                out.json(&json!({ "status": "updated", "filename": filename }))?;
            } else {
                out.line(format!("Notes updated for {filename}"));
            }
            Ok(ExitCode::Success)
        }
        Commands::Export { target } => export(target, &settings, out).await,
    }
}

/// `--data-dir` / `QRCAM_DATA_DIR`, else the platform data directory.
fn resolve_data_dir(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(dir) = explicit {
        return Ok(dir.to_path_buf());
    }
    let dirs = ProjectDirs::from("", "", "qrcam")
        .ok_or_else(|| anyhow!("could not determine a data directory; pass --data-dir"))?;
    Ok(dirs.data_dir().to_path_buf())
}

fn open_library(settings: &SettingsStore) -> Result<VideoLibrary> {
    let db = Database::new(settings.database_file()?)?;
    Ok(VideoLibrary::new(settings.storage_dir()?, db))
}

fn exit_code_for(err: &anyhow::Error) -> ExitCode {
    if let Some(err) = err.downcast_ref::<LibraryError>() {
        return match err {
            LibraryError::NotFound(_) => ExitCode::NotFound,
            LibraryError::InvalidName(_) => ExitCode::InvalidArguments,
        };
    }
    if let Some(err) = err.downcast_ref::<ExportError>() {
        return match err {
            ExportError::InvalidRange { .. } | ExportError::InvalidTimestamp(_) => {
                ExitCode::InvalidArguments
            }
            ExportError::UnknownDetection { .. } | ExportError::MissingInput(_) => {
                ExitCode::NotFound
            }
            ExportError::OutputDir { .. } => ExitCode::GeneralError,
        };
    }
    ExitCode::GeneralError
}

fn cancel_on_ctrl_c(token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; finishing up");
            token.cancel();
        }
    })
}

async fn record(
    settings: &SettingsStore,
    library: VideoLibrary,
    scans: &Path,
    video: PathBuf,
    notes: Option<String>,
    realtime: bool,
    out: &Output,
) -> Result<ExitCode> {
    let entries = read_scan_log(scans)?;
    if !video.is_file() {
        return Err(LibraryError::NotFound(video.display().to_string()).into());
    }

    let chime = ChimeHandle::new(settings.chime()?.enabled);
    let controller = RecordingController::new(library, chime.clone());
    let printer = (!out.json && !out.quiet).then(|| {
        let mut events = controller.subscribe();
        tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                if let RecorderEvent::Detection { event } = event {
                    println!("  [{}] {}", format_mm_ss(event.time), event.text);
                }
            }
        })
    });

    let (frames_tx, frames_rx) = frame_channel();
    let snapshot = controller.start_recording(frames_rx).await?;
    if let Some(notes) = notes {
        controller.set_notes(notes).await?;
    }
    out.line(format!(
        "Recording session {} ({} frames in scan log)",
        snapshot.session_id.unwrap_or_default(),
        entries.len()
    ));

    let cancel_token = CancellationToken::new();
    let interrupt = cancel_on_ctrl_c(cancel_token.clone());
    replay_scan_log(entries, frames_tx, realtime, cancel_token).await;
    interrupt.abort();

    let mut saved = controller.finish_recording(RecordedVideo::File(video)).await;
    if let Err(err) = &saved {
        if controller.unsaved_session().await.is_some() {
            warn!("{err:#}; retrying once");
            saved = controller.retry_save().await;
        }
    }
    if let Some(printer) = printer {
        printer.abort();
    }
    chime.shutdown();
    if saved.is_err() {
        if let Some(unsaved) = controller.unsaved_session().await {
            eprintln!("{}", serde_json::to_string_pretty(&unsaved)?);
        }
    }
    let recording = saved?;

    if out.json {
        out.json(&recording)?;
    } else {
        out.line(format!(
            "Saved {} with {} detection(s)",
            recording.filename,
            recording.detections.len()
        ));
    }
    Ok(ExitCode::Success)
}

fn print_recordings(recordings: &[Recording], out: &Output) -> Result<()> {
    if out.json {
        return out.json(&recordings);
    }
    if recordings.is_empty() {
        out.line("No recordings.");
        return Ok(());
    }

    let name_width = recordings
        .iter()
        .map(|r| r.filename.len())
        .max()
        .unwrap_or(8)
        .max(8);
    println!(
        "{:<name_width$}  {:<19}  {:>8}  {:>10}  NOTES",
        "FILENAME", "CREATED", "DURATION", "DETECTIONS"
    );
    for recording in recordings {
        let duration = recording
            .duration_secs
            .map(format_mm_ss)
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<name_width$}  {:<19}  {:>8}  {:>10}  {}",
            recording.filename,
            recording
                .created_at
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S"),
            duration,
            recording.detections.len(),
            recording.notes.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

fn show(recording: &Recording, out: &Output) -> Result<()> {
    if out.json {
        return out.json(recording);
    }

    println!("{}", recording.filename);
    println!(
        "  created:  {}",
        recording.created_at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
    );
    if let Some(duration) = recording.duration_secs {
        println!("  duration: {}", format_mm_ss(duration));
    }
    println!("  size:     {} bytes", recording.size_bytes);
    if let Some(notes) = &recording.notes {
        println!("  notes:    {notes}");
    }

    if recording.detections.is_empty() {
        println!("  no QR detections");
    } else {
        println!("  detections:");
        for (index, detection) in recording.detections.iter().enumerate() {
            println!(
                "  {:>3}. [{}] {}",
                index + 1,
                format_mm_ss(detection.time),
                detection.text
            );
        }
    }
    Ok(())
}

async fn export(target: ExportTarget, settings: &SettingsStore, out: &Output) -> Result<ExitCode> {
    let library = open_library(settings)?;
    let export_settings = settings.export()?;
    let policy = export_settings.policy();

    let (filename, segments, output_dir) = match target {
        ExportTarget::Qr {
            filename,
            pick,
            output_dir,
        } => {
            let recording = library.get(&filename).await?;
            let segments = if pick.is_empty() {
                policy.plan_detections(&recording.detections)
            } else {
                policy.plan_selected(&recording.detections, &pick)?
            };
            (filename, segments, output_dir)
        }
        ExportTarget::Range {
            filename,
            start,
            end,
            output_dir,
        } => {
            let segments = policy.plan_range(parse_timestamp(&start)?, parse_timestamp(&end)?)?;
            (filename, segments, output_dir)
        }
    };

    let input = library.video_path(&filename).await?;
    if segments.is_empty() {
        out.line(format!("{filename} has no detections to export."));
    }

    let output_dir = match choose_output_dir(output_dir, export_settings.output_dir.clone()).await? {
        FolderSelection::Selected(dir) => dir,
        FolderSelection::Cancelled => {
            if out.json {
                out.json(&json!({ "status": "cancelled" }))?;
            } else {
                out.line("Export cancelled.");
            }
            return Ok(ExitCode::Success);
        }
    };

    let transcoder = FfmpegTranscoder::new(export_settings.ffmpeg_path, &policy);
    let orchestrator = ExportOrchestrator::new(transcoder, policy);

    let cancel_token = CancellationToken::new();
    let interrupt = cancel_on_ctrl_c(cancel_token.clone());
    let result = orchestrator
        .run_batch(&segments, &input, &output_dir, &cancel_token)
        .await;
    interrupt.abort();
    let result = result?;

    report_batch(&result, &segments, out)?;

    Ok(if result.cancelled {
        ExitCode::UserCancelled
    } else if !result.all_succeeded() {
        ExitCode::PartialFailure
    } else {
        ExitCode::Success
    })
}

/// Explicit folder, else the configured default, else ask on stdin. An empty
/// answer declines.
async fn choose_output_dir(
    explicit: Option<PathBuf>,
    configured: Option<PathBuf>,
) -> Result<FolderSelection> {
    if let Some(dir) = explicit.or(configured) {
        return Ok(FolderSelection::Selected(dir));
    }

    let answer = tokio::task::spawn_blocking(|| -> Result<String> {
        eprint!("Export folder (leave empty to cancel): ");
        let mut line = String::new();
        std::io::stdin()
            .lock()
            .read_line(&mut line)
            .context("failed to read export folder from stdin")?;
        Ok(line)
    })
    .await
    .context("folder prompt task failed")??;

    Ok(parse_folder_answer(&answer))
}

fn parse_folder_answer(answer: &str) -> FolderSelection {
    let trimmed = answer.trim();
    if trimmed.is_empty() {
        FolderSelection::Cancelled
    } else {
        FolderSelection::Selected(PathBuf::from(trimmed))
    }
}

fn report_batch(
    result: &ExportBatchResult,
    planned: &[ExportSegment],
    out: &Output,
) -> Result<()> {
    if out.json {
        return out.json(result);
    }

    for outcome in &result.segments {
        match &outcome.error {
            None => out.line(format!("  ok      {}", outcome.output_path.display())),
            Some(err) => println!("  failed  {} ({err})", outcome.segment.label),
        }
    }
    out.line(format!(
        "{} of {} clip(s) exported to {}{}",
        result.succeeded(),
        planned.len(),
        result.output_dir.display(),
        if result.cancelled { " (cancelled)" } else { "" }
    ));
    if let Some(picks) = retry_picks(result) {
        out.line(format!("Retry the failed clips with --pick {picks}"));
    }
    Ok(())
}

/// `--pick` value that re-exports only the failed detection clips.
fn retry_picks(result: &ExportBatchResult) -> Option<String> {
    let picks: Vec<String> = result
        .failed_segments()
        .iter()
        .filter(|segment| matches!(segment.source, SegmentSource::Detection { .. }))
        .map(|segment| segment.ordinal.to_string())
        .collect();
    (!picks.is_empty()).then(|| picks.join(","))
}

fn config(action: ConfigAction, settings: &SettingsStore, out: &Output) -> Result<ExitCode> {
    let updated = match action {
        ConfigAction::Show => None,
        ConfigAction::SetStorage { dir } => {
            Some(settings.update(|s| s.storage_path = Some(dir))?)
        }
        ConfigAction::SetDatabase { dir } => {
            Some(settings.update(|s| s.database_path = Some(dir))?)
        }
        ConfigAction::SetExportDir { dir } => {
            Some(settings.update(|s| s.export.output_dir = Some(dir))?)
        }
        ConfigAction::SetFfmpeg { path } => {
            Some(settings.update(|s| s.export.ffmpeg_path = path)?)
        }
    };

    let current = match updated {
        Some(current) => current,
        None => settings.get()?,
    };

    if out.json {
        out.json(&json!({
            "configFile": settings.path(),
            "storageDir": settings.storage_dir()?,
            "databaseFile": settings.database_file()?,
            "settings": current,
        }))?;
    } else {
        println!("config file:   {}", settings.path().display());
        println!("storage dir:   {}", settings.storage_dir()?.display());
        println!("database file: {}", settings.database_file()?.display());
        println!(
            "export dir:    {}",
            current
                .export
                .output_dir
                .as_ref()
                .map(|dir| dir.display().to_string())
                .unwrap_or_else(|| "(ask)".to_string())
        );
        println!("ffmpeg:        {}", current.export.ffmpeg_path.display());
        println!(
            "timeout:       {}",
            match current.export.timeout_secs {
                0 => "none".to_string(),
                secs => format!("{secs}s"),
            }
        );
        println!("chime:         {}", if current.chime.enabled { "on" } else { "off" });
    }
    Ok(ExitCode::Success)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_folder_answer_cancels() {
        assert_eq!(parse_folder_answer("\n"), FolderSelection::Cancelled);
        assert_eq!(parse_folder_answer("   "), FolderSelection::Cancelled);
        assert_eq!(
            parse_folder_answer(" /tmp/clips \n"),
            FolderSelection::Selected(PathBuf::from("/tmp/clips"))
        );
    }

    #[tokio::test]
    async fn explicit_folder_wins_over_configured() {
        let selection = choose_output_dir(Some("/a".into()), Some("/b".into()))
            .await
            .unwrap();
        assert_eq!(selection, FolderSelection::Selected(PathBuf::from("/a")));

        let selection = choose_output_dir(None, Some("/b".into())).await.unwrap();
        assert_eq!(selection, FolderSelection::Selected(PathBuf::from("/b")));
    }

    #[test]
    fn errors_map_to_exit_codes() {
        let not_found: anyhow::Error = LibraryError::NotFound("x.webm".into()).into();
        assert_eq!(exit_code_for(&not_found), ExitCode::NotFound);

        let range: anyhow::Error = ExportError::InvalidRange {
            start: 5.0,
            end: 5.05,
            min: 0.1,
        }
        .into();
        assert_eq!(exit_code_for(&range), ExitCode::InvalidArguments);

        let wrapped = anyhow::Error::from(ExportError::MissingInput("a.webm".into()))
            .context("export failed");
        assert_eq!(exit_code_for(&wrapped), ExitCode::NotFound);

        assert_eq!(exit_code_for(&anyhow!("boom")), ExitCode::GeneralError);
    }

    #[test]
    fn explicit_data_dir_is_used() {
        let dir = resolve_data_dir(Some(Path::new("/srv/qrcam"))).unwrap();
        assert_eq!(dir, PathBuf::from("/srv/qrcam"));
    }

    #[tokio::test]
    async fn record_then_export_with_missing_ffmpeg_reports_partial_failure() {
        let dir = tempfile::tempdir().unwrap();
        let settings = SettingsStore::open(dir.path()).unwrap();
        settings
            .update(|s| {
                s.chime.enabled = false;
                s.export.ffmpeg_path = PathBuf::from("/nonexistent/qrcam-ffmpeg");
            })
            .unwrap();
        let out = Output {
            json: false,
            quiet: true,
        };

        let scans = dir.path().join("scans.jsonl");
        std::fs::write(
            &scans,
            "{\"at\": 10.0, \"text\": \"PKG-1\"}\n{\"at\": 15.0}\n{\"at\": 20.0, \"text\": \"PKG-1\"}\n{\"at\": 30.0, \"text\": \"PKG-2\"}\n",
        )
        .unwrap();
        let video = dir.path().join("capture.webm");
        std::fs::write(&video, b"fake video").unwrap();

        let code = record(
            &settings,
            open_library(&settings).unwrap(),
            &scans,
            video,
            Some("test run".into()),
            false,
            &out,
        )
        .await
        .unwrap();
        assert_eq!(code, ExitCode::Success);

        let recordings = open_library(&settings).unwrap().list().await.unwrap();
        assert_eq!(recordings.len(), 1);
        let timeline: Vec<_> = recordings[0]
            .detections
            .iter()
            .map(|d| (d.text.as_str(), d.time))
            .collect();
        assert_eq!(
            timeline,
            vec![("PKG-1", 10.0), ("PKG-1", 20.0), ("PKG-2", 30.0)]
        );

        let code = export(
            ExportTarget::Qr {
                filename: recordings[0].filename.clone(),
                pick: vec![],
                output_dir: Some(dir.path().join("clips")),
            },
            &settings,
            &out,
        )
        .await
        .unwrap();
        assert_eq!(code, ExitCode::PartialFailure);
        assert!(dir.path().join("clips").is_dir());
    }

    #[test]
    fn retry_picks_lists_failed_detection_ordinals() {
        use crate::export::{planner::plan_selected_detections, SegmentError, SegmentOutcome};
        use crate::models::{BoundingBox, DetectionEvent};

        let events: Vec<_> = (0..4)
            .map(|i| DetectionEvent {
                text: format!("code-{i}"),
                time: i as f64 * 10.0,
                bounding_box: BoundingBox::default(),
            })
            .collect();
        let segments = plan_selected_detections(&events, &[2, 3, 4], 2.0, 5.0).unwrap();
        let outcome = |segment: &ExportSegment, error: Option<SegmentError>| SegmentOutcome {
            segment: segment.clone(),
            output_path: PathBuf::from("/out/clip.mp4"),
            success: error.is_none(),
            error,
        };
        let result = ExportBatchResult {
            output_dir: PathBuf::from("/out"),
            segments: vec![
                outcome(&segments[0], Some(SegmentError::TimedOut { secs: 600 })),
                outcome(&segments[1], None),
                outcome(&segments[2], Some(SegmentError::Cancelled)),
            ],
            cancelled: true,
        };
        assert_eq!(retry_picks(&result).as_deref(), Some("2,4"));

        let manual = crate::export::plan_from_range(1.0, 3.0, 0.1).unwrap();
        let result = ExportBatchResult {
            output_dir: PathBuf::from("/out"),
            segments: vec![outcome(&manual[0], Some(SegmentError::Cancelled))],
            cancelled: true,
        };
        assert_eq!(retry_picks(&result), None);
    }
}
