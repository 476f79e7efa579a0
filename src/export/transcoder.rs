use std::{
    future::Future,
    path::PathBuf,
    process::Stdio,
};

use log::debug;
use tokio::process::Command;

use super::{config::ExportPolicy, error::SegmentError};

/// One clip to cut: `duration_secs` of `input` starting at `start_secs`.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscodeRequest {
    pub input: PathBuf,
    pub start_secs: f64,
    pub duration_secs: f64,
    pub output: PathBuf,
}

/// External transcoding capability. Exit status 0 is success; anything else
/// is a `SegmentError` carrying the process diagnostics.
pub trait Transcoder: Send + Sync {
    fn transcode(
        &self,
        request: &TranscodeRequest,
    ) -> impl Future<Output = Result<(), SegmentError>> + Send;
}

/// Runs the `ffmpeg` executable once per clip.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    program: PathBuf,
    video_codec: String,
    audio_codec: String,
    overwrite: bool,
}

impl FfmpegTranscoder {
    pub fn new(program: impl Into<PathBuf>, policy: &ExportPolicy) -> Self {
        Self {
            program: program.into(),
            video_codec: policy.video_codec.clone(),
            audio_codec: policy.audio_codec.clone(),
            overwrite: policy.overwrite,
        }
    }

    pub fn args(&self, request: &TranscodeRequest) -> Vec<String> {
        let mut args = vec![
            "-i".to_string(),
            request.input.to_string_lossy().into_owned(),
            "-ss".to_string(),
            format!("{:.3}", request.start_secs),
            "-t".to_string(),
            format!("{:.3}", request.duration_secs),
            "-c:v".to_string(),
            self.video_codec.clone(),
            "-c:a".to_string(),
            self.audio_codec.clone(),
        ];
        args.push(if self.overwrite { "-y" } else { "-n" }.to_string());
        args.push(request.output.to_string_lossy().into_owned());
        args
    }
}

impl Transcoder for FfmpegTranscoder {
    async fn transcode(&self, request: &TranscodeRequest) -> Result<(), SegmentError> {
        let args = self.args(request);
        debug!("Running {} {}", self.program.display(), args.join(" "));

        // Dropping the future (timeout, cancellation) kills the child.
        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| SegmentError::Spawn {
                message: err.to_string(),
            })?;

        let output = child
            .wait_with_output()
            .await
            .map_err(|err| SegmentError::Spawn {
                message: err.to_string(),
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if output.status.success() {
            if !stderr.is_empty() {
                debug!("ffmpeg output for {}: {stderr}", request.output.display());
            }
            Ok(())
        } else {
            Err(SegmentError::Transcode {
                code: output.status.code(),
                stderr,
            })
        }
    }
}
