use std::{
    fmt,
    path::{Path, PathBuf},
};

use log::{info, warn};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::{
    config::ExportPolicy,
    error::{ExportError, SegmentError},
    planner::ExportSegment,
    transcoder::{TranscodeRequest, Transcoder},
};

/// Progress of one batch. Only `Validating` and `Preparing` can fail the
/// batch; every batch that gets past them ends in `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStage {
    Validating,
    Preparing,
    Processing { index: usize, total: usize },
    Completed,
}

impl fmt::Display for BatchStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchStage::Validating => write!(f, "Validating"),
            BatchStage::Preparing => write!(f, "Preparing"),
            BatchStage::Processing { index, total } => {
                write!(f, "Processing {}/{}", index + 1, total)
            }
            BatchStage::Completed => write!(f, "Completed"),
        }
    }
}

/// Output directory chosen by the user, or an explicit decline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FolderSelection {
    Selected(PathBuf),
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentOutcome {
    pub segment: ExportSegment,
    pub output_path: PathBuf,
    pub success: bool,
    pub error: Option<SegmentError>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportBatchResult {
    pub output_dir: PathBuf,
    /// One entry per input segment, in input order.
    pub segments: Vec<SegmentOutcome>,
    pub cancelled: bool,
}

impl ExportBatchResult {
    pub fn succeeded(&self) -> usize {
        self.segments.iter().filter(|outcome| outcome.success).count()
    }

    pub fn failed(&self) -> usize {
        self.segments.len() - self.succeeded()
    }

    /// Segments to hand back to `run_batch` for a retry.
    pub fn failed_segments(&self) -> Vec<ExportSegment> {
        self.segments
            .iter()
            .filter(|outcome| !outcome.success)
            .map(|outcome| outcome.segment.clone())
            .collect()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed() == 0
    }
}

/// Cuts planned segments out of one input video, one transcode at a time.
pub struct ExportOrchestrator<T> {
    transcoder: T,
    policy: ExportPolicy,
}

impl<T: Transcoder> ExportOrchestrator<T> {
    pub fn new(transcoder: T, policy: ExportPolicy) -> Self {
        Self { transcoder, policy }
    }

    pub fn policy(&self) -> &ExportPolicy {
        &self.policy
    }

    pub async fn run_batch(
        &self,
        segments: &[ExportSegment],
        input: &Path,
        output_dir: &Path,
        cancel_token: &CancellationToken,
    ) -> Result<ExportBatchResult, ExportError> {
        log_stage(BatchStage::Validating, input);
        let is_file = tokio::fs::metadata(input)
            .await
            .map(|meta| meta.is_file())
            .unwrap_or(false);
        if !is_file {
            return Err(ExportError::MissingInput(input.to_path_buf()));
        }

        log_stage(BatchStage::Preparing, input);
        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|source| ExportError::OutputDir {
                path: output_dir.to_path_buf(),
                source,
            })?;

        let stem = input
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "video".to_string());

        let total = segments.len();
        let mut outcomes = Vec::with_capacity(total);
        for (index, segment) in segments.iter().enumerate() {
            let output_path =
                output_dir.join(segment.output_filename(&stem, &self.policy.container_ext));

            let result = if cancel_token.is_cancelled() {
                Err(SegmentError::Cancelled)
            } else {
                log_stage(BatchStage::Processing { index, total }, input);
                let request = TranscodeRequest {
                    input: input.to_path_buf(),
                    start_secs: segment.range.start,
                    duration_secs: segment.range.duration(),
                    output: output_path.clone(),
                };
                self.transcode_one(&request, cancel_token).await
            };

            match &result {
                Ok(()) => info!("Exported segment {} to {}", segment.label, output_path.display()),
                Err(SegmentError::Cancelled) => {}
                Err(err) => warn!("Segment {} failed: {err}", segment.label),
            }

            outcomes.push(SegmentOutcome {
                segment: segment.clone(),
                output_path,
                success: result.is_ok(),
                error: result.err(),
            });
        }

        let cancelled = outcomes
            .iter()
            .any(|outcome| outcome.error == Some(SegmentError::Cancelled));
        log_stage(BatchStage::Completed, input);

        let result = ExportBatchResult {
            output_dir: output_dir.to_path_buf(),
            segments: outcomes,
            cancelled,
        };
        info!(
            "Export of {} finished: {} succeeded, {} failed{}",
            input.display(),
            result.succeeded(),
            result.failed(),
            if cancelled { " (cancelled)" } else { "" }
        );
        Ok(result)
    }

    async fn transcode_one(
        &self,
        request: &TranscodeRequest,
        cancel_token: &CancellationToken,
    ) -> Result<(), SegmentError> {
        let transcode = async {
            match self.policy.timeout {
                Some(limit) => tokio::time::timeout(limit, self.transcoder.transcode(request))
                    .await
                    .unwrap_or(Err(SegmentError::TimedOut {
                        secs: limit.as_secs(),
                    })),
                None => self.transcoder.transcode(request).await,
            }
        };

        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => Err(SegmentError::Cancelled),
            result = transcode => result,
        }
    }
}

fn log_stage(stage: BatchStage, input: &Path) {
    info!("Export batch for {}: {stage}", input.display());
}
