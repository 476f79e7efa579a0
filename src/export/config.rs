use std::time::Duration;

/// Seconds of context kept before a detection.
pub const DEFAULT_LEAD_SECS: f64 = 2.0;
/// Total length of a detection-derived clip.
pub const DEFAULT_WINDOW_SECS: f64 = 5.0;
/// Shortest manual range the planner accepts.
pub const MIN_RANGE_SECS: f64 = 0.1;
pub const DEFAULT_TIMEOUT_SECS: u64 = 600;

/// Planning constants and the fixed codec policy for exported clips.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportPolicy {
    pub lead_secs: f64,
    pub window_secs: f64,
    pub min_range_secs: f64,

    /// Codec arguments passed to the transcoder. Both streams are re-encoded.
    pub video_codec: String,
    pub audio_codec: String,
    /// Overwrite an existing output file instead of failing.
    pub overwrite: bool,
    pub container_ext: String,

    /// Per-segment transcode limit. `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl Default for ExportPolicy {
    fn default() -> Self {
        Self {
            lead_secs: DEFAULT_LEAD_SECS,
            window_secs: DEFAULT_WINDOW_SECS,
            min_range_secs: MIN_RANGE_SECS,
            video_codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
            overwrite: true,
            container_ext: "mp4".to_string(),
            timeout: Some(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
        }
    }
}

impl ExportPolicy {
    /// Apply a timeout in seconds where 0 means no limit.
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout = (secs > 0).then(|| Duration::from_secs(secs));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_timeout_disables_limit() {
        let policy = ExportPolicy::default().with_timeout_secs(0);
        assert_eq!(policy.timeout, None);

        let policy = ExportPolicy::default().with_timeout_secs(30);
        assert_eq!(policy.timeout, Some(Duration::from_secs(30)));
    }
}
