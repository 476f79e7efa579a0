//! Command-line definition.

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

/// qrcam - record camera sessions with QR detection timelines and export clips
#[derive(Parser, Debug)]
#[command(name = "qrcam")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Data directory (config.json, default database and videos)
    #[arg(long, global = true, env = "QRCAM_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Output in JSON format for scripting
    #[arg(long, global = true)]
    pub json: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose logging (repeat for more)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn verbosity(&self) -> i8 {
        if self.quiet {
            -1
        } else {
            self.verbose.min(i8::MAX as u8) as i8
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Record a session from a scan log and save it with its video
    Record {
        /// JSON-lines scan log, one decoded frame per line
        #[arg(long)]
        scans: PathBuf,

        /// Video file produced by the camera recorder
        #[arg(long)]
        video: PathBuf,

        /// Notes stored with the recording
        #[arg(long)]
        notes: Option<String>,

        /// Replay frames as fast as possible instead of at their offsets
        #[arg(long)]
        no_realtime: bool,
    },
    /// List saved recordings, newest first
    List,
    /// Find recordings containing a QR text
    Search {
        text: String,
    },
    /// Show a recording and its detection timeline
    Show {
        filename: String,
    },
    /// Print the absolute path of a recording's video file
    Path {
        filename: String,
    },
    /// Delete a recording, its sidecar and its index entries
    Delete {
        filename: String,
    },
    /// Replace a recording's notes
    Notes {
        filename: String,
        text: String,
    },
    /// Export clips from a recording
    Export {
        #[command(subcommand)]
        target: ExportTarget,
    },
    /// Show or change configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ExportTarget {
    /// One clip around each QR detection
    Qr {
        filename: String,

        /// Only these detections (1-based, as numbered by `show`)
        #[arg(long, value_delimiter = ',')]
        pick: Vec<usize>,

        /// Destination folder (defaults to the configured export folder)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },
    /// One clip for an explicit time range
    Range {
        filename: String,

        /// Start, in seconds or mm:ss
        #[arg(long, allow_hyphen_values = true)]
        start: String,

        /// End, in seconds or mm:ss
        #[arg(long, allow_hyphen_values = true)]
        end: String,

        /// Destination folder (defaults to the configured export folder)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Folder for recorded videos
    SetStorage { dir: PathBuf },
    /// Folder holding database.db
    SetDatabase { dir: PathBuf },
    /// Default folder for exported clips
    SetExportDir { dir: PathBuf },
    /// ffmpeg executable
    SetFfmpeg { path: PathBuf },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_record() {
        let cli = Cli::try_parse_from([
            "qrcam", "record", "--scans", "scans.jsonl", "--video", "cam.webm", "--no-realtime",
        ])
        .unwrap();
        match cli.command {
            Commands::Record {
                scans,
                video,
                notes,
                no_realtime,
            } => {
                assert_eq!(scans, PathBuf::from("scans.jsonl"));
                assert_eq!(video, PathBuf::from("cam.webm"));
                assert!(notes.is_none());
                assert!(no_realtime);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn parse_export_qr_with_picks() {
        let cli = Cli::try_parse_from([
            "qrcam", "export", "qr", "a.webm", "--pick", "1,3", "-o", "/tmp/out",
        ])
        .unwrap();
        match cli.command {
            Commands::Export {
                target:
                    ExportTarget::Qr {
                        filename,
                        pick,
                        output_dir,
                    },
            } => {
                assert_eq!(filename, "a.webm");
                assert_eq!(pick, vec![1, 3]);
                assert_eq!(output_dir, Some(PathBuf::from("/tmp/out")));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn parse_export_range() {
        let cli = Cli::try_parse_from([
            "qrcam", "export", "range", "a.webm", "--start", "1:05", "--end", "70",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Export {
                target: ExportTarget::Range { ref start, ref end, output_dir: None, .. }
            } if start == "1:05" && end == "70"
        ));
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["qrcam", "list", "--json", "-vv"]).unwrap();
        assert!(cli.json);
        assert_eq!(cli.verbosity(), 2);

        let cli = Cli::try_parse_from(["qrcam", "-q", "list"]).unwrap();
        assert_eq!(cli.verbosity(), -1);
    }

    #[test]
    fn missing_required_args_fail() {
        assert!(Cli::try_parse_from(["qrcam", "record", "--scans", "s.jsonl"]).is_err());
        assert!(Cli::try_parse_from(["qrcam", "export", "range", "a.webm"]).is_err());
    }
}
