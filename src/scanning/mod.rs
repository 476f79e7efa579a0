pub mod controller;
pub mod frames;
pub mod loop_worker;

pub use controller::ScanController;
pub use frames::{
    frame_channel, read_scan_log, replay_scan_log, Frame, FrameReceiver, FrameSender,
    ScanLogEntry, TimedScan,
};
pub use loop_worker::ScanStats;
