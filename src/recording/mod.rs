pub mod clock;
pub mod controller;
pub mod dedup;
pub mod session;
pub mod state;

pub use clock::SessionClock;
pub use controller::RecordingController;
pub use dedup::DetectionDeduplicator;
pub use session::{RecordingSession, SessionSnapshot};
pub use state::{RecorderEvent, RecorderSnapshot, RecorderStatus};
