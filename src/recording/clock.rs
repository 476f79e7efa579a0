use std::time::Instant;

use chrono::{DateTime, Utc};

/// Time base for one recording session.
///
/// `started_at` is the wall-clock zero point stored with the recording;
/// elapsed time is measured against a monotonic anchor so it never runs
/// backwards even if the system clock is adjusted mid-session.
#[derive(Debug, Clone, Copy)]
pub struct SessionClock {
    started_at: DateTime<Utc>,
    anchor: Instant,
}

impl SessionClock {
    pub fn start() -> Self {
        Self {
            started_at: Utc::now(),
            anchor: Instant::now(),
        }
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Seconds since `start()`.
    pub fn elapsed(&self) -> f64 {
        self.anchor.elapsed().as_secs_f64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn elapsed_starts_near_zero() {
        let clock = SessionClock::start();
        assert!(clock.elapsed() < 1.0);
    }

    #[test]
    fn elapsed_never_runs_backwards() {
        let clock = SessionClock::start();
        let mut previous = clock.elapsed();
        for _ in 0..1000 {
            let current = clock.elapsed();
            assert!(current >= previous);
            previous = current;
        }
    }

    #[test]
    fn elapsed_tracks_wall_time() {
        let clock = SessionClock::start();
        std::thread::sleep(Duration::from_millis(30));
        assert!(clock.elapsed() >= 0.03);
    }

    #[test]
    fn copies_share_the_same_zero_point() {
        let clock = SessionClock::start();
        let copy = clock;
        assert_eq!(clock.started_at(), copy.started_at());
        assert!(copy.elapsed() >= 0.0);
    }
}
