//! Shared timing limits for hardware polling.
//!
//! Both controllers wait on hardware by polling a status register. These
//! constants bound how often they poll and how long they wait.

use std::time::Duration;

// =============================================================================
// Focuser
// =============================================================================

/// Interval between `steps_remaining` polls while waiting for a move (50 ms).
pub const FOCUSER_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Longest a blocking focus move may take (2 minutes).
///
/// Full travel on the precision focuser takes well under a minute.
pub const FOCUSER_MOTION_TIMEOUT: Duration = Duration::from_secs(120);

// =============================================================================
// Camera
// =============================================================================

/// Interval between imaging status polls during an exposure (10 ms).
pub const CAMERA_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Time allowed past the exposure length for flush and readout (60 s).
///
/// A full-frame unbinned readout of a 16 Mpx sensor over USB takes ~10 s.
pub const CAMERA_READOUT_TIMEOUT: Duration = Duration::from_secs(60);

/// Longest exposure a capture request may ask for, in seconds.
///
/// The Alta exposure timer counts 2^20 ticks of 10 ms.
pub const MAX_EXPOSURE_SECONDS: f64 = 10_485.75;

/// Polling cadence and upper bound for a wait-until-ready loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// Sleep between polls.
    pub interval: Duration,
    /// Give up after this long.
    pub timeout: Duration,
}

impl PollSettings {
    /// Create poll settings.
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    /// Default settings for focuser motion.
    pub fn focuser() -> Self {
        Self::new(FOCUSER_POLL_INTERVAL, FOCUSER_MOTION_TIMEOUT)
    }

    /// Default settings for camera readout.
    ///
    /// For exposures the effective timeout is `exposure + timeout`.
    pub fn camera() -> Self {
        Self::new(CAMERA_POLL_INTERVAL, CAMERA_READOUT_TIMEOUT)
    }
}
