//! Consecutive fetch failure tracking.

/// Counts consecutive metadata fetch failures and decides when to log.
///
/// A single failure is usually a momentary blip and is not logged. The
/// second consecutive failure is logged so persistent problems surface
/// quickly. Later failures in the same streak stay quiet until a success
/// resets the counter. The count never influences whether to retry.
#[derive(Debug, Clone, Default)]
pub struct FetchFailures {
    consecutive: u32,
}

impl FetchFailures {
    /// Failure count that triggers the diagnostic log entry.
    pub const LOG_AT: u32 = 2;

    /// Create a tracker with no recorded failures.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure. Returns true if this failure should be logged.
    pub fn record_failure(&mut self) -> bool {
        self.consecutive = self.consecutive.saturating_add(1);
        self.consecutive == Self::LOG_AT
    }

    /// Record a success, ending the current streak.
    pub fn record_success(&mut self) {
        self.consecutive = 0;
    }

    /// Current streak length.
    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }
}
