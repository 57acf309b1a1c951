//! Resource limits for sandboxed execution.

use std::time::Duration;

/// Default executed-line ceiling per run.
pub const DEFAULT_MAX_LINES: u64 = 1000;

/// Default wall-clock ceiling per run.
pub const DEFAULT_MAX_TIME: Duration = Duration::from_secs(10);

/// Default cadence at which the stop flag is re-checked.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Resource limits enforced by the execution engine.
///
/// Fixed at engine construction; not adjustable per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Executed-line ceiling. Re-executed lines (loop bodies) count
    /// every time they run.
    pub max_lines: u64,
    /// Wall-clock ceiling.
    pub max_time: Duration,
    /// How often the cooperative stop flag is polled.
    pub poll_interval: Duration,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_lines: DEFAULT_MAX_LINES,
            max_time: DEFAULT_MAX_TIME,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let limits = Limits::default();
        assert_eq!(limits.max_lines, 1000);
        assert_eq!(limits.max_time, Duration::from_secs(10));
        assert_eq!(limits.poll_interval, Duration::from_millis(100));
    }
}
