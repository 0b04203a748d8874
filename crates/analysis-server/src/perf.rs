// perf.rs - Timing instrumentation for operation execution
//
// Controlled via the ANALYSIS_SERVER_PERF environment variable.
//
// Usage:
//   ANALYSIS_SERVER_PERF=1 analysis-server --stdio        # Log operation durations
//   ANALYSIS_SERVER_PERF=verbose analysis-server --stdio  # Also warn above the threshold

use std::sync::OnceLock;
use std::time::{Duration, Instant};

static PERF_ENABLED: OnceLock<bool> = OnceLock::new();

static PERF_VERBOSE: OnceLock<bool> = OnceLock::new();

/// Check if performance timing is enabled
pub fn is_enabled() -> bool {
    *PERF_ENABLED.get_or_init(|| {
        std::env::var("ANALYSIS_SERVER_PERF")
            .map(|v| !v.is_empty() && v != "0" && v.to_lowercase() != "false")
            .unwrap_or(false)
    })
}

/// Check if verbose mode is enabled
pub fn is_verbose() -> bool {
    *PERF_VERBOSE.get_or_init(|| {
        std::env::var("ANALYSIS_SERVER_PERF")
            .map(|v| v.to_lowercase() == "verbose")
            .unwrap_or(false)
    })
}

/// RAII guard that logs how long a scope took when dropped.
pub struct TimingGuard {
    start: Instant,
    name: String,
    threshold_warn_ms: Option<u64>,
    enabled: bool,
}

impl TimingGuard {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            name: name.into(),
            threshold_warn_ms: None,
            enabled: is_enabled(),
        }
    }

    /// Like [`TimingGuard::new`], but warns in verbose mode above `threshold_ms`.
    pub fn with_threshold(name: impl Into<String>, threshold_ms: u64) -> Self {
        Self {
            start: Instant::now(),
            name: name.into(),
            threshold_warn_ms: Some(threshold_ms),
            enabled: is_enabled(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for TimingGuard {
    fn drop(&mut self) {
        if !self.enabled {
            return;
        }

        let elapsed = self.start.elapsed();
        log::info!("[PERF] {} completed in {:?}", self.name, elapsed);

        if let Some(threshold) = self.threshold_warn_ms {
            if elapsed.as_millis() > threshold as u128 && is_verbose() {
                log::warn!(
                    "[PERF] {} exceeded threshold ({}ms > {}ms)",
                    self.name,
                    elapsed.as_millis(),
                    threshold
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_measures_elapsed() {
        let guard = TimingGuard::with_threshold("test", 1000);
        std::thread::sleep(Duration::from_millis(5));
        assert!(guard.elapsed() >= Duration::from_millis(5));
    }
}
