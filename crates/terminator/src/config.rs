//! Runtime settings for one termination attempt.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::TerminatorError;
use crate::mode::TerminationMode;
use crate::Result;

/// Default mount point of the shared signal volume.
pub const DEFAULT_SIGNAL_ROOT: &str = "/termination";

/// Default `spec.status` written to cancel a `PipelineRun`.
pub const DEFAULT_CANCEL_STATUS: &str = "PipelineRunCancelled";

pub const DEFAULT_MONITOR_INTERVAL_SECS: u64 = 2;
pub const DEFAULT_MONITOR_TIMEOUT_SECS: u64 = 60;

/// Polling policy of the termination monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorSettings {
    /// Pause between two scans.
    pub interval: Duration,
    /// How long to wait for a first activity entry before giving up on them.
    pub timeout: Duration,
}

impl MonitorSettings {
    #[must_use]
    pub const fn from_secs(interval: u64, timeout: u64) -> Self {
        Self {
            interval: Duration::from_secs(interval),
            timeout: Duration::from_secs(timeout),
        }
    }
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self::from_secs(DEFAULT_MONITOR_INTERVAL_SECS, DEFAULT_MONITOR_TIMEOUT_SECS)
    }
}

/// Everything the terminator needs to handle one `PipelineRun`.
#[derive(Debug, Clone)]
pub struct TerminatorConfig {
    pub namespace: String,
    pub name: String,
    pub mode: TerminationMode,
    pub monitor: MonitorSettings,
    pub signal_root: PathBuf,
    pub cancel_status: String,
}

impl TerminatorConfig {
    /// Config with default monitor settings, signal root and cancel status.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, mode: TerminationMode) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            mode,
            monitor: MonitorSettings::default(),
            signal_root: PathBuf::from(DEFAULT_SIGNAL_ROOT),
            cancel_status: DEFAULT_CANCEL_STATUS.to_string(),
        }
    }

    /// Reject settings that cannot work before anything is touched.
    ///
    /// # Errors
    ///
    /// Returns [`TerminatorError::Config`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.namespace.trim().is_empty() {
            return Err(TerminatorError::Config("namespace must not be empty".to_string()));
        }
        if self.name.trim().is_empty() {
            return Err(TerminatorError::Config("name must not be empty".to_string()));
        }
        if self.mode.waits() && self.monitor.interval.is_zero() {
            return Err(TerminatorError::Config(
                "monitor interval must be at least one second".to_string(),
            ));
        }
        if self.cancel_status.trim().is_empty() {
            return Err(TerminatorError::Config("cancel status must not be empty".to_string()));
        }
        Ok(())
    }
}
