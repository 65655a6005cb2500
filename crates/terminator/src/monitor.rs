//! # Termination Monitor
//!
//! Polls the activities directory until job activities are done with the
//! signal. The first poll happens immediately, then one every
//! [`MonitorSettings::interval`], with no upper bound on the number of polls.
//!
//! Two exits:
//!
//! - [`WaitExit::Quiescent`]: the poll found no recognized entry and more than
//!   [`MonitorSettings::timeout`] has passed since the wait began. Activities
//!   may not have registered yet when the wait starts, so an empty directory
//!   only counts once the grace period is over.
//! - [`WaitExit::AllFinished`]: the poll found at least one recognized entry
//!   and none of them is running.
//!
//! A scan error ends the wait immediately.

use std::fmt;
use std::path::Path;

use tracing::{debug, info};

use crate::activity::{self, ActivityScan};
use crate::clock::Clock;
use crate::config::MonitorSettings;
use crate::Result;

/// Why the monitor stopped waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitExit {
    /// No activity ever showed up within the timeout.
    Quiescent,
    /// Every registered activity has finished.
    AllFinished,
}

impl fmt::Display for WaitExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Quiescent => "quiescent",
            Self::AllFinished => "all-finished",
        })
    }
}

pub struct Monitor<C> {
    settings: MonitorSettings,
    clock: C,
}

impl<C: Clock> Monitor<C> {
    pub fn new(settings: MonitorSettings, clock: C) -> Self {
        Self { settings, clock }
    }

    /// Block until one of the exits fires.
    ///
    /// # Errors
    ///
    /// Propagates the first scan error.
    pub async fn wait(&self, activities_dir: &Path) -> Result<WaitExit> {
        let started = self.clock.now();
        let mut polls: u64 = 0;

        info!(
            path = %activities_dir.display(),
            interval_secs = self.settings.interval.as_secs(),
            timeout_secs = self.settings.timeout.as_secs(),
            "Waiting for job activities"
        );

        loop {
            polls += 1;
            let scan = activity::scan(activities_dir)?;
            let elapsed = self.clock.now().saturating_duration_since(started);

            debug!(
                poll = polls,
                elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                running = scan.running,
                finished = scan.finished,
                "Polled job activities"
            );

            if let Some(exit) = self.evaluate(&scan, elapsed) {
                info!(
                    exit = %exit,
                    polls,
                    elapsed_secs = elapsed.as_secs(),
                    finished = scan.finished,
                    "Job activities settled"
                );
                return Ok(exit);
            }

            self.clock.sleep(self.settings.interval).await;
        }
    }

    fn evaluate(&self, scan: &ActivityScan, elapsed: std::time::Duration) -> Option<WaitExit> {
        if scan.no_activities {
            (elapsed > self.settings.timeout).then_some(WaitExit::Quiescent)
        } else {
            scan.all_finished.then_some(WaitExit::AllFinished)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::TerminatorError;
    use std::fs;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    fn monitor(interval: u64, timeout: u64) -> (Monitor<Arc<ManualClock>>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        (
            Monitor::new(MonitorSettings::from_secs(interval, timeout), Arc::clone(&clock)),
            clock,
        )
    }

    #[tokio::test]
    async fn test_empty_directory_waits_for_timeout() {
        let tmp = TempDir::new().unwrap();
        let (monitor, clock) = monitor(1, 3);

        let exit = monitor.wait(tmp.path()).await.unwrap();

        assert_eq!(exit, WaitExit::Quiescent);
        // Elapsed must strictly exceed the timeout.
        assert_eq!(clock.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_zero_timeout_still_needs_time_to_pass() {
        let tmp = TempDir::new().unwrap();
        let (monitor, clock) = monitor(2, 0);

        assert_eq!(monitor.wait(tmp.path()).await.unwrap(), WaitExit::Quiescent);
        assert_eq!(clock.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_finished_activities_exit_on_first_poll() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("finished-a"), b"").unwrap();
        let (monitor, clock) = monitor(1, 60);

        assert_eq!(monitor.wait(tmp.path()).await.unwrap(), WaitExit::AllFinished);
        assert_eq!(clock.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_scan_error_ends_wait() {
        let tmp = TempDir::new().unwrap();
        let (monitor, _clock) = monitor(1, 60);

        let err = monitor.wait(&tmp.path().join("missing")).await.unwrap_err();

        assert!(matches!(err, TerminatorError::Scan { .. }));
    }

    #[test]
    fn test_evaluate_running_never_exits() {
        let (monitor, _clock) = monitor(1, 0);
        let scan = ActivityScan {
            no_activities: false,
            all_finished: false,
            running: 1,
            finished: 3,
        };

        assert_eq!(monitor.evaluate(&scan, Duration::from_secs(3600)), None);
    }
}
