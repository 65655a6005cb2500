//! Job activity protocol: what activities write, and how the monitor reacts.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tempfile::TempDir;
use terminator::activity::scan;
use terminator::{
    Acquisition, Clock, ManualClock, Monitor, MonitorSettings, SignalRoot, TokioClock, WaitExit,
};

/// Clock that renames `from` to `to` once `at` has elapsed.
struct RenameAt {
    inner: ManualClock,
    from: PathBuf,
    to: PathBuf,
    at: Duration,
    renamed: AtomicBool,
}

#[async_trait]
impl Clock for RenameAt {
    fn now(&self) -> Instant {
        self.inner.now()
    }

    async fn sleep(&self, duration: Duration) {
        self.inner.advance(duration);
        if self.inner.elapsed() >= self.at && !self.renamed.swap(true, Ordering::SeqCst) {
            fs::rename(&self.from, &self.to).unwrap();
        }
    }
}

#[test]
fn test_scan_finished_only() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("finished-a"), b"").unwrap();
    fs::write(tmp.path().join("finished-b"), b"").unwrap();

    let result = scan(tmp.path()).unwrap();

    assert!(!result.no_activities);
    assert!(result.all_finished);
}

#[test]
fn test_scan_running_and_finished() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("runing-a"), b"").unwrap();
    fs::write(tmp.path().join("finished-b"), b"").unwrap();

    let result = scan(tmp.path()).unwrap();

    assert!(!result.no_activities);
    assert!(!result.all_finished);
}

#[test]
fn test_scan_empty() {
    let tmp = TempDir::new().unwrap();

    let result = scan(tmp.path()).unwrap();

    assert!(result.no_activities);
    assert!(result.all_finished);
}

#[tokio::test(start_paused = true)]
async fn test_empty_activities_exit_after_timeout() {
    let tmp = TempDir::new().unwrap();
    let monitor = Monitor::new(MonitorSettings::from_secs(1, 3), TokioClock);
    let started = tokio::time::Instant::now();

    let exit = monitor.wait(tmp.path()).await.unwrap();

    let elapsed = started.elapsed();
    assert_eq!(exit, WaitExit::Quiescent);
    assert!(elapsed >= Duration::from_secs(3), "{elapsed:?}");
    assert!(elapsed < Duration::from_secs(5), "{elapsed:?}");
}

#[tokio::test]
async fn test_exit_only_after_rename_is_observed() {
    let tmp = TempDir::new().unwrap();
    let running = tmp.path().join("runing-x");
    fs::write(&running, b"").unwrap();
    let clock = RenameAt {
        inner: ManualClock::new(),
        from: running,
        to: tmp.path().join("finished-x"),
        at: Duration::from_secs(2),
        renamed: AtomicBool::new(false),
    };
    let monitor = Monitor::new(MonitorSettings::from_secs(1, 3), &clock);

    let exit = monitor.wait(tmp.path()).await.unwrap();

    assert_eq!(exit, WaitExit::AllFinished);
    assert_eq!(clock.inner.elapsed(), Duration::from_secs(2));
}

#[tokio::test]
async fn test_monitor_reads_lease_activities_dir() {
    let tmp = TempDir::new().unwrap();
    let root = SignalRoot::new(tmp.path());
    let Acquisition::Leased(lease) = root.acquire("ci", "build-42").unwrap() else {
        panic!("expected lease");
    };
    fs::create_dir(lease.activities_dir().join("finished-step-1")).unwrap();
    let clock = ManualClock::new();

    let exit = Monitor::new(MonitorSettings::from_secs(1, 60), &clock)
        .wait(&lease.activities_dir())
        .await
        .unwrap();

    assert_eq!(exit, WaitExit::AllFinished);
    assert_eq!(clock.elapsed(), Duration::ZERO);
    lease.release().unwrap();
}
