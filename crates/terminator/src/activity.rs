//! Activity scanning.
//!
//! Job activities register themselves by creating entries under the
//! activities directory. The prefix of an entry's file name is its state;
//! anything after the prefix is opaque. Entries with neither prefix are
//! ignored so activities can keep auxiliary files next to their markers.

use std::path::Path;

use tracing::debug;
use walkdir::WalkDir;

use crate::error::TerminatorError;
use crate::Result;

/// Prefix of an entry whose activity is still running. The misspelling is
/// part of the wire format shared with job activities.
pub const RUNNING_PREFIX: &str = "runing-";

/// Prefix of an entry whose activity has finished.
pub const FINISHED_PREFIX: &str = "finished-";

/// Point-in-time view of the activities directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivityScan {
    /// No recognized entry was found.
    pub no_activities: bool,
    /// No running entry was found. Vacuously true when `no_activities` is.
    pub all_finished: bool,
    pub running: usize,
    pub finished: usize,
}

impl ActivityScan {
    const EMPTY: Self = Self {
        no_activities: true,
        all_finished: true,
        running: 0,
        finished: 0,
    };
}

/// Walk `activities_dir` recursively and classify every entry by prefix.
///
/// The scan gives no atomicity guarantee against activities creating or
/// renaming entries while it runs.
///
/// # Errors
///
/// Any traversal error, including a missing `activities_dir`, aborts the scan
/// with [`TerminatorError::Scan`].
pub fn scan(activities_dir: &Path) -> Result<ActivityScan> {
    let mut result = ActivityScan::EMPTY;

    for entry in WalkDir::new(activities_dir) {
        let entry = entry.map_err(|source| TerminatorError::Scan {
            path: activities_dir.to_path_buf(),
            source,
        })?;

        let name = entry.file_name().to_string_lossy();
        if name.starts_with(RUNNING_PREFIX) {
            debug!(entry = %name, "Found running activity");
            result.no_activities = false;
            result.all_finished = false;
            result.running += 1;
        } else if name.starts_with(FINISHED_PREFIX) {
            result.no_activities = false;
            result.finished += 1;
        }
    }

    Ok(result)
}
