//! # Coordination Directory
//!
//! The directory `<signal-root>/<namespace>/<name>/` is both the mutex between
//! terminator instances and the message board read by job activities. It is
//! claimed with an exclusive `mkdir`; whoever creates it owns it until the
//! returned [`SignalLease`] is released or dropped.
//!
//! Job activities run in other containers (often as other users), so every
//! directory is created with mode `0777`, subject to the process umask.

use std::ffi::OsStr;
use std::fs::{self, DirBuilder, OpenOptions};
use std::io::{self, ErrorKind};
use std::path::{Component, Path, PathBuf};

use tracing::{debug, error, info, warn};

use crate::error::TerminatorError;
use crate::mode::TerminationMode;
use crate::Result;

/// Sub-directory that job activities populate with marker entries.
pub const ACTIVITIES_DIR: &str = "jobActivities";

/// Root of the shared signal volume.
#[derive(Debug, Clone)]
pub struct SignalRoot {
    root: PathBuf,
}

/// Result of trying to claim a coordination directory.
#[derive(Debug)]
pub enum Acquisition {
    /// This process owns the directory.
    Leased(SignalLease),
    /// The directory already exists; another terminator is handling the run.
    AlreadyRunning { path: PathBuf },
}

impl SignalRoot {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the coordination directory for a run.
    #[must_use]
    pub fn coordination_dir(&self, namespace: &str, name: &str) -> PathBuf {
        self.root.join(namespace).join(name)
    }

    /// Claim the coordination directory for `namespace/name`.
    ///
    /// The namespace directory is created on demand; the run directory itself
    /// is created with a single non-recursive `mkdir`, which is the atomic
    /// exclusion point. An existing directory is left untouched and reported
    /// as [`Acquisition::AlreadyRunning`].
    ///
    /// # Errors
    ///
    /// Returns [`TerminatorError::InvalidTarget`] for names that are not a
    /// single path component and [`TerminatorError::CreateDir`] for any
    /// filesystem failure other than "already exists".
    pub fn acquire(&self, namespace: &str, name: &str) -> Result<Acquisition> {
        validate_component("namespace", namespace)?;
        validate_component("name", name)?;

        let namespace_dir = self.root.join(namespace);
        dir_builder(true)
            .create(&namespace_dir)
            .map_err(|source| TerminatorError::CreateDir {
                path: namespace_dir.clone(),
                source,
            })?;

        let dir = namespace_dir.join(name);
        match dir_builder(false).create(&dir) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                info!(
                    path = %dir.display(),
                    "Coordination directory exists, another terminator is working on this run"
                );
                return Ok(Acquisition::AlreadyRunning { path: dir });
            }
            Err(source) => {
                error!(path = %dir.display(), error = %source, "Failed to create coordination directory");
                return Err(TerminatorError::CreateDir { path: dir, source });
            }
        }

        // From here on the lease owns the directory; dropping it on error removes it.
        let lease = SignalLease {
            dir,
            signal: None,
            released: false,
        };

        let activities = lease.activities_dir();
        dir_builder(false)
            .create(&activities)
            .map_err(|source| TerminatorError::CreateDir {
                path: activities,
                source,
            })?;

        debug!(path = %lease.dir.display(), "Acquired coordination directory");
        Ok(Acquisition::Leased(lease))
    }
}

/// Exclusive ownership of one coordination directory.
///
/// Only the holder may write a signal file. The directory is removed by
/// [`SignalLease::release`] or, failing that, on drop.
#[derive(Debug)]
pub struct SignalLease {
    dir: PathBuf,
    signal: Option<PathBuf>,
    released: bool,
}

impl SignalLease {
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn activities_dir(&self) -> PathBuf {
        self.dir.join(ACTIVITIES_DIR)
    }

    /// Signal file written through this lease, if any.
    #[must_use]
    pub fn signal_path(&self) -> Option<&Path> {
        self.signal.as_deref()
    }

    /// Create the signal file for `mode` with create-exclusive semantics.
    ///
    /// A lease writes at most one signal.
    ///
    /// # Errors
    ///
    /// - [`TerminatorError::NoSignalForMode`] for [`TerminationMode::Abort`]
    /// - [`TerminatorError::SignalExists`] if the file (or an earlier signal
    ///   from this lease) already exists
    /// - [`TerminatorError::WriteSignal`] for any other I/O failure
    pub fn write_signal(&mut self, mode: TerminationMode) -> Result<&Path> {
        let file_name = mode
            .signal_file_name()
            .ok_or(TerminatorError::NoSignalForMode(mode))?;

        if let Some(existing) = &self.signal {
            info!(path = %existing.display(), "Signal already written by this terminator");
            return Err(TerminatorError::SignalExists {
                path: existing.clone(),
            });
        }

        let path = self.dir.join(file_name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => {
                info!(path = %path.display(), mode = %mode, "Signal sent");
                Ok(self.signal.insert(path).as_path())
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                info!(path = %path.display(), "Signal already exists, another terminator is running");
                Err(TerminatorError::SignalExists { path })
            }
            Err(source) => {
                error!(path = %path.display(), error = %source, "Failed to send signal");
                Err(TerminatorError::WriteSignal { path, source })
            }
        }
    }

    /// Recursively delete the coordination directory.
    ///
    /// A directory that is already gone is not an error.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if removal fails for another reason.
    pub fn release(mut self) -> io::Result<()> {
        self.released = true;
        let result = remove_dir_if_exists(&self.dir);
        if result.is_ok() {
            debug!(path = %self.dir.display(), "Released coordination directory");
        }
        result
    }
}

impl Drop for SignalLease {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = remove_dir_if_exists(&self.dir) {
            warn!(
                path = %self.dir.display(),
                error = %e,
                "Failed to remove coordination directory, it must be removed manually"
            );
        }
    }
}

fn remove_dir_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_dir_all(path) {
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

fn dir_builder(recursive: bool) -> DirBuilder {
    let mut builder = DirBuilder::new();
    builder.recursive(recursive);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o777);
    }
    builder
}

fn validate_component(field: &'static str, value: &str) -> Result<()> {
    let mut components = Path::new(value).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(c)), None) if c == OsStr::new(value) => Ok(()),
        _ => Err(TerminatorError::InvalidTarget {
            field,
            value: value.to_string(),
        }),
    }
}
