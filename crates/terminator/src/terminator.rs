//! One termination attempt, end to end.

use std::path::PathBuf;

use tracing::{info, warn};

use crate::clock::Clock;
use crate::config::TerminatorConfig;
use crate::controller::RunController;
use crate::mode::TerminationMode;
use crate::monitor::{Monitor, WaitExit};
use crate::signal_dir::{Acquisition, SignalLease, SignalRoot};
use crate::Result;

/// How an attempt ended without error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// `abort` mode: the run was cancelled without signalling anything.
    CancelledImmediately,
    /// Another terminator owns the coordination directory or its signal.
    AlreadyRunning { path: PathBuf },
    /// Activities were signalled, optionally awaited, and the run cancelled.
    Cancelled {
        mode: TerminationMode,
        /// `None` when the mode does not wait.
        exit: Option<WaitExit>,
    },
}

pub struct Terminator<R, C> {
    config: TerminatorConfig,
    controller: R,
    clock: C,
}

impl<R: RunController, C: Clock> Terminator<R, C> {
    pub fn new(config: TerminatorConfig, controller: R, clock: C) -> Self {
        Self {
            config,
            controller,
            clock,
        }
    }

    #[must_use]
    pub fn config(&self) -> &TerminatorConfig {
        &self.config
    }

    /// Signal, wait, cancel.
    ///
    /// The coordination directory is removed on every path once it has been
    /// acquired, including error paths.
    ///
    /// # Errors
    ///
    /// Returns configuration, filesystem, scan and control-plane errors.
    /// Losing the race to another terminator is reported as
    /// [`Outcome::AlreadyRunning`], not as an error.
    pub async fn run(&self) -> Result<Outcome> {
        self.config.validate()?;

        let namespace = self.config.namespace.as_str();
        let name = self.config.name.as_str();
        let mode = self.config.mode;

        if mode == TerminationMode::Abort {
            info!(
                namespace = %namespace,
                name = %name,
                "Cancelling PipelineRun without signalling job activities"
            );
            self.controller.cancel(namespace, name).await?;
            return Ok(Outcome::CancelledImmediately);
        }

        let root = SignalRoot::new(&self.config.signal_root);
        match root.acquire(namespace, name)? {
            Acquisition::Leased(lease) => self.run_leased(lease).await,
            Acquisition::AlreadyRunning { path } => Ok(Outcome::AlreadyRunning { path }),
        }
    }

    /// Signal, wait and cancel while holding `lease`.
    ///
    /// The lease is released (or dropped) before returning.
    async fn run_leased(&self, mut lease: SignalLease) -> Result<Outcome> {
        let namespace = self.config.namespace.as_str();
        let name = self.config.name.as_str();
        let mode = self.config.mode;

        match lease.write_signal(mode).map(|_| ()) {
            Ok(()) => {}
            Err(e) if e.is_contention() => {
                return Ok(Outcome::AlreadyRunning {
                    path: lease.dir().to_path_buf(),
                });
            }
            Err(e) => return Err(e),
        }

        let exit = if mode.waits() {
            let monitor = Monitor::new(self.config.monitor, &self.clock);
            Some(monitor.wait(&lease.activities_dir()).await?)
        } else {
            None
        };

        info!(namespace = %namespace, name = %name, mode = %mode, "Cancelling PipelineRun");
        self.controller.cancel(namespace, name).await?;

        let dir = lease.dir().to_path_buf();
        if let Err(e) = lease.release() {
            warn!(
                path = %dir.display(),
                error = %e,
                "Failed to remove coordination directory, it must be removed manually"
            );
        }

        Ok(Outcome::Cancelled { mode, exit })
    }
}
