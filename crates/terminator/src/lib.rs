//! Cooperative termination of a Tekton `PipelineRun`.
//!
//! Job activities running inside the pipeline share a volume with the
//! terminator. Before the run is cancelled, the terminator drops a signal file
//! into a per-run coordination directory, waits for the activities to report
//! through marker entries, and only then asks the control plane to cancel.
//!
//! # Layout
//!
//! ```text
//! <signal-root>/<namespace>/<name>/            coordination directory (mutex)
//! <signal-root>/<namespace>/<name>/<signal>    stop_and_wait | stop | abort_and_wait
//! <signal-root>/<namespace>/<name>/jobActivities/
//!     runing-<id>                              activity still running
//!     finished-<id>                            activity done
//! ```
//!
//! # Architecture
//!
//! - [`SignalRoot`] / [`SignalLease`] own the coordination directory
//! - [`activity::scan`] classifies activity entries
//! - [`Monitor`] polls the scanner until one of its two exits fires
//! - [`RunController`] cancels the run ([`KubeRunController`] for Tekton)
//! - [`Terminator`] ties one attempt together and reports an [`Outcome`]

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod activity;
pub mod clock;
pub mod config;
pub mod controller;
pub mod error;
pub mod mode;
pub mod monitor;
pub mod signal_dir;
pub mod terminator;

pub use activity::{ActivityScan, FINISHED_PREFIX, RUNNING_PREFIX};
pub use clock::{Clock, ManualClock, TokioClock};
pub use config::{MonitorSettings, TerminatorConfig, DEFAULT_SIGNAL_ROOT};
pub use controller::{ControllerError, KubeRunController, RunController, RunSnapshot};
pub use error::TerminatorError;
pub use mode::TerminationMode;
pub use monitor::{Monitor, WaitExit};
pub use signal_dir::{Acquisition, SignalLease, SignalRoot, ACTIVITIES_DIR};
pub use terminator::{Outcome, Terminator};

/// Result alias used across the crate.
pub type Result<T, E = TerminatorError> = std::result::Result<T, E>;
