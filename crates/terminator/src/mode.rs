//! Termination modes and their signal file names.

use std::fmt;

/// How the terminator asks job activities to wind down.
///
/// `Stop*` modes instruct activities to shut down cooperatively; `Abort*`
/// modes send no stop instruction. `*AndWait` modes block until activities
/// report completion before the run is cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerminationMode {
    StopAndWait,
    Stop,
    AbortAndWait,
    Abort,
}

impl TerminationMode {
    /// All modes, in flag-table order.
    pub const ALL: [Self; 4] = [Self::StopAndWait, Self::Stop, Self::AbortAndWait, Self::Abort];

    /// Derive the mode from the `--send-stop` and `--wait` flags.
    #[must_use]
    pub const fn from_flags(send_stop: bool, wait: bool) -> Self {
        match (send_stop, wait) {
            (true, true) => Self::StopAndWait,
            (true, false) => Self::Stop,
            (false, true) => Self::AbortAndWait,
            (false, false) => Self::Abort,
        }
    }

    #[must_use]
    pub const fn sends_stop(self) -> bool {
        matches!(self, Self::StopAndWait | Self::Stop)
    }

    #[must_use]
    pub const fn waits(self) -> bool {
        matches!(self, Self::StopAndWait | Self::AbortAndWait)
    }

    /// Wire name shared with job activities.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StopAndWait => "stop_and_wait",
            Self::Stop => "stop",
            Self::AbortAndWait => "abort_and_wait",
            Self::Abort => "abort",
        }
    }

    /// File written into the coordination directory, if any.
    ///
    /// `Abort` cancels immediately without touching the shared volume.
    #[must_use]
    pub const fn signal_file_name(self) -> Option<&'static str> {
        match self {
            Self::Abort => None,
            other => Some(other.as_str()),
        }
    }
}

impl fmt::Display for TerminationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
