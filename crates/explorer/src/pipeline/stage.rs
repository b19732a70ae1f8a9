//! Pipeline stages for one source unit.
//!
//! A run walks `FetchingRemoteList → Matching → Preprocessing → Compiling`
//! and ends at `Done` or `Error`. New triggers re-enter at the earliest stage
//! whose inputs changed; the delivery task logs every transition so a run's
//! history can be reconstructed from the trace.

use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Idle,
    FetchingRemoteList,
    Matching,
    Preprocessing,
    Compiling,
    Done,
    Error,
}

impl Stage {
    /// Whether a run has come to rest here. Terminal only for the run;
    /// any new trigger restarts from an earlier stage.
    pub fn is_settled(self) -> bool {
        matches!(self, Self::Idle | Self::Done | Self::Error)
    }

    /// Whether work is in flight for this stage.
    pub fn is_active(self) -> bool {
        !self.is_settled()
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::FetchingRemoteList => write!(f, "FetchingRemoteList"),
            Self::Matching => write!(f, "Matching"),
            Self::Preprocessing => write!(f, "Preprocessing"),
            Self::Compiling => write!(f, "Compiling"),
            Self::Done => write!(f, "Done"),
            Self::Error => write!(f, "Error"),
        }
    }
}
