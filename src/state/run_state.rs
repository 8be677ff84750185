/// Run state definitions for the batch scheduler
///
/// This module defines the states one scheduler run moves through and the
/// transitions allowed between them.
use std::fmt;

/// Represents the current state of a scheduler run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunState {
    // ===== Active States =====
    /// Created but not started
    Idle,

    /// Loading the checkpoint and computing the remaining range
    Resuming,

    /// Pages of the current batch are in flight
    Dispatching,

    /// The batch has resolved and its committable prefix is being persisted
    Committing,

    /// Waiting out the inter-batch delay
    Pacing,

    // ===== Terminal States =====
    /// Every page of the range has been committed
    Done,

    /// A page or the checkpoint store failed; no further batches run
    Failed,
}

impl RunState {
    /// Returns true if no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Returns true if `next` is a legal successor of this state
    ///
    /// Any active state may fail.
    pub fn can_transition_to(&self, next: RunState) -> bool {
        if next == Self::Failed {
            return !self.is_terminal();
        }

        matches!(
            (self, next),
            (Self::Idle, Self::Resuming)
                | (Self::Resuming, Self::Dispatching)
                | (Self::Resuming, Self::Done)
                | (Self::Dispatching, Self::Committing)
                | (Self::Committing, Self::Pacing)
                | (Self::Pacing, Self::Dispatching)
                | (Self::Pacing, Self::Done)
        )
    }

    /// Returns a short lowercase name for logging
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Resuming => "resuming",
            Self::Dispatching => "dispatching",
            Self::Committing => "committing",
            Self::Pacing => "pacing",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
