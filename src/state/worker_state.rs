//! Worker slot states for the dispatcher pool
//!
//! A slot cycles `Idle -> Busy -> Idle` for every item it receives. Once the
//! frontier has nothing left to hand out it goes `Idle -> Draining -> Terminated`.

use std::fmt;

/// Represents the current state of one worker slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerState {
    /// Waiting for the frontier to hand over the next item
    Idle,

    /// Writing one item to the sinks
    Busy,

    /// The frontier is exhausted; the slot holds no work and is shutting down
    Draining,

    /// The slot's task has exited
    Terminated,
}

impl WorkerState {
    /// Returns true if the slot may hold an item in this state
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Busy)
    }

    /// Returns true if the slot will never take work again
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminated)
    }

    /// Checks whether moving from `self` to `next` is a legal transition
    pub fn can_transition_to(&self, next: WorkerState) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Busy)
                | (Self::Busy, Self::Idle)
                | (Self::Idle, Self::Draining)
                | (Self::Draining, Self::Terminated)
        )
    }

    /// Moves to `next`, rejecting illegal transitions
    pub fn transition(self, next: WorkerState) -> Result<WorkerState, crate::CrawlError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(crate::CrawlError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Busy => "busy",
            Self::Draining => "draining",
            Self::Terminated => "terminated",
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
