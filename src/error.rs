//! Shell Errors
//!
//! Error taxonomy shared by the modal stack and the deferred work scheduler.
//! None of these are fatal: every path that returns one leaves the stack and
//! the registry in a structurally valid state.

use thiserror::Error;

use crate::deferred::WorkId;
use crate::host::{ActorId, GrabHandle};

/// Errors surfaced by the shell controller
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShellError {
    /// The host refused an exclusive grab. Nothing was mutated.
    #[error("grab unavailable for actor {actor}")]
    GrabUnavailable { actor: ActorId },

    /// A pop without a matching push. Focus and action mode were already
    /// reset when this is returned.
    #[error("incorrect pop: no modal record for grab {grab}")]
    ProtocolViolation { grab: GrabHandle },

    /// The work id was never registered or its owner is gone.
    #[error("invalid work id {0}")]
    UnknownWorkId(WorkId),

    /// An action mode string that does not parse as a set of mode flags.
    #[error("invalid action mode {0:?}")]
    InvalidActionMode(String),
}

/// Result alias for shell operations
pub type Result<T> = std::result::Result<T, ShellError>;
