use thiserror::Error;

/// Errors surfaced by the public operations.
///
/// None of these are retried internally. `RemoteFinished` and
/// `DeadlockDetected` mean the program should wind down and call
/// [`World::finalize`](crate::World::finalize); the argument errors are
/// plain caller mistakes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A rank argument falls outside `0..world_size`.
    #[error("no such rank: {0}")]
    NoSuchRank(i32),

    /// The named source or destination is the calling process itself.
    #[error("rank {0} attempted an operation on itself")]
    SelfOp(i32),

    /// A peer involved in the operation has already finalized or exited.
    /// For collectives this covers any peer touched by the traversal.
    #[error("remote process has finished")]
    RemoteFinished,

    /// Both sides of a point-to-point pair were proven to be blocked on
    /// each other. Only reported when deadlock detection is enabled.
    #[error("deadlock detected")]
    DeadlockDetected,

    /// The launcher contract was not honoured: world size or rank missing
    /// from the environment, or out of range.
    #[error("process group wiring: {0}")]
    Wiring(String),
}

pub type Result<T> = std::result::Result<T, Error>;
