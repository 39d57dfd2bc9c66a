use thiserror::Error;

/// Failures raised by the crate itself.
///
/// Failures of caller-supplied transactions and producers are never wrapped in this
/// type. They are returned to the caller unchanged.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// No tokio runtime was available to host an actor's worker task.
    #[error("no tokio runtime is available to host the isolated value")]
    NoRuntime,
    /// An actor mailbox with a capacity of zero was requested.
    #[error("the mailbox capacity must be at least 1")]
    ZeroCapacity,
    /// The worker task owning the value is gone, usually because its runtime shut down.
    #[error("the worker task owning the isolated value has shut down")]
    Closed,
}
