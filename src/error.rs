use thiserror::Error;

use crate::names::NameKind;

/// Errors raised while building a queue.
///
/// Runtime operations never fail; they degrade to no-ops instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("{kind} name must not be blank")]
    BlankName { kind: NameKind },

    #[error("{kind} name '{name}' is registered more than once")]
    DuplicateName { kind: NameKind, name: String },

    #[error("no tokio runtime available to drive scheduled tasks")]
    NoRuntime,
}

/// Error seen by the observer of a pending call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SettlementError {
    /// The queue was dropped before the call was settled.
    #[error("pending call dropped before it was settled")]
    Dropped,
}
