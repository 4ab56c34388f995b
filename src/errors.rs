//! Internal error taxonomy (spec.md §7). `EngineError` is never sent to a
//! client verbatim; the transport layer folds it into a single
//! `ServerMessage::ConnectionError` and logs the structured variant.

use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum EngineError {
    /// A client sent a command that is not valid in its current state,
    /// e.g. `signal` while not matched, or a `game-action` for a room it
    /// is not part of.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// An internal invariant the engine itself is responsible for
    /// upholding was found broken, e.g. a room referencing a user the
    /// registry no longer knows about.
    #[error("state inconsistency: {0}")]
    StateInconsistency(String),

    /// A configured limit was hit: per-IP connection cap, rate limit
    /// window, or room/game table size.
    #[error("capacity exceeded: {0}")]
    CapacityExceeded(String),

    /// The recipient's mailbox was closed or unreachable; the caller
    /// should treat the send as having failed without it representing a
    /// semantic contract violation.
    #[error("transient transport failure: {0}")]
    TransientTransport(String),

    /// A code path that should be unreachable given prior validation was
    /// reached anyway. Always a bug; never user-triggerable.
    #[error("internal assertion failed: {0}")]
    Assertion(String),
}

impl EngineError {
    /// Message shown to the client; deliberately generic for the
    /// variants that could leak internal state.
    pub fn client_message(&self) -> String {
        match self {
            EngineError::ProtocolViolation(msg) => msg.clone(),
            EngineError::CapacityExceeded(_) => "server is at capacity, try again shortly".into(),
            EngineError::StateInconsistency(_)
            | EngineError::TransientTransport(_)
            | EngineError::Assertion(_) => "internal error".into(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            EngineError::ProtocolViolation(_) => "protocol_violation",
            EngineError::StateInconsistency(_) => "state_inconsistency",
            EngineError::CapacityExceeded(_) => "capacity_exceeded",
            EngineError::TransientTransport(_) => "transient_transport",
            EngineError::Assertion(_) => "assertion",
        }
    }
}
