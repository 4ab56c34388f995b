//! The matching/relay/session core (spec.md §2). Everything that must be
//! single-writer lives behind the `MatchEngine` actor's mailbox; `matching`
//! is kept free of actix so the pairing policy can be property-tested
//! directly against plain `UserRegistry`/`WaitingQueue` values.

pub mod actor;
pub mod handlers;
pub mod matching;
pub mod messages;
pub mod relay;
pub mod session_relay;
pub mod supervisor;

pub use actor::MatchEngine;
