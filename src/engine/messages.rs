//! Actix message types carried across the transport/engine boundary.

use actix::prelude::*;

use crate::core::user::UserId;
use crate::protocol::ClientMessage;

/// A client connection has come online. The `Recipient` it pushes
/// `ServerMessage`s through is registered separately with the
/// `ConnectionRegistry`; the engine only needs to know the user exists.
#[derive(Message)]
#[rtype(result = "()")]
pub struct Connect {
    pub id: UserId,
    pub ip: std::net::IpAddr,
}

/// A client connection has gone away; tears down its state and, if
/// matched, drags its partner back to `waiting` (spec.md §4.1, §5
/// "Cancellation").
#[derive(Message)]
#[rtype(result = "()")]
pub struct Disconnect {
    pub id: UserId,
}

/// One parsed client command, tagged with the user it came from.
#[derive(Message)]
#[rtype(result = "()")]
pub struct Dispatch {
    pub from: UserId,
    pub command: ClientMessage,
}
