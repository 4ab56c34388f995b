//! Maps connected users to their transport actor, decoupled from
//! `MatchEngine` so pushing a `ServerMessage` never blocks matching
//! decisions on a slow client socket. Grounded on the teacher's
//! `SubScriptionManager` (`subscript/mod.rs`).

use std::collections::HashMap;

use actix::prelude::*;
use tracing::warn;

use crate::core::user::UserId;
use crate::protocol::ServerMessage;

#[derive(Message)]
#[rtype(result = "()")]
pub struct Register {
    pub id: UserId,
    pub addr: Recipient<ServerMessage>,
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct Deregister {
    pub id: UserId,
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct Forward {
    pub to: UserId,
    pub msg: ServerMessage,
}

#[derive(Default)]
pub struct ConnectionRegistry {
    connections: HashMap<UserId, Recipient<ServerMessage>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Actor for ConnectionRegistry {
    type Context = Context<Self>;
}

impl Handler<Register> for ConnectionRegistry {
    type Result = ();
    fn handle(&mut self, msg: Register, _ctx: &mut Context<Self>) {
        self.connections.insert(msg.id, msg.addr);
    }
}

impl Handler<Deregister> for ConnectionRegistry {
    type Result = ();
    fn handle(&mut self, msg: Deregister, _ctx: &mut Context<Self>) {
        self.connections.remove(&msg.id);
    }
}

impl Handler<Forward> for ConnectionRegistry {
    type Result = ();
    fn handle(&mut self, msg: Forward, _ctx: &mut Context<Self>) {
        match self.connections.get(&msg.to) {
            Some(addr) => {
                if addr.do_send(msg.msg).is_err() {
                    warn!(user = %msg.to, "failed to forward message, mailbox closed");
                }
            }
            None => warn!(user = %msg.to, "forward target not registered"),
        }
    }
}
