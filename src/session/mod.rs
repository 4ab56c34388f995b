//! Transport Adapter (spec.md §4.7): the thin binding between one
//! `actix-web-actors` WebSocket connection and the core's typed commands.
//! Owns no matching/relay state itself beyond the mapping from this
//! connection to the `UserId` it was assigned at connect time, mirroring
//! the teacher's `Session`/`ws_session` split.

use std::net::IpAddr;
use std::time::{Duration, Instant};

use actix::{Actor, ActorContext, AsyncContext, Handler, Running, StreamHandler};
use actix_web::web;
use actix_web_actors::ws;
use tracing::{info, warn};

use crate::core::user::UserId;
use crate::engine::messages::{Connect, Disconnect, Dispatch};
use crate::engine::MatchEngine;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::transport::registry::{ConnectionRegistry, Deregister, Register};
use crate::AppState;

pub struct Session {
    id: UserId,
    ip: IpAddr,
    hb: Instant,
    heartbeat_interval: Duration,
    client_timeout: Duration,
    app_state: web::Data<AppState>,
}

impl Session {
    pub fn new(
        heartbeat_interval: Duration,
        client_timeout: Duration,
        app_state: web::Data<AppState>,
        ip: IpAddr,
    ) -> Self {
        Self {
            id: UserId::new_v4(),
            ip,
            hb: Instant::now(),
            heartbeat_interval,
            client_timeout,
            app_state,
        }
    }

    fn engine(&self) -> &actix::Addr<MatchEngine> {
        &self.app_state.engine
    }

    fn connections(&self) -> &actix::Addr<ConnectionRegistry> {
        &self.app_state.connections
    }

    fn start_heartbeat(&self, ctx: &mut ws::WebsocketContext<Self>) {
        let timeout = self.client_timeout;
        ctx.run_interval(self.heartbeat_interval, move |act, ctx| {
            if Instant::now().duration_since(act.hb) > timeout {
                warn!(user = %act.id, "heartbeat timeout, dropping connection");
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }
}

impl Actor for Session {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.start_heartbeat(ctx);
        self.connections().do_send(Register {
            id: self.id,
            addr: ctx.address().recipient(),
        });
        self.engine().do_send(Connect { id: self.id, ip: self.ip });
        info!(user = %self.id, ip = %self.ip, "session started");
    }

    fn stopping(&mut self, _ctx: &mut Self::Context) -> Running {
        self.connections().do_send(Deregister { id: self.id });
        self.engine().do_send(Disconnect { id: self.id });
        if let Ok(mut cap) = self.app_state.conn_cap.lock() {
            cap.release(self.ip);
        }
        Running::Stop
    }
}

impl Handler<ServerMessage> for Session {
    type Result = ();

    fn handle(&mut self, msg: ServerMessage, ctx: &mut Self::Context) {
        match serde_json::to_string(&msg) {
            Ok(json) => ctx.text(json),
            Err(e) => warn!(user = %self.id, error = %e, "failed to serialize outbound message"),
        }
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for Session {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        let msg = match msg {
            Ok(m) => m,
            Err(e) => {
                warn!(user = %self.id, error = %e, "websocket protocol error");
                ctx.stop();
                return;
            }
        };

        match msg {
            ws::Message::Ping(bytes) => {
                self.hb = Instant::now();
                ctx.pong(&bytes);
            }
            ws::Message::Pong(_) => {
                self.hb = Instant::now();
            }
            ws::Message::Text(text) => {
                self.hb = Instant::now();
                match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(command) => self.engine().do_send(Dispatch { from: self.id, command }),
                    Err(e) => {
                        // Protocol violation: malformed payload, silently
                        // ignored per spec.md §7 — the sender is not
                        // disconnected.
                        warn!(user = %self.id, error = %e, "dropping malformed client message");
                    }
                }
            }
            ws::Message::Binary(_) => {
                warn!(user = %self.id, "dropping unexpected binary frame");
            }
            ws::Message::Close(reason) => {
                ctx.close(reason);
                ctx.stop();
            }
            ws::Message::Continuation(_) | ws::Message::Nop => {}
        }
    }
}
