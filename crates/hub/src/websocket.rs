//! WebSocket session actor
//!
//! One actor per client. Frames queued by the multiplexer arrive on the
//! session's outbound stream and are written in queue order; replies to the
//! client's own requests are written directly.

use crate::hub::Hub;
use crate::protocol::OutboundFrame;
use crate::registry::ConnectionId;
use actix::{Actor, ActorContext, AsyncContext, StreamHandler};
use actix_web_actors::ws;
use futures_util::stream;
use std::sync::Arc;
use std::time::Instant;

pub struct HubSession {
    hub: Arc<Hub>,
    /// Set once registered in `started`
    id: Option<ConnectionId>,
    /// Last time the client showed signs of life
    hb: Instant,
}

impl HubSession {
    pub fn new(hub: Arc<Hub>) -> Self {
        Self {
            hub,
            id: None,
            hb: Instant::now(),
        }
    }

    fn start_heartbeat(&self, ctx: &mut ws::WebsocketContext<Self>) {
        let interval = self.hub.config().heartbeat_interval;
        let timeout = self.hub.config().client_timeout;

        ctx.run_interval(interval, move |act, ctx| {
            if Instant::now().duration_since(act.hb) > timeout {
                tracing::warn!(
                    connection_id = ?act.id,
                    "WebSocket client heartbeat timeout, disconnecting"
                );
                ctx.stop();
                return;
            }

            ctx.ping(b"");
        });
    }

    fn handle_text(&mut self, text: &str, ctx: &mut ws::WebsocketContext<Self>) {
        let Some(id) = self.id else {
            return;
        };

        let reply = self.hub.handle_client_text(id, text);
        match reply.to_json() {
            Ok(json) => ctx.text(json),
            Err(e) => tracing::error!(connection_id = %id, error = %e, "Failed to encode reply"),
        }
    }
}

impl Actor for HubSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        let (id, outbound) = self.hub.connect();
        self.id = Some(id);

        ctx.add_stream(stream::unfold(outbound, |mut outbound| async move {
            outbound.recv().await.map(|frame| (frame, outbound))
        }));
        self.start_heartbeat(ctx);

        tracing::info!(connection_id = %id, "WebSocket connection established");
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        if let Some(id) = self.id.take() {
            self.hub.disconnect(id);
            tracing::info!(connection_id = %id, "WebSocket connection closed");
        }
    }
}

/// Frames queued for this connection
impl StreamHandler<OutboundFrame> for HubSession {
    fn handle(&mut self, frame: OutboundFrame, ctx: &mut Self::Context) {
        ctx.text(&*frame);
    }

    fn finished(&mut self, ctx: &mut Self::Context) {
        // Queue closed: the connection was removed from the registry.
        ctx.stop();
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for HubSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.hb = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Text(text)) => {
                self.hb = Instant::now();
                self.handle_text(&text, ctx);
            }
            Ok(ws::Message::Binary(_)) => {
                tracing::warn!(connection_id = ?self.id, "Binary WebSocket messages not supported");
            }
            Ok(ws::Message::Close(reason)) => {
                tracing::info!(connection_id = ?self.id, "WebSocket close received: {:?}", reason);
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                tracing::warn!("WebSocket continuation frames not supported");
            }
            Ok(ws::Message::Nop) => {}
            Err(e) => {
                tracing::error!(connection_id = ?self.id, "WebSocket protocol error: {}", e);
                ctx.stop();
            }
        }
    }
}
