use crate::config::Config;
use crate::state::AppState;
use crate::websocket::session::SessionHandler;
use crate::websocket::ConnectionHandle;
use actix::fut::WrapFuture;
use actix::{Actor, ActorContext, AsyncContext, StreamHandler};
use actix_web::{get, web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc::UnboundedReceiver, Mutex};
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Socket actor. Frames are handed to [`SessionHandler`] one at a time, and
/// pushes from the connection registry are written back as text frames.
struct WsSession {
    handle: ConnectionHandle,
    handler: Arc<Mutex<SessionHandler>>,
    outbound: Option<UnboundedReceiver<String>>,
    hb: Instant,
    heartbeat_interval: Duration,
    client_timeout: Duration,
}

impl WsSession {
    fn new(
        handler: SessionHandler,
        outbound: UnboundedReceiver<String>,
        config: &Config,
    ) -> Self {
        Self {
            handle: handler.handle(),
            handler: Arc::new(Mutex::new(handler)),
            outbound: Some(outbound),
            hb: Instant::now(),
            heartbeat_interval: config.heartbeat_interval,
            client_timeout: config.client_timeout,
        }
    }

    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        let client_timeout = self.client_timeout;
        ctx.run_interval(self.heartbeat_interval, move |act, ctx| {
            if Instant::now().duration_since(act.hb) > client_timeout {
                tracing::warn!(
                    connection = %act.handle,
                    "WebSocket heartbeat failed, disconnecting"
                );
                ctx.stop();
                return;
            }
            ctx.ping(b"");

            let handler = act.handler.clone();
            ctx.spawn(
                async move {
                    handler.lock().await.refresh_presence().await;
                }
                .into_actor(act),
            );
        });
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.hb(ctx);
        if let Some(outbound) = self.outbound.take() {
            ctx.add_stream(UnboundedReceiverStream::new(outbound));
        }
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        let handler = self.handler.clone();
        actix::spawn(async move {
            handler.lock().await.disconnect().await;
        });
    }
}

/// Pushes queued for this connection. The stream ends once the registry drops
/// the sender, which stops the actor.
impl StreamHandler<String> for WsSession {
    fn handle(&mut self, text: String, ctx: &mut Self::Context) {
        ctx.text(text);
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, item: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match item {
            Ok(ws::Message::Ping(msg)) => {
                self.hb = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Text(text)) => {
                self.hb = Instant::now();
                let handler = self.handler.clone();
                let text = text.to_string();
                ctx.wait(
                    async move {
                        handler.lock().await.handle_text(&text).await;
                    }
                    .into_actor(self),
                );
            }
            Ok(ws::Message::Binary(_)) => {
                tracing::debug!(connection = %self.handle, "binary frames are not supported");
            }
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                ctx.stop();
            }
            Ok(ws::Message::Nop) => {}
            Err(e) => {
                tracing::warn!(connection = %self.handle, error = %e, "WebSocket protocol error");
                ctx.stop();
            }
        }
    }
}

#[get("/ws")]
pub async fn ws_handler(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let (handle, outbound) = state.connections.add_connection().await;
    let session = WsSession::new(
        SessionHandler::new(handle, &state),
        outbound,
        &state.config,
    );

    let response = ws::start(session, &req, stream);
    if response.is_err() {
        state.connections.remove_connection(handle).await;
    }
    response
}
