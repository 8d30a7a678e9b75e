//! HTTP and WebSocket transport for the relay
//!
//! One listening port serves both surfaces: upgrade requests become relay
//! sessions, every other request is answered from the static asset
//! directory. Each session gets a reader loop (forwarding frames to the
//! relay event loop) and a writer task (draining its outbound queue into
//! the socket).

use crate::auth::Authenticator;
use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::relay::{Relay, RelayEvent, SupervisorPolicy};
use crate::session_registry::{Frame, SessionId};
use crate::tempo_clock::TempoClock;
use crate::utils::now_micros;
use axum::body::Body;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, Request, State};
use axum::response::Response;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use std::future::IntoFuture;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower::ServiceExt;
use tower_http::services::ServeDir;

#[derive(Clone)]
struct TransportState {
    events: mpsc::UnboundedSender<RelayEvent>,
    assets: ServeDir,
    queue_capacity: usize,
}

/// Relay server bound to its listening socket
pub struct RelayServer {
    listener: TcpListener,
    config: RelayConfig,
}

impl RelayServer {
    pub async fn bind(config: RelayConfig) -> Result<Self, RelayError> {
        let listener = TcpListener::bind(config.listen_addr).await?;

        if !config.static_dir.is_dir() {
            warn!(
                "static asset directory {} does not exist; HTTP requests will get 404",
                config.static_dir.display()
            );
        }

        Ok(Self { listener, config })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, RelayError> {
        Ok(self.listener.local_addr()?)
    }

    /// Starts the relay event loop and serves connections.
    ///
    /// Only returns if the listener fails or the event loop dies, which
    /// happens when handling an event panics in mortal mode.
    pub async fn run(self) -> Result<(), RelayError> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let relay = Relay::new(
            Authenticator::new(self.config.secret.clone()),
            TempoClock::starting_at(now_micros()),
            SupervisorPolicy::from_flag(self.config.immortal),
        );
        let relay_handle = tokio::spawn(relay.run(events_rx));

        let app = app(events_tx, &self.config);
        info!("Listening on {}", self.listener.local_addr()?.port());

        let serve = axum::serve(
            self.listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        );

        tokio::select! {
            result = serve.into_future() => {
                result?;
                Ok(())
            }
            result = relay_handle => {
                if let Err(e) = result {
                    error!("relay event loop failed: {}", e);
                }
                Err(RelayError::EventLoopClosed)
            }
        }
    }
}

/// Builds the HTTP application forwarding session events to `events`
fn app(events: mpsc::UnboundedSender<RelayEvent>, config: &RelayConfig) -> Router {
    let state = TransportState {
        events,
        assets: ServeDir::new(&config.static_dir).append_index_html_on_directories(true),
        queue_capacity: config.queue_capacity,
    };

    Router::new().fallback(entry).with_state(state)
}

async fn entry(
    State(state): State<TransportState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    ws: Option<WebSocketUpgrade>,
    request: Request,
) -> Response {
    match ws {
        Some(ws) => ws.on_upgrade(move |socket| handle_socket(socket, addr, state)),
        None => serve_asset(state.assets, request).await,
    }
}

async fn serve_asset(assets: ServeDir, request: Request) -> Response {
    match assets.oneshot(request).await {
        Ok(response) => response.map(Body::new),
        Err(never) => match never {},
    }
}

/// Runs one WebSocket session from upgrade to close
async fn handle_socket(socket: WebSocket, addr: SocketAddr, state: TransportState) {
    let id = SessionId::generate();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Frame>(state.queue_capacity);

    let connected = RelayEvent::Connected {
        id,
        addr,
        outbound: outbound_tx,
    };
    if state.events.send(connected).is_err() {
        error!("relay event loop is gone, dropping connection from {}", addr);
        return;
    }

    let (mut sink, mut stream) = socket.split();

    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            if let Err(e) = sink.send(Message::Text(frame.to_string())).await {
                debug!("write to {} ({}) failed: {}", addr, id, e);
                break;
            }
        }
    });

    while let Some(result) = stream.next().await {
        let payload = match result {
            Ok(Message::Text(text)) => text,
            Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(_) => {
                    warn!("dropping non-UTF-8 binary frame from {}", addr);
                    continue;
                }
            },
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
            Ok(Message::Close(_)) => break,
            Err(e) => {
                warn!("WebSocket error from {} ({}): {}", addr, id, e);
                break;
            }
        };

        if state
            .events
            .send(RelayEvent::Inbound { id, addr, payload })
            .is_err()
        {
            error!("relay event loop is gone, closing connection from {}", addr);
            break;
        }
    }

    if state.events.send(RelayEvent::Disconnected { id }).is_err() {
        debug!("relay event loop already stopped when {} closed", id);
    }
    writer.abort();
}
