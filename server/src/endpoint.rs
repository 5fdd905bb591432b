//! WebSocket connection endpoint.
//!
//! Accepts persistent JSON text-frame channels for authenticated players and
//! routes frames between clients and the match manager. Responsibilities:
//!
//! - **Authentication during upgrade**: the opaque session token (cookie,
//!   bearer header, or `token` query parameter) is resolved against the
//!   [`SessionVerifier`] inside the handshake callback; unresolvable
//!   identities are rejected with 401 before the upgrade completes.
//! - **Single session per identity**: registering a connection supersedes any
//!   existing session for the same player, which is closed with code 4001.
//!   The superseded socket's teardown does not count as a player disconnect.
//! - **Task layout**: one reader task and one writer task per connection. The
//!   writer drains the bounded outbound queue so match workers never block on
//!   a slow socket.
//! - **Heartbeat**: clients send `ping` frames and get `pong` back; a sweeper
//!   closes sessions with no inbound traffic beyond the configured budget.
//!
//! A malformed inbound frame produces an `error` frame and is otherwise
//! ignored; the connection is only closed for auth failure (during upgrade),
//! session replacement, or idle timeout.

use crate::auth::{token_from_cookie_header, PlayerIdentity, SessionVerifier};
use crate::config::ServerConfig;
use crate::error::MatchError;
use crate::manager::MatchManager;
use crate::outbound::{OutboundFrame, OutboundQueue};
use crate::session::{ConnectionHandle, SessionRegistry};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::protocol::{ClientEvent, ServerEvent};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::interval;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{
    ErrorResponse, Request, Response as HandshakeResponse,
};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

/// The game channel listener and its collaborators.
pub struct Endpoint {
    manager: Arc<MatchManager>,
    sessions: Arc<SessionRegistry>,
    verifier: Arc<dyn SessionVerifier>,
    config: ServerConfig,
}

impl Endpoint {
    pub fn new(
        manager: Arc<MatchManager>,
        sessions: Arc<SessionRegistry>,
        verifier: Arc<dyn SessionVerifier>,
        config: ServerConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            manager,
            sessions,
            verifier,
            config,
        })
    }

    /// Serves the game channel until the listener fails.
    pub async fn run(self: Arc<Self>, listener: TcpListener) {
        self.spawn_idle_sweeper();
        info!("Game channel listening");

        while let Ok((stream, addr)) = listener.accept().await {
            let endpoint = Arc::clone(&self);
            tokio::spawn(async move {
                endpoint.handle_connection(stream, addr).await;
            });
        }
        error!("Game channel listener terminated");
    }

    /// Periodically closes sessions that stopped sending traffic.
    fn spawn_idle_sweeper(self: &Arc<Self>) {
        let endpoint = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(5));
            loop {
                ticker.tick().await;
                let idle = endpoint
                    .sessions
                    .idle_sessions(endpoint.config.heartbeat_timeout);
                for session in idle {
                    warn!("Closing idle game channel for {}", session.identity.id);
                    session.close(1000, "idle timeout");
                    if endpoint
                        .sessions
                        .unregister(&session.identity.id, session.seq)
                    {
                        endpoint.manager.handle_disconnect(&session.identity.id).await;
                    }
                }
            }
        });
    }

    async fn handle_connection(self: Arc<Self>, stream: TcpStream, addr: SocketAddr) {
        // Resolve the identity inside the handshake so bad tokens are
        // rejected with a plain 401 instead of an upgraded-then-closed socket.
        let verifier = Arc::clone(&self.verifier);
        let mut identity: Option<PlayerIdentity> = None;
        let callback = |req: &Request, resp: HandshakeResponse| {
            match token_from_request(req).and_then(|token| verifier.resolve(&token)) {
                Some(resolved) => {
                    identity = Some(resolved);
                    Ok(resp)
                }
                None => {
                    let mut reject = ErrorResponse::new(Some("unauthorized".to_string()));
                    *reject.status_mut() = StatusCode::UNAUTHORIZED;
                    Err(reject)
                }
            }
        };

        let ws = match accept_hdr_async(stream, callback).await {
            Ok(ws) => ws,
            Err(e) => {
                debug!("Handshake with {} failed: {}", addr, e);
                return;
            }
        };
        let Some(identity) = identity else {
            return;
        };
        info!("Game channel open for {} ({})", identity.id, addr);

        let queue = Arc::new(OutboundQueue::new(self.config.outbound_capacity));
        let (handle, replaced) = self.sessions.register(identity.clone(), queue);
        if replaced.is_some() {
            info!("Session for {} superseded by a newer login", identity.id);
        }

        let (mut ws_sink, mut ws_stream) = ws.split();

        // Writer task: drains the outbound queue onto the socket.
        let writer_queue = Arc::clone(handle.queue());
        let writer = tokio::spawn(async move {
            while let Some(frame) = writer_queue.recv().await {
                match frame {
                    OutboundFrame::Event(event) => match serde_json::to_string(&event) {
                        Ok(text) => {
                            if ws_sink.send(Message::Text(text)).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => error!("Failed to encode outbound frame: {}", e),
                    },
                    OutboundFrame::Close { code, reason } => {
                        let _ = ws_sink
                            .send(Message::Close(Some(CloseFrame {
                                code: CloseCode::from(code),
                                reason: reason.into(),
                            })))
                            .await;
                        break;
                    }
                }
            }
        });

        // Re-bind to any active match so a reconnecting player resumes
        // without an extra round trip.
        if let Some(snapshot) = self.manager.attach_session(&handle).await {
            handle.send(ServerEvent::GameState(snapshot));
        }

        // Reader loop.
        while let Some(result) = ws_stream.next().await {
            let msg = match result {
                Ok(msg) => msg,
                Err(e) => {
                    debug!("Game channel error for {}: {}", identity.id, e);
                    break;
                }
            };
            handle.touch();

            match msg {
                Message::Text(text) => self.dispatch(&handle, &text).await,
                Message::Binary(_) => handle.send(ServerEvent::Error {
                    code: "bad_frame".into(),
                    message: "expected JSON text frames".into(),
                }),
                Message::Close(_) => {
                    debug!("Game channel closed by {}", identity.id);
                    break;
                }
                // Transport-level ping/pong is answered by the protocol layer.
                _ => {}
            }

            if handle.queue().is_closed() {
                break;
            }
        }

        // Teardown. A superseded session must not count as a disconnect of
        // the player, who is already being served by the newer connection.
        handle.close(1000, "closed");
        if self.sessions.unregister(&identity.id, handle.seq) {
            info!("Game channel closed for {}", identity.id);
            self.manager.handle_disconnect(&identity.id).await;
        } else {
            debug!("Socket of a superseded session for {} torn down", identity.id);
        }
        let _ = writer.await;
    }

    async fn dispatch(&self, handle: &ConnectionHandle, text: &str) {
        let event: ClientEvent = match serde_json::from_str(text) {
            Ok(event) => event,
            Err(e) => {
                debug!("Bad frame from {}: {}", handle.identity.id, e);
                handle.send(ServerEvent::Error {
                    code: "bad_frame".into(),
                    message: format!("unrecognized frame: {}", e),
                });
                return;
            }
        };

        let player_id = handle.identity.id.clone();
        match event {
            ClientEvent::Ping {} => handle.send(ServerEvent::Pong {}),
            ClientEvent::PlayerInput { direction } => {
                self.manager.input(&player_id, direction).await;
            }
            ClientEvent::PlayerReady {} => {
                if let Some(snapshot) = self.manager.snapshot_for(&player_id).await {
                    handle.send(ServerEvent::GameState(snapshot));
                }
            }
            ClientEvent::MatchJoin { match_id } => {
                if self.manager.match_of(&player_id).await == Some(match_id) {
                    // Already bound to this match: treat as a (re)attach.
                    if let Some(snapshot) = self.manager.attach_session(handle).await {
                        handle.send(ServerEvent::GameState(snapshot));
                    }
                } else if let Err(e) = self.manager.join(match_id, &handle.identity).await {
                    handle.send(ServerEvent::Error {
                        code: e.code().into(),
                        message: e.to_string(),
                    });
                }
            }
            ClientEvent::MatchLeave {} => self.manager.leave(&player_id).await,
            ClientEvent::MatchReconnect {} => match self.manager.attach_session(handle).await {
                Some(snapshot) => handle.send(ServerEvent::GameState(snapshot)),
                None => handle.send(ServerEvent::Error {
                    code: MatchError::NotInMatch.code().into(),
                    message: MatchError::NotInMatch.to_string(),
                }),
            },
        }
    }
}

/// Pulls the opaque session token out of the upgrade request: `session`
/// cookie, bearer header, or `token` query parameter, in that order.
fn token_from_request(req: &Request) -> Option<String> {
    if let Some(cookie) = req.headers().get("cookie").and_then(|v| v.to_str().ok()) {
        if let Some(token) = token_from_cookie_header(cookie) {
            return Some(token);
        }
    }
    if let Some(auth) = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
    {
        if let Some(token) = auth.strip_prefix("Bearer ") {
            return Some(token.to_string());
        }
    }
    req.uri().query().and_then(|query| {
        query
            .split('&')
            .find_map(|pair| pair.strip_prefix("token=").map(str::to_string))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(uri: &str, headers: &[(&str, &str)]) -> Request {
        let mut builder = Request::builder().uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap()
    }

    #[test]
    fn test_token_from_session_cookie() {
        let req = request(
            "ws://localhost/game",
            &[("cookie", "theme=dark; session=tok-42; lang=en")],
        );
        assert_eq!(token_from_request(&req), Some("tok-42".to_string()));
    }

    #[test]
    fn test_token_from_bearer_header() {
        let req = request("ws://localhost/game", &[("authorization", "Bearer tok-7")]);
        assert_eq!(token_from_request(&req), Some("tok-7".to_string()));
    }

    #[test]
    fn test_token_from_query_parameter() {
        let req = request("ws://localhost/game?foo=1&token=tok-q", &[]);
        assert_eq!(token_from_request(&req), Some("tok-q".to_string()));
    }

    #[test]
    fn test_cookie_takes_precedence_over_query() {
        let req = request(
            "ws://localhost/game?token=from-query",
            &[("cookie", "session=from-cookie")],
        );
        assert_eq!(token_from_request(&req), Some("from-cookie".to_string()));
    }

    #[test]
    fn test_missing_token() {
        let req = request("ws://localhost/game", &[]);
        assert_eq!(token_from_request(&req), None);
    }
}
