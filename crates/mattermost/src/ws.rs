use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{self, Message},
    MaybeTlsStream, WebSocketStream,
};

use crate::socket::{EventSource, TransportError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const AUTH_CHALLENGE_SEQ: u64 = 1;
const AUTH_REPLY_TIMEOUT: Duration = Duration::from_secs(10);
/// Frames tolerated ahead of the challenge verdict (the server may push a
/// hello frame first).
const HANDSHAKE_FRAME_LIMIT: usize = 8;

struct Connection {
    stream: WsStream,
    ping: tokio::time::Interval,
}

/// Live WebSocket connection to one Mattermost server.
///
/// Authenticates with the in-band challenge rather than a header so a rejected
/// token surfaces as a distinct verdict instead of a generic handshake error.
/// Protocol-level pings keep the connection alive between events.
pub struct WebSocketEventSource {
    server_url: String,
    token: SecretString,
    ping_interval: Duration,
    connection: Mutex<Option<Connection>>,
}

impl WebSocketEventSource {
    pub fn new(server_url: String, token: SecretString, ping_interval: Duration) -> Self {
        Self { server_url, token, ping_interval, connection: Mutex::new(None) }
    }
}

#[async_trait]
impl EventSource for WebSocketEventSource {
    async fn connect(&self) -> Result<(), TransportError> {
        let mut guard = self.connection.lock().await;

        let ws_url = websocket_url(&self.server_url)?;
        let (mut stream, _response) = connect_async(&ws_url).await.map_err(|error| {
            TransportError::Connect(format!("websocket handshake failed: {error}"))
        })?;

        let challenge = serde_json::json!({
            "seq": AUTH_CHALLENGE_SEQ,
            "action": "authentication_challenge",
            "data": { "token": self.token.expose_secret() },
        })
        .to_string();
        stream.send(Message::Text(challenge)).await.map_err(|error| {
            TransportError::Connect(format!("authentication challenge send failed: {error}"))
        })?;

        wait_for_challenge_verdict(&mut stream).await?;

        let first_ping = tokio::time::Instant::now() + self.ping_interval;
        let ping = tokio::time::interval_at(first_ping, self.ping_interval);
        *guard = Some(Connection { stream, ping });
        Ok(())
    }

    async fn next_frame(&self) -> Result<Option<String>, TransportError> {
        let mut guard = self.connection.lock().await;
        let Some(connection) = guard.as_mut() else {
            return Err(TransportError::Receive("not connected".to_owned()));
        };

        loop {
            tokio::select! {
                _ = connection.ping.tick() => {
                    connection.stream.send(Message::Ping(Vec::new())).await.map_err(|error| {
                        TransportError::Receive(format!("liveness ping failed: {error}"))
                    })?;
                }
                frame = connection.stream.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => return Ok(Some(text)),
                        Some(Ok(Message::Ping(payload))) => {
                            connection.stream.send(Message::Pong(payload)).await.map_err(
                                |error| {
                                    TransportError::Receive(format!("pong reply failed: {error}"))
                                },
                            )?;
                        }
                        Some(Ok(Message::Close(_))) | None => return Ok(None),
                        // Pong replies and binary frames are not part of the event stream.
                        Some(Ok(_)) => {}
                        Some(Err(error)) => {
                            return Err(TransportError::Receive(error.to_string()));
                        }
                    }
                }
            }
        }
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        let mut guard = self.connection.lock().await;
        let Some(mut connection) = guard.take() else {
            return Ok(());
        };

        match connection.stream.close(None).await {
            Ok(()) => Ok(()),
            // A peer-initiated close is not an error here.
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => Ok(()),
            Err(error) => Err(TransportError::Disconnect(error.to_string())),
        }
    }
}

async fn wait_for_challenge_verdict(stream: &mut WsStream) -> Result<(), TransportError> {
    for _ in 0..HANDSHAKE_FRAME_LIMIT {
        let frame = tokio::time::timeout(AUTH_REPLY_TIMEOUT, stream.next()).await.map_err(|_| {
            TransportError::Connect("timed out waiting for the authentication reply".to_owned())
        })?;

        let message = match frame {
            Some(Ok(message)) => message,
            Some(Err(error)) => {
                return Err(TransportError::Connect(format!(
                    "stream failed during authentication: {error}"
                )));
            }
            None => {
                return Err(TransportError::Connect(
                    "stream closed during authentication".to_owned(),
                ));
            }
        };

        let Message::Text(text) = message else {
            continue;
        };
        match challenge_verdict(&text) {
            Some(true) => return Ok(()),
            Some(false) => {
                return Err(TransportError::Auth("server rejected the bot token".to_owned()));
            }
            None => {}
        }
    }

    Err(TransportError::Connect("no authentication reply in the first frames".to_owned()))
}

#[derive(Debug, Deserialize)]
struct ChallengeReply {
    status: Option<String>,
    seq_reply: Option<u64>,
}

/// `Some(true)` on an accepted challenge, `Some(false)` on a rejection, `None`
/// for unrelated frames (hello, early events).
fn challenge_verdict(raw: &str) -> Option<bool> {
    let reply: ChallengeReply = serde_json::from_str(raw).ok()?;
    if reply.seq_reply != Some(AUTH_CHALLENGE_SEQ) {
        return None;
    }
    Some(reply.status.as_deref() == Some("OK"))
}

fn websocket_url(base: &str) -> Result<String, TransportError> {
    let trimmed = base.trim_end_matches('/');
    if let Some(rest) = trimmed.strip_prefix("https://") {
        Ok(format!("wss://{rest}/api/v4/websocket"))
    } else if let Some(rest) = trimmed.strip_prefix("http://") {
        Ok(format!("ws://{rest}/api/v4/websocket"))
    } else {
        Err(TransportError::Connect(format!("unsupported server url scheme: {base}")))
    }
}

#[cfg(test)]
mod tests {
    use super::{challenge_verdict, websocket_url};
    use crate::socket::TransportError;

    #[test]
    fn derives_the_websocket_endpoint_from_the_server_url() {
        assert_eq!(
            websocket_url("https://chat.example.com").expect("derive"),
            "wss://chat.example.com/api/v4/websocket"
        );
        assert_eq!(
            websocket_url("http://localhost:8065/").expect("derive"),
            "ws://localhost:8065/api/v4/websocket"
        );
    }

    #[test]
    fn rejects_server_urls_without_an_http_scheme() {
        let error = websocket_url("ftp://chat.example.com").expect_err("scheme is unsupported");
        assert!(matches!(error, TransportError::Connect(_)));
    }

    #[test]
    fn reads_the_challenge_verdict_and_ignores_unrelated_frames() {
        assert_eq!(challenge_verdict(r#"{"status": "OK", "seq_reply": 1}"#), Some(true));
        assert_eq!(
            challenge_verdict(
                r#"{"status": "FAIL", "seq_reply": 1, "error": {"id": "api.web_socket_router.not_authenticated.app_error", "message": "session is not authenticated"}}"#
            ),
            Some(false)
        );
        assert_eq!(challenge_verdict(r#"{"event": "hello", "data": {}, "seq": 1}"#), None);
        assert_eq!(challenge_verdict(r#"{"status": "OK", "seq_reply": 7}"#), None);
        assert_eq!(challenge_verdict("{oops"), None);
    }
}
