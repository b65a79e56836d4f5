use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use mattergate_core::NormalizedMessage;

use crate::events::decode_event;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport failed to connect: {0}")]
    Connect(String),
    #[error("transport read failed: {0}")]
    Receive(String),
    #[error("transport authentication rejected: {0}")]
    Auth(String),
    #[error("transport disconnect failed: {0}")]
    Disconnect(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { base_delay_ms: 1_000, max_delay_ms: 60_000 }
    }
}

impl ReconnectPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

/// Raw frame supplier. Implementations own the wire protocol; the runner only
/// sees text frames and connection lifecycle.
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;
    /// Next raw text frame. `Ok(None)` means the server closed the stream.
    async fn next_frame(&self) -> Result<Option<String>, TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
}

/// Receiving end of the processing pipeline.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn deliver(
        &self,
        server: &str,
        message: NormalizedMessage,
    ) -> Result<(), SinkClosed>;
}

/// The pipeline has shut down and accepts no further messages.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("event sink closed")]
pub struct SinkClosed;

enum PumpEnd {
    SinkClosed,
    StreamClosed,
}

/// Per-server read loop: connect, decode frames, hand accepted messages to the
/// sink. Reconnects forever with capped exponential backoff; the only fatal
/// condition is a rejected authentication, which halts this server's runner
/// without touching the rest of the process.
pub struct StreamRunner {
    server: String,
    source: Arc<dyn EventSource>,
    sink: Arc<dyn EventSink>,
    reconnect_policy: ReconnectPolicy,
}

impl StreamRunner {
    pub fn new(
        server: String,
        source: Arc<dyn EventSource>,
        sink: Arc<dyn EventSink>,
        reconnect_policy: ReconnectPolicy,
    ) -> Self {
        Self { server, source, sink, reconnect_policy }
    }

    pub async fn start(&self) {
        let mut attempt: u32 = 0;
        loop {
            info!(server = %self.server, attempt, "opening event stream connection");
            if let Err(connect_error) = self.source.connect().await {
                if let TransportError::Auth(reason) = &connect_error {
                    error!(
                        server = %self.server,
                        reason = %reason,
                        "event stream authentication rejected; halting this server's runner"
                    );
                    return;
                }
                warn!(
                    server = %self.server,
                    attempt,
                    error = %connect_error,
                    "event stream connect failed"
                );
                let delay = self.reconnect_policy.backoff(attempt);
                attempt = attempt.saturating_add(1);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                continue;
            }

            info!(server = %self.server, "event stream connected");
            attempt = 0;

            match self.pump().await {
                Ok(PumpEnd::SinkClosed) => {
                    info!(server = %self.server, "event sink closed; stopping stream runner");
                    return;
                }
                Ok(PumpEnd::StreamClosed) => {
                    warn!(server = %self.server, "event stream closed by server; reconnecting");
                }
                Err(TransportError::Auth(reason)) => {
                    error!(
                        server = %self.server,
                        reason = %reason,
                        "event stream authentication rejected; halting this server's runner"
                    );
                    return;
                }
                Err(pump_error) => {
                    warn!(
                        server = %self.server,
                        error = %pump_error,
                        "event stream transport failed; reconnecting"
                    );
                }
            }

            let delay = self.reconnect_policy.backoff(attempt);
            attempt = attempt.saturating_add(1);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }

    async fn pump(&self) -> Result<PumpEnd, TransportError> {
        loop {
            let Some(frame) = self.source.next_frame().await? else {
                self.source.disconnect().await?;
                return Ok(PumpEnd::StreamClosed);
            };

            let message = match decode_event(&frame) {
                Ok(Some(message)) => message,
                Ok(None) => {
                    debug!(server = %self.server, "skipping frame with no actionable event");
                    continue;
                }
                Err(decode_error) => {
                    warn!(
                        event_name = "ingress.mattermost.frame_dropped",
                        server = %self.server,
                        error = %decode_error,
                        "dropping malformed event frame"
                    );
                    continue;
                }
            };

            info!(
                event_name = "ingress.mattermost.message_received",
                server = %self.server,
                message_id = %message.message_id.0,
                team_id = %message.team_id.0,
                channel_id = %message.channel_id.0,
                "received platform message"
            );

            if self.sink.deliver(&self.server, message).await.is_err() {
                if let Err(disconnect_error) = self.source.disconnect().await {
                    debug!(
                        server = %self.server,
                        error = %disconnect_error,
                        "disconnect after sink close failed"
                    );
                }
                return Ok(PumpEnd::SinkClosed);
            }
        }
    }
}
