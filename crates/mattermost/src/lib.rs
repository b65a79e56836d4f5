//! Mattermost Integration - event stream and REST surface
//!
//! This crate owns everything that speaks the Mattermost protocol:
//! - **Events** (`events`) - envelope decoding into normalized messages
//! - **Socket** (`socket`) - event-source trait, stream runner, reconnect policy
//! - **WebSocket** (`ws`) - tokio-tungstenite source with the authentication challenge
//! - **Client** (`client`) - REST calls (identity probe, posting, channel listing)
//!
//! # Getting Started
//!
//! 1. Create a bot account (System Console > Integrations > Bot Accounts)
//! 2. Copy the bot's access token
//! 3. Set env vars: `MATTERGATE_MATTERMOST_SERVER_URL`, `MATTERGATE_MATTERMOST_BOT_TOKEN`
//!
//! # Architecture
//!
//! ```text
//! Mattermost WS → StreamRunner → decode → EventSink (gateway pipeline)
//!                      ↑
//!              ReconnectPolicy (unbounded retries, capped backoff)
//! ```
//!
//! # Key Types
//!
//! - `StreamRunner` - per-server read loop with reconnection logic
//! - `EventSource` / `EventSink` - seams between transport and pipeline
//! - `PlatformClient` - outbound REST surface (replies, channel sync, identity)

pub mod client;
pub mod events;
pub mod socket;
pub mod ws;
