use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use mattergate_core::{ChannelId, PostId, TeamId, UserId};

/// Platform cap on a single post, measured in characters. Longer replies are
/// split into sequential thread posts.
pub const MAX_MESSAGE_LENGTH: usize = 16_383;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("platform request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("platform returned {status}: {message}")]
    Api { status: u16, message: String },
}

/// The bot account behind a server's token, probed once at startup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BotIdentity {
    pub user_id: UserId,
    pub username: String,
}

/// Outbound REST surface of one Mattermost server.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    async fn current_user(&self) -> Result<BotIdentity, ApiError>;
    async fn create_post(
        &self,
        channel_id: &ChannelId,
        message: &str,
        root_id: Option<&PostId>,
    ) -> Result<PostId, ApiError>;
    async fn list_channels(&self, team_id: &TeamId) -> Result<Vec<ChannelId>, ApiError>;
}

pub struct HttpPlatformClient {
    http: reqwest::Client,
    base_url: String,
    token: SecretString,
}

impl HttpPlatformClient {
    pub fn new(base_url: &str, token: SecretString) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { http, base_url: base_url.trim_end_matches('/').to_owned(), token })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn checked(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::Api { status: status.as_u16(), message: platform_error_message(&body) })
    }
}

#[async_trait]
impl PlatformClient for HttpPlatformClient {
    async fn current_user(&self) -> Result<BotIdentity, ApiError> {
        let response = self
            .http
            .get(self.endpoint("/api/v4/users/me"))
            .bearer_auth(self.token.expose_secret())
            .send()
            .await?;
        let user: UserResponse = Self::checked(response).await?.json().await?;
        Ok(BotIdentity { user_id: UserId(user.id), username: user.username })
    }

    async fn create_post(
        &self,
        channel_id: &ChannelId,
        message: &str,
        root_id: Option<&PostId>,
    ) -> Result<PostId, ApiError> {
        let body = CreatePostBody {
            channel_id: &channel_id.0,
            message,
            root_id: root_id.map(|root| root.0.as_str()),
        };
        let response = self
            .http
            .post(self.endpoint("/api/v4/posts"))
            .bearer_auth(self.token.expose_secret())
            .json(&body)
            .send()
            .await?;
        let post: PostResponse = Self::checked(response).await?.json().await?;
        Ok(PostId(post.id))
    }

    async fn list_channels(&self, team_id: &TeamId) -> Result<Vec<ChannelId>, ApiError> {
        let path = format!("/api/v4/users/me/teams/{}/channels", team_id.0);
        let response = self
            .http
            .get(self.endpoint(&path))
            .bearer_auth(self.token.expose_secret())
            .send()
            .await?;
        let channels: Vec<ChannelResponse> = Self::checked(response).await?.json().await?;
        Ok(channels.into_iter().map(|channel| ChannelId(channel.id)).collect())
    }
}

#[derive(Debug, Serialize)]
struct CreatePostBody<'a> {
    channel_id: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    root_id: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    id: String,
    username: String,
}

#[derive(Debug, Deserialize)]
struct PostResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ChannelResponse {
    id: String,
}

/// Error bodies are JSON with a human-readable `message`; fall back to the raw
/// body when the shape differs.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

fn platform_error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(error) => error.message,
        Err(_) => body.trim().to_owned(),
    }
}

/// Splits an outbound message into platform-sized chunks, preferring to break
/// at the last newline inside the window so lists and paragraphs survive.
pub fn split_message(text: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut rest = text;

    while rest.chars().count() > MAX_MESSAGE_LENGTH {
        let limit = char_boundary(rest, MAX_MESSAGE_LENGTH);
        let window = &rest[..limit];
        let (head, tail) = match window.rfind('\n') {
            Some(newline) if newline > 0 => (&rest[..newline], &rest[newline + 1..]),
            _ => rest.split_at(limit),
        };
        chunks.push(head.to_owned());
        rest = tail;
    }

    chunks.push(rest.to_owned());
    chunks
}

/// Byte index of the `chars`-th character, clamped to the end of the string.
fn char_boundary(text: &str, chars: usize) -> usize {
    text.char_indices().nth(chars).map(|(index, _)| index).unwrap_or(text.len())
}
