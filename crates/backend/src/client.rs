use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use mattergate_core::SessionId;

#[derive(Debug, Error)]
pub enum AnswerError {
    #[error("backend call timed out")]
    Timeout,
    #[error("backend request failed: {0}")]
    Http(#[source] reqwest::Error),
    #[error("backend returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("backend response could not be decoded: {0}")]
    Decode(#[source] reqwest::Error),
}

impl From<reqwest::Error> for AnswerError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else if error.is_decode() {
            Self::Decode(error)
        } else {
            Self::Http(error)
        }
    }
}

#[derive(Clone, Debug)]
pub struct AnswerRequest {
    /// Tenant credential authorizing this call; provisioned at registration.
    pub credential: SecretString,
    /// Present on follow-up turns of a mapped thread, absent on the first turn.
    pub session_id: Option<SessionId>,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnswerReply {
    /// Session the backend answered under; new when the request carried none.
    pub session_id: SessionId,
    pub answer_text: String,
}

#[async_trait]
pub trait AnswerClient: Send + Sync {
    async fn answer(&self, request: &AnswerRequest) -> Result<AnswerReply, AnswerError>;
}

pub struct HttpAnswerClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpAnswerClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, AnswerError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, base_url: base_url.trim_end_matches('/').to_owned() })
    }
}

#[async_trait]
impl AnswerClient for HttpAnswerClient {
    async fn answer(&self, request: &AnswerRequest) -> Result<AnswerReply, AnswerError> {
        let body = AnswerBody {
            message: &request.message,
            session_id: request.session_id.as_ref().map(|session| session.0.as_str()),
        };
        let response = self
            .http
            .post(format!("{}/api/answer", self.base_url))
            .bearer_auth(request.credential.expose_secret())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AnswerError::Api {
                status: status.as_u16(),
                message: backend_error_message(&body),
            });
        }

        let reply: AnswerResponse = response.json().await?;
        Ok(AnswerReply { session_id: SessionId(reply.session_id), answer_text: reply.answer_text })
    }
}

/// Calls the backend once and, on any failure, exactly once more after a fixed
/// backoff. The second failure is returned to the caller; no further retries
/// happen at this layer.
pub async fn answer_with_retry(
    client: &dyn AnswerClient,
    request: &AnswerRequest,
    retry_backoff: Duration,
) -> Result<AnswerReply, AnswerError> {
    let first_error = match client.answer(request).await {
        Ok(reply) => return Ok(reply),
        Err(error) => error,
    };

    warn!(error = %first_error, "backend call failed; retrying once");
    if !retry_backoff.is_zero() {
        tokio::time::sleep(retry_backoff).await;
    }

    client.answer(request).await
}

#[derive(Debug, Serialize)]
struct AnswerBody<'a> {
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct AnswerResponse {
    session_id: String,
    answer_text: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

fn backend_error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => parsed.error,
        Err(_) => body.trim().to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::time::Duration;

    use super::{
        answer_with_retry, AnswerBody, AnswerClient, AnswerError, AnswerReply, AnswerRequest,
    };
    use async_trait::async_trait;
    use mattergate_core::SessionId;
    use tokio::sync::Mutex;

    struct ScriptedAnswerClient {
        state: Mutex<ScriptedState>,
    }

    struct ScriptedState {
        results: VecDeque<Result<AnswerReply, AnswerError>>,
        calls: usize,
    }

    impl ScriptedAnswerClient {
        fn with_script(results: Vec<Result<AnswerReply, AnswerError>>) -> Self {
            Self { state: Mutex::new(ScriptedState { results: results.into(), calls: 0 }) }
        }

        async fn calls(&self) -> usize {
            self.state.lock().await.calls
        }
    }

    #[async_trait]
    impl AnswerClient for ScriptedAnswerClient {
        async fn answer(&self, _request: &AnswerRequest) -> Result<AnswerReply, AnswerError> {
            let mut state = self.state.lock().await;
            state.calls += 1;
            state.results.pop_front().unwrap_or(Err(AnswerError::Timeout))
        }
    }

    fn reply(session: &str, text: &str) -> AnswerReply {
        AnswerReply { session_id: SessionId(session.to_owned()), answer_text: text.to_owned() }
    }

    fn request() -> AnswerRequest {
        AnswerRequest {
            credential: "tenant-credential".to_owned().into(),
            session_id: None,
            message: "what is our refund policy?".to_owned(),
        }
    }

    #[tokio::test]
    async fn a_successful_call_is_not_retried() {
        let client = ScriptedAnswerClient::with_script(vec![Ok(reply("sess-1", "30 days."))]);

        let answer = answer_with_retry(&client, &request(), Duration::ZERO)
            .await
            .expect("first call succeeds");

        assert_eq!(answer, reply("sess-1", "30 days."));
        assert_eq!(client.calls().await, 1);
    }

    #[tokio::test]
    async fn a_transient_failure_is_retried_once() {
        let client = ScriptedAnswerClient::with_script(vec![
            Err(AnswerError::Timeout),
            Ok(reply("sess-2", "second attempt answer")),
        ]);

        let answer =
            answer_with_retry(&client, &request(), Duration::ZERO).await.expect("retry succeeds");

        assert_eq!(answer.session_id.0, "sess-2");
        assert_eq!(client.calls().await, 2);
    }

    #[tokio::test]
    async fn backend_errors_are_retried_like_timeouts() {
        let client = ScriptedAnswerClient::with_script(vec![
            Err(AnswerError::Api { status: 503, message: "overloaded".to_owned() }),
            Ok(reply("sess-3", "recovered")),
        ]);

        let answer =
            answer_with_retry(&client, &request(), Duration::ZERO).await.expect("retry succeeds");

        assert_eq!(answer.answer_text, "recovered");
        assert_eq!(client.calls().await, 2);
    }

    #[tokio::test]
    async fn the_second_failure_is_final() {
        let client = ScriptedAnswerClient::with_script(vec![
            Err(AnswerError::Timeout),
            Err(AnswerError::Timeout),
            Ok(reply("sess-4", "never reached")),
        ]);

        let error = answer_with_retry(&client, &request(), Duration::ZERO)
            .await
            .expect_err("both attempts fail");

        assert!(matches!(error, AnswerError::Timeout));
        assert_eq!(client.calls().await, 2);
    }

    #[test]
    fn request_body_omits_a_missing_session() {
        let body = AnswerBody { message: "hi", session_id: None };
        let value = serde_json::to_value(&body).expect("serialize");

        assert_eq!(value, serde_json::json!({ "message": "hi" }));
    }

    #[test]
    fn request_body_carries_the_mapped_session() {
        let body = AnswerBody { message: "hi again", session_id: Some("sess-7") };
        let value = serde_json::to_value(&body).expect("serialize");

        assert_eq!(value, serde_json::json!({ "message": "hi again", "session_id": "sess-7" }));
    }
}
