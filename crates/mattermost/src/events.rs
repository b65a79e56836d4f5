use chrono::Utc;
use serde::Deserialize;
use thiserror::Error;

use mattergate_core::{ChannelId, NormalizedMessage, PostId, TeamId, UserId};

#[derive(Debug, Error)]
pub enum EventDecodeError {
    #[error("malformed event frame: {0}")]
    Frame(#[source] serde_json::Error),
    #[error("`{event}` event is missing the `{field}` field")]
    MissingField { event: String, field: &'static str },
    #[error("`{event}` event has a malformed `{field}` payload: {source}")]
    Payload {
        event: String,
        field: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Raw frame envelope. The interesting payloads (`post`, `mentions`) arrive as
/// string-encoded JSON inside `data` and need a second decode pass.
#[derive(Debug, Deserialize)]
struct EventFrame {
    event: Option<String>,
    #[serde(default)]
    data: EventData,
}

#[derive(Debug, Default, Deserialize)]
struct EventData {
    team_id: Option<String>,
    post: Option<String>,
    mentions: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PostPayload {
    id: String,
    user_id: String,
    channel_id: String,
    #[serde(default)]
    root_id: String,
    #[serde(default)]
    message: String,
}

/// Decodes one text frame from the event stream into a [`NormalizedMessage`].
///
/// Returns `Ok(None)` for frames the gateway does not act on: status replies to
/// our own requests (no `event` name), the post-auth hello, typing indicators,
/// and every other event type except `posted` and `post_edited`.
pub fn decode_event(raw: &str) -> Result<Option<NormalizedMessage>, EventDecodeError> {
    let frame: EventFrame = serde_json::from_str(raw).map_err(EventDecodeError::Frame)?;

    let Some(event) = frame.event else {
        return Ok(None);
    };
    if event != "posted" && event != "post_edited" {
        return Ok(None);
    }

    let post_raw = frame
        .data
        .post
        .ok_or_else(|| EventDecodeError::MissingField { event: event.clone(), field: "post" })?;
    let post: PostPayload = serde_json::from_str(&post_raw).map_err(|source| {
        EventDecodeError::Payload { event: event.clone(), field: "post", source }
    })?;

    let mentions = match frame.data.mentions {
        Some(raw_mentions) => {
            let ids: Vec<String> = serde_json::from_str(&raw_mentions).map_err(|source| {
                EventDecodeError::Payload { event, field: "mentions", source }
            })?;
            ids.into_iter().map(UserId).collect()
        }
        None => Vec::new(),
    };

    let root_id = if post.root_id.is_empty() { None } else { Some(PostId(post.root_id)) };

    Ok(Some(NormalizedMessage {
        message_id: PostId(post.id),
        // Direct messages carry no team id; they resolve as unregistered downstream.
        team_id: TeamId(frame.data.team_id.unwrap_or_default()),
        channel_id: ChannelId(post.channel_id),
        author_id: UserId(post.user_id),
        text: post.message,
        root_id,
        mentions,
        received_at: Utc::now(),
    }))
}

#[cfg(test)]
mod tests {
    use super::{decode_event, EventDecodeError};
    use mattergate_core::UserId;

    const POSTED_FRAME: &str = r#"{
        "event": "posted",
        "data": {
            "channel_display_name": "Town Square",
            "channel_name": "town-square",
            "channel_type": "O",
            "mentions": "[\"bot-user-1\"]",
            "post": "{\"id\":\"post-1\",\"create_at\":1756000000000,\"update_at\":1756000000000,\"user_id\":\"user-7\",\"channel_id\":\"chan-3\",\"root_id\":\"\",\"message\":\"@gate what is our refund policy?\",\"type\":\"\"}",
            "sender_name": "@ana",
            "team_id": "team-9"
        },
        "broadcast": {
            "omit_users": null,
            "user_id": "",
            "channel_id": "chan-3",
            "team_id": ""
        },
        "seq": 11
    }"#;

    fn frame_with(event: &str, root_id: &str, mentions: Option<&str>) -> String {
        let post = serde_json::json!({
            "id": "post-2",
            "user_id": "user-7",
            "channel_id": "chan-3",
            "root_id": root_id,
            "message": "follow-up question",
        })
        .to_string();
        let mut data = serde_json::json!({
            "team_id": "team-9",
            "post": post,
        });
        if let Some(mentions) = mentions {
            data["mentions"] = serde_json::Value::String(mentions.to_owned());
        }
        serde_json::json!({ "event": event, "data": data, "seq": 3 }).to_string()
    }

    #[test]
    fn posted_frames_decode_to_normalized_messages() {
        let message = decode_event(POSTED_FRAME).expect("decode").expect("accepted");

        assert_eq!(message.message_id.0, "post-1");
        assert_eq!(message.team_id.0, "team-9");
        assert_eq!(message.channel_id.0, "chan-3");
        assert_eq!(message.author_id.0, "user-7");
        assert_eq!(message.text, "@gate what is our refund policy?");
        assert_eq!(message.root_id, None);
        assert_eq!(message.mentions, vec![UserId("bot-user-1".to_owned())]);
        assert_eq!(message.thread_root(), &message.message_id);
    }

    #[test]
    fn thread_replies_keep_their_root() {
        let raw = frame_with("posted", "post-root-5", Some("[]"));
        let message = decode_event(&raw).expect("decode").expect("accepted");

        assert_eq!(message.root_id.as_ref().map(|root| root.0.as_str()), Some("post-root-5"));
        assert_eq!(message.thread_root().0, "post-root-5");
    }

    #[test]
    fn edited_posts_are_accepted() {
        let raw = frame_with("post_edited", "", None);
        let message = decode_event(&raw).expect("decode").expect("accepted");

        assert_eq!(message.message_id.0, "post-2");
        assert!(message.mentions.is_empty());
    }

    #[test]
    fn unrelated_events_are_skipped() {
        let typing = r#"{"event": "typing", "data": {"user_id": "user-7"}, "seq": 2}"#;
        assert!(decode_event(typing).expect("decode").is_none());

        let hello = r#"{"event": "hello", "data": {"server_version": "9.5.0"}, "seq": 1}"#;
        assert!(decode_event(hello).expect("decode").is_none());

        let status_reply = r#"{"status": "OK", "seq_reply": 1}"#;
        assert!(decode_event(status_reply).expect("decode").is_none());
    }

    #[test]
    fn posted_frame_without_a_post_is_an_error() {
        let raw = r#"{"event": "posted", "data": {"team_id": "team-9"}, "seq": 4}"#;
        let error = decode_event(raw).expect_err("post field is required");

        assert!(matches!(error, EventDecodeError::MissingField { field: "post", .. }));
    }

    #[test]
    fn garbled_post_payload_is_an_error() {
        let raw = serde_json::json!({
            "event": "posted",
            "data": { "team_id": "team-9", "post": "not json at all" },
            "seq": 5
        })
        .to_string();
        let error = decode_event(&raw).expect_err("nested payload must parse");

        assert!(matches!(error, EventDecodeError::Payload { field: "post", .. }));
    }

    #[test]
    fn frame_that_is_not_json_is_an_error() {
        let error = decode_event("{oops").expect_err("frame must parse");
        assert!(matches!(error, EventDecodeError::Frame(_)));
    }
}
