use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::channel::ChannelId;
use crate::domain::registration::TeamId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PostId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

/// A platform post reduced to the fields the gateway acts on. Produced by the
/// event decoder from both new posts and edits.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedMessage {
    pub message_id: PostId,
    pub team_id: TeamId,
    pub channel_id: ChannelId,
    pub author_id: UserId,
    pub text: String,
    /// Set when the post itself is a thread reply.
    pub root_id: Option<PostId>,
    pub mentions: Vec<UserId>,
    pub received_at: DateTime<Utc>,
}

impl NormalizedMessage {
    /// Root post of the thread this message belongs to. Top-level posts are
    /// their own root, so replies created from this always land in a thread.
    pub fn thread_root(&self) -> &PostId {
        self.root_id.as_ref().unwrap_or(&self.message_id)
    }

    pub fn mentions_user(&self, user: &UserId) -> bool {
        self.mentions.iter().any(|m| m == user)
    }
}
