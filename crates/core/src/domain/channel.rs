use serde::{Deserialize, Serialize};

use crate::domain::registration::TeamId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelId(pub String);

/// Per-channel response behavior. A channel with no configuration row is
/// treated as disabled.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub channel_id: ChannelId,
    pub team_id: TeamId,
    pub enabled: bool,
    pub response_mode: ResponseMode,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseMode {
    MentionOnly,
    AllMessages,
}

impl ResponseMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MentionOnly => "mention_only",
            Self::AllMessages => "all_messages",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "mention_only" => Some(Self::MentionOnly),
            "all_messages" => Some(Self::AllMessages),
            _ => None,
        }
    }
}

/// Result of a `!sync-channels` run: how many rows were created vs. left alone.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChannelSyncReport {
    pub added: usize,
    pub already_known: usize,
}
