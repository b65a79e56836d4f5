use mattergate_core::{ChannelConfig, NormalizedMessage, ResponseMode, UserId};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    SelfAuthored,
    ChannelDisabled,
    NotMentioned,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Respond,
    Skip(SkipReason),
}

/// Whether a conversational message earns a reply. Pure: the caller supplies
/// the channel row (a channel with no row counts as disabled) and the bot's
/// own identity; nothing here touches storage or the platform.
pub fn decide(
    message: &NormalizedMessage,
    channel: Option<&ChannelConfig>,
    bot_user_id: &UserId,
) -> Decision {
    if message.author_id == *bot_user_id {
        return Decision::Skip(SkipReason::SelfAuthored);
    }
    let Some(channel) = channel else {
        return Decision::Skip(SkipReason::ChannelDisabled);
    };
    if !channel.enabled {
        return Decision::Skip(SkipReason::ChannelDisabled);
    }
    if channel.response_mode == ResponseMode::MentionOnly && !message.mentions_user(bot_user_id) {
        return Decision::Skip(SkipReason::NotMentioned);
    }
    Decision::Respond
}
