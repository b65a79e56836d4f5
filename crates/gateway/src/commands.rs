use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::info;

use mattergate_core::{ChannelSyncReport, NormalizedMessage, RedemptionResult};
use mattergate_db::repositories::{ChannelConfigStore, RegistrationStore, RepositoryError};
use mattergate_mattermost::client::{ApiError, PlatformClient};

use crate::tenants::{Resolution, TenantCache};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Register { token: String },
    SyncChannels,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CommandParseError {
    #[error("unknown command `!{verb}`")]
    UnknownCommand { verb: String },
    #[error("`!register` requires exactly one key")]
    MissingRegistrationToken,
}

impl CommandParseError {
    pub fn user_reply(&self) -> String {
        match self {
            Self::UnknownCommand { verb } => unknown_command_message(verb),
            Self::MissingRegistrationToken => usage_message(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MessageKind {
    Command(Command),
    InvalidCommand(CommandParseError),
    Conversational,
}

/// Splits control traffic from conversation. Text counts as a command attempt
/// only when `!` is immediately followed by an alphabetic verb; `!!`, `!1` and
/// `! hi` read as ordinary messages. Verbs are case-sensitive.
pub fn classify(text: &str) -> MessageKind {
    let trimmed = text.trim_start();
    let Some(rest) = trimmed.strip_prefix('!') else {
        return MessageKind::Conversational;
    };
    if !rest.chars().next().is_some_and(char::is_alphabetic) {
        return MessageKind::Conversational;
    }

    let mut words = rest.split_whitespace();
    let verb = words.next().unwrap_or_default();
    match verb {
        "register" => match (words.next(), words.next()) {
            (Some(token), None) => {
                MessageKind::Command(Command::Register { token: token.to_owned() })
            }
            // No key, or trailing junk that could hide a mangled key.
            _ => MessageKind::InvalidCommand(CommandParseError::MissingRegistrationToken),
        },
        "sync-channels" => MessageKind::Command(Command::SyncChannels),
        _ => MessageKind::InvalidCommand(CommandParseError::UnknownCommand {
            verb: verb.to_owned(),
        }),
    }
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Platform(#[from] ApiError),
}

/// Runs recognized commands against the stores and the platform. Domain
/// verdicts (bad key, unregistered team) come back as user-visible replies;
/// only infrastructure failures surface as errors.
pub struct CommandExecutor {
    registrations: Arc<dyn RegistrationStore>,
    channels: Arc<dyn ChannelConfigStore>,
    tenants: Arc<TenantCache>,
}

impl CommandExecutor {
    pub fn new(
        registrations: Arc<dyn RegistrationStore>,
        channels: Arc<dyn ChannelConfigStore>,
        tenants: Arc<TenantCache>,
    ) -> Self {
        Self { registrations, channels, tenants }
    }

    pub async fn execute(
        &self,
        platform: &dyn PlatformClient,
        message: &NormalizedMessage,
        command: &Command,
    ) -> Result<String, CommandError> {
        match command {
            Command::Register { token } => self.register(message, token).await,
            Command::SyncChannels => self.sync_channels(platform, message).await,
        }
    }

    async fn register(
        &self,
        message: &NormalizedMessage,
        token: &str,
    ) -> Result<String, CommandError> {
        let verdict = self
            .registrations
            .redeem_key(token, &message.team_id, Utc::now())
            .await?;
        Ok(match verdict {
            RedemptionResult::Registered(registration) => {
                // Invalidate before replying, so the acknowledgment is never
                // ahead of what resolution serves.
                self.tenants.invalidate(&message.team_id).await;
                info!(
                    event_name = "gateway.command.registered",
                    team_id = %message.team_id.0,
                    tenant_id = %registration.tenant_id.0,
                    "team registered"
                );
                registration_success_message()
            }
            RedemptionResult::KeyNotFound => key_not_found_message(),
            RedemptionResult::KeyExpired => key_expired_message(),
            RedemptionResult::KeyAlreadyConsumed => key_already_consumed_message(),
        })
    }

    async fn sync_channels(
        &self,
        platform: &dyn PlatformClient,
        message: &NormalizedMessage,
    ) -> Result<String, CommandError> {
        match self.tenants.resolve(&message.team_id).await? {
            Resolution::NotRegistered => Ok(not_registered_message()),
            Resolution::Tenant(_) => {
                let channel_ids = platform.list_channels(&message.team_id).await?;
                let report = self
                    .channels
                    .register_channels(&message.team_id, &channel_ids)
                    .await?;
                info!(
                    event_name = "gateway.command.channels_synced",
                    team_id = %message.team_id.0,
                    added = report.added,
                    already_known = report.already_known,
                    "channels synced"
                );
                Ok(sync_report_message(&report))
            }
        }
    }
}

pub fn usage_message() -> String {
    "**Usage:** `!register <key>` — ask your administrator for a registration key.".to_owned()
}

pub fn unknown_command_message(verb: &str) -> String {
    format!(
        "**Unknown command** `!{verb}`. Available commands: `!register <key>`, `!sync-channels`."
    )
}

pub fn registration_success_message() -> String {
    "**Registration complete.** Run `!sync-channels` so I can discover this team's channels."
        .to_owned()
}

pub fn key_not_found_message() -> String {
    "**Registration failed:** that key is not recognized. Check for typos or request a new key."
        .to_owned()
}

pub fn key_expired_message() -> String {
    "**Registration failed:** that key has expired. Request a fresh key from your administrator."
        .to_owned()
}

pub fn key_already_consumed_message() -> String {
    "**Registration failed:** that key has already been used. Each key works exactly once."
        .to_owned()
}

pub fn not_registered_message() -> String {
    "**Not registered.** Run `!register <key>` first.".to_owned()
}

pub fn sync_report_message(report: &ChannelSyncReport) -> String {
    format!(
        "**Channel sync complete.** {} new, {} already known.",
        report.added, report.already_known
    )
}

pub fn command_failure_message() -> String {
    "**Something went wrong** running that command. Please try again shortly.".to_owned()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, Utc};
    use tokio::sync::Mutex;

    use mattergate_core::{
        ChannelId, NormalizedMessage, PostId, RegistrationKey, TeamId, TeamRegistration, TenantId,
        UserId,
    };
    use mattergate_db::repositories::{
        ChannelConfigStore, InMemoryChannelConfigStore, InMemoryRegistrationStore,
    };
    use mattergate_mattermost::client::{ApiError, BotIdentity, PlatformClient};

    use crate::tenants::{Resolution, TenantCache};

    use super::{classify, Command, CommandExecutor, CommandParseError, MessageKind};

    /// Platform double with a fixed channel listing.
    struct ListingPlatform {
        channels: Vec<ChannelId>,
        listed_teams: Mutex<Vec<TeamId>>,
    }

    impl ListingPlatform {
        fn new(channels: Vec<&str>) -> Self {
            Self {
                channels: channels.into_iter().map(|c| ChannelId(c.to_owned())).collect(),
                listed_teams: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl PlatformClient for ListingPlatform {
        async fn current_user(&self) -> Result<BotIdentity, ApiError> {
            Ok(BotIdentity { user_id: UserId("bot".to_owned()), username: "gateway".to_owned() })
        }

        async fn create_post(
            &self,
            _channel_id: &ChannelId,
            _message: &str,
            _root_id: Option<&PostId>,
        ) -> Result<PostId, ApiError> {
            Ok(PostId("reply".to_owned()))
        }

        async fn list_channels(&self, team_id: &TeamId) -> Result<Vec<ChannelId>, ApiError> {
            self.listed_teams.lock().await.push(team_id.clone());
            Ok(self.channels.clone())
        }
    }

    struct Fixture {
        registrations: Arc<InMemoryRegistrationStore>,
        channels: Arc<InMemoryChannelConfigStore>,
        tenants: Arc<TenantCache>,
        executor: CommandExecutor,
    }

    fn fixture() -> Fixture {
        let registrations = Arc::new(InMemoryRegistrationStore::default());
        let channels = Arc::new(InMemoryChannelConfigStore::default());
        let tenants =
            Arc::new(TenantCache::new(registrations.clone(), Duration::from_secs(300)));
        let executor =
            CommandExecutor::new(registrations.clone(), channels.clone(), tenants.clone());
        Fixture { registrations, channels, tenants, executor }
    }

    fn key(token: &str, expires_in_secs: i64) -> RegistrationKey {
        RegistrationKey {
            token: token.to_owned(),
            tenant_id: TenantId("tenant-a".to_owned()),
            credential_ref: "cred-a".to_owned(),
            expires_at: Utc::now() + ChronoDuration::seconds(expires_in_secs),
            consumed: false,
        }
    }

    fn message(team_id: &str, text: &str) -> NormalizedMessage {
        NormalizedMessage {
            message_id: PostId("post-1".to_owned()),
            team_id: TeamId(team_id.to_owned()),
            channel_id: ChannelId("town-square".to_owned()),
            author_id: UserId("alice".to_owned()),
            text: text.to_owned(),
            root_id: None,
            mentions: Vec::new(),
            received_at: Utc::now(),
        }
    }

    #[test]
    fn commands_are_recognized_by_their_verb() {
        assert_eq!(
            classify("!register ABC123"),
            MessageKind::Command(Command::Register { token: "ABC123".to_owned() })
        );
        assert_eq!(classify("!sync-channels"), MessageKind::Command(Command::SyncChannels));
        assert_eq!(
            classify("  !sync-channels ignored"),
            MessageKind::Command(Command::SyncChannels)
        );
    }

    #[test]
    fn register_requires_exactly_one_key() {
        assert_eq!(
            classify("!register"),
            MessageKind::InvalidCommand(CommandParseError::MissingRegistrationToken)
        );
        assert_eq!(
            classify("!register one two"),
            MessageKind::InvalidCommand(CommandParseError::MissingRegistrationToken)
        );
    }

    #[test]
    fn unknown_verbs_are_rejected_with_the_verb_named() {
        assert_eq!(
            classify("!help"),
            MessageKind::InvalidCommand(CommandParseError::UnknownCommand {
                verb: "help".to_owned()
            })
        );
        // Case-sensitive: the canonical verbs are lowercase.
        assert_eq!(
            classify("!Register ABC"),
            MessageKind::InvalidCommand(CommandParseError::UnknownCommand {
                verb: "Register".to_owned()
            })
        );
    }

    #[test]
    fn punctuation_after_the_bang_reads_as_conversation() {
        assert_eq!(classify("!!"), MessageKind::Conversational);
        assert_eq!(classify("!1 thing"), MessageKind::Conversational);
        assert_eq!(classify("! hi"), MessageKind::Conversational);
        assert_eq!(classify("plain text"), MessageKind::Conversational);
        assert_eq!(classify(""), MessageKind::Conversational);
    }

    #[tokio::test]
    async fn a_valid_key_registers_the_team() {
        let fx = fixture();
        fx.registrations.seed_key(key("ABC123", 3_600)).await;
        let platform = ListingPlatform::new(vec![]);

        let reply = fx
            .executor
            .execute(
                &platform,
                &message("T1", "!register ABC123"),
                &Command::Register { token: "ABC123".to_owned() },
            )
            .await
            .unwrap();

        assert!(reply.contains("Registration complete"), "got: {reply}");
        assert!(matches!(
            fx.tenants.resolve(&TeamId("T1".to_owned())).await.unwrap(),
            Resolution::Tenant(_)
        ));
    }

    #[tokio::test]
    async fn registration_is_visible_even_after_a_cached_miss() {
        let fx = fixture();
        fx.registrations.seed_key(key("ABC123", 3_600)).await;
        let platform = ListingPlatform::new(vec![]);

        // Prime the cache with a negative entry, as unregistered chatter would.
        assert!(matches!(
            fx.tenants.resolve(&TeamId("T1".to_owned())).await.unwrap(),
            Resolution::NotRegistered
        ));

        fx.executor
            .execute(
                &platform,
                &message("T1", "!register ABC123"),
                &Command::Register { token: "ABC123".to_owned() },
            )
            .await
            .unwrap();

        assert!(matches!(
            fx.tenants.resolve(&TeamId("T1".to_owned())).await.unwrap(),
            Resolution::Tenant(_)
        ));
    }

    #[tokio::test]
    async fn each_key_verdict_has_its_own_reply() {
        let fx = fixture();
        fx.registrations.seed_key(key("EXPIRED", -60)).await;
        let mut used = key("USED", 3_600);
        used.consumed = true;
        fx.registrations.seed_key(used).await;
        let platform = ListingPlatform::new(vec![]);

        let cases = [
            ("MISSING", "not recognized"),
            ("EXPIRED", "has expired"),
            ("USED", "already been used"),
        ];
        for (token, needle) in cases {
            let reply = fx
                .executor
                .execute(
                    &platform,
                    &message("T1", "!register x"),
                    &Command::Register { token: token.to_owned() },
                )
                .await
                .unwrap();
            assert!(reply.contains(needle), "token={token} got: {reply}");
        }
    }

    #[tokio::test]
    async fn sync_requires_a_registered_team() {
        let fx = fixture();
        let platform = ListingPlatform::new(vec!["town-square"]);

        let reply = fx
            .executor
            .execute(&platform, &message("T1", "!sync-channels"), &Command::SyncChannels)
            .await
            .unwrap();

        assert!(reply.contains("Not registered"), "got: {reply}");
        assert!(platform.listed_teams.lock().await.is_empty());
    }

    #[tokio::test]
    async fn sync_reports_added_and_already_known_counts() {
        let fx = fixture();
        fx.registrations
            .seed_registration(TeamRegistration {
                team_id: TeamId("T1".to_owned()),
                tenant_id: TenantId("tenant-a".to_owned()),
                credential_ref: "cred-a".to_owned(),
                registered_at: Utc::now(),
            })
            .await;
        let platform = ListingPlatform::new(vec!["town-square", "dev"]);

        let first = fx
            .executor
            .execute(&platform, &message("T1", "!sync-channels"), &Command::SyncChannels)
            .await
            .unwrap();
        assert!(first.contains("2 new, 0 already known"), "got: {first}");

        let second = fx
            .executor
            .execute(&platform, &message("T1", "!sync-channels"), &Command::SyncChannels)
            .await
            .unwrap();
        assert!(second.contains("0 new, 2 already known"), "got: {second}");

        assert!(fx
            .channels
            .find_channel(&ChannelId("dev".to_owned()))
            .await
            .unwrap()
            .is_some());
    }
}
