use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use mattergate_core::domain::channel::{ChannelConfig, ChannelId, ChannelSyncReport};
use mattergate_core::domain::registration::{RedemptionResult, TeamId, TeamRegistration};

pub mod channel;
pub mod memory;
pub mod registration;

pub use channel::SqlChannelConfigStore;
pub use memory::{InMemoryChannelConfigStore, InMemoryRegistrationStore};
pub use registration::SqlRegistrationStore;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

#[async_trait]
pub trait RegistrationStore: Send + Sync {
    async fn find_registration(
        &self,
        team_id: &TeamId,
    ) -> Result<Option<TeamRegistration>, RepositoryError>;

    /// Validates the key, marks it consumed, and creates or replaces the
    /// team's registration, all in one atomic unit. Concurrent redemptions of
    /// the same token yield exactly one `Registered` outcome.
    async fn redeem_key(
        &self,
        token: &str,
        team_id: &TeamId,
        now: DateTime<Utc>,
    ) -> Result<RedemptionResult, RepositoryError>;
}

#[async_trait]
pub trait ChannelConfigStore: Send + Sync {
    async fn find_channel(
        &self,
        channel_id: &ChannelId,
    ) -> Result<Option<ChannelConfig>, RepositoryError>;

    /// Add-only sync: inserts a disabled mention-only row per unseen channel.
    /// Existing rows are untouched and nothing is pruned.
    async fn register_channels(
        &self,
        team_id: &TeamId,
        channel_ids: &[ChannelId],
    ) -> Result<ChannelSyncReport, RepositoryError>;
}
