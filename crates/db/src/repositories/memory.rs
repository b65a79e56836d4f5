use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use mattergate_core::domain::channel::{ChannelConfig, ChannelId, ChannelSyncReport, ResponseMode};
use mattergate_core::domain::registration::{
    RedemptionResult, RegistrationKey, TeamId, TeamRegistration,
};

use super::{ChannelConfigStore, RegistrationStore, RepositoryError};

#[derive(Default)]
pub struct InMemoryRegistrationStore {
    state: RwLock<RegistrationState>,
}

#[derive(Default)]
struct RegistrationState {
    registrations: HashMap<String, TeamRegistration>,
    keys: HashMap<String, RegistrationKey>,
}

impl InMemoryRegistrationStore {
    pub async fn seed_key(&self, key: RegistrationKey) {
        let mut state = self.state.write().await;
        state.keys.insert(key.token.clone(), key);
    }

    pub async fn seed_registration(&self, registration: TeamRegistration) {
        let mut state = self.state.write().await;
        state.registrations.insert(registration.team_id.0.clone(), registration);
    }
}

#[async_trait::async_trait]
impl RegistrationStore for InMemoryRegistrationStore {
    async fn find_registration(
        &self,
        team_id: &TeamId,
    ) -> Result<Option<TeamRegistration>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.registrations.get(&team_id.0).cloned())
    }

    async fn redeem_key(
        &self,
        token: &str,
        team_id: &TeamId,
        now: DateTime<Utc>,
    ) -> Result<RedemptionResult, RepositoryError> {
        // The write lock spans check and consume, so redemption stays atomic.
        let mut state = self.state.write().await;

        let key = match state.keys.get_mut(token) {
            Some(key) => key,
            None => return Ok(RedemptionResult::KeyNotFound),
        };

        if key.is_expired(now) {
            return Ok(RedemptionResult::KeyExpired);
        }
        if key.consumed {
            return Ok(RedemptionResult::KeyAlreadyConsumed);
        }

        key.consumed = true;
        let tenant_id = key.tenant_id.clone();
        let credential_ref = key.credential_ref.clone();

        let registration =
            TeamRegistration { team_id: team_id.clone(), tenant_id, credential_ref, registered_at: now };
        state.registrations.insert(team_id.0.clone(), registration.clone());

        Ok(RedemptionResult::Registered(registration))
    }
}

#[derive(Default)]
pub struct InMemoryChannelConfigStore {
    channels: RwLock<HashMap<String, ChannelConfig>>,
}

impl InMemoryChannelConfigStore {
    pub async fn seed_channel(&self, config: ChannelConfig) {
        let mut channels = self.channels.write().await;
        channels.insert(config.channel_id.0.clone(), config);
    }
}

#[async_trait::async_trait]
impl ChannelConfigStore for InMemoryChannelConfigStore {
    async fn find_channel(
        &self,
        channel_id: &ChannelId,
    ) -> Result<Option<ChannelConfig>, RepositoryError> {
        let channels = self.channels.read().await;
        Ok(channels.get(&channel_id.0).cloned())
    }

    async fn register_channels(
        &self,
        team_id: &TeamId,
        channel_ids: &[ChannelId],
    ) -> Result<ChannelSyncReport, RepositoryError> {
        let mut channels = self.channels.write().await;
        let mut report = ChannelSyncReport::default();

        for channel_id in channel_ids {
            if channels.contains_key(&channel_id.0) {
                report.already_known += 1;
                continue;
            }

            channels.insert(
                channel_id.0.clone(),
                ChannelConfig {
                    channel_id: channel_id.clone(),
                    team_id: team_id.clone(),
                    enabled: false,
                    response_mode: ResponseMode::MentionOnly,
                },
            );
            report.added += 1;
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use mattergate_core::domain::channel::{ChannelConfig, ChannelId, ChannelSyncReport, ResponseMode};
    use mattergate_core::domain::registration::{RedemptionResult, RegistrationKey, TeamId, TenantId};

    use crate::repositories::{
        ChannelConfigStore, InMemoryChannelConfigStore, InMemoryRegistrationStore,
        RegistrationStore,
    };

    #[tokio::test]
    async fn in_memory_redemption_consumes_the_key() {
        let store = InMemoryRegistrationStore::default();
        let now = Utc::now();
        store
            .seed_key(RegistrationKey {
                token: "ABC123".to_string(),
                tenant_id: TenantId("tenant-a".to_string()),
                credential_ref: "cred-a".to_string(),
                expires_at: now + Duration::hours(1),
                consumed: false,
            })
            .await;

        let team = TeamId("team-1".to_string());
        let first = store.redeem_key("ABC123", &team, now).await.expect("first redeem");
        assert!(matches!(first, RedemptionResult::Registered(_)));

        let found = store.find_registration(&team).await.expect("find registration");
        assert!(found.is_some());

        let second = store.redeem_key("ABC123", &team, now).await.expect("second redeem");
        assert_eq!(second, RedemptionResult::KeyAlreadyConsumed);
    }

    #[tokio::test]
    async fn in_memory_sync_counts_added_and_known() {
        let store = InMemoryChannelConfigStore::default();
        let team = TeamId("team-1".to_string());
        store
            .seed_channel(ChannelConfig {
                channel_id: ChannelId("chan-1".to_string()),
                team_id: team.clone(),
                enabled: true,
                response_mode: ResponseMode::AllMessages,
            })
            .await;

        let report = store
            .register_channels(
                &team,
                &[ChannelId("chan-1".to_string()), ChannelId("chan-2".to_string())],
            )
            .await
            .expect("sync channels");

        assert_eq!(report, ChannelSyncReport { added: 1, already_known: 1 });

        let untouched = store
            .find_channel(&ChannelId("chan-1".to_string()))
            .await
            .expect("find channel")
            .expect("row should exist");
        assert!(untouched.enabled);
    }
}
