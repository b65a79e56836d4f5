use sqlx::{sqlite::SqliteRow, Row};

use mattergate_core::domain::channel::{ChannelConfig, ChannelId, ChannelSyncReport, ResponseMode};
use mattergate_core::domain::registration::TeamId;

use super::{ChannelConfigStore, RepositoryError};
use crate::DbPool;

pub struct SqlChannelConfigStore {
    pool: DbPool,
}

impl SqlChannelConfigStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ChannelConfigStore for SqlChannelConfigStore {
    async fn find_channel(
        &self,
        channel_id: &ChannelId,
    ) -> Result<Option<ChannelConfig>, RepositoryError> {
        let row = sqlx::query(
            "SELECT
                channel_id,
                team_id,
                enabled,
                response_mode
             FROM channel_configuration
             WHERE channel_id = ?",
        )
        .bind(&channel_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(channel_from_row).transpose()
    }

    async fn register_channels(
        &self,
        team_id: &TeamId,
        channel_ids: &[ChannelId],
    ) -> Result<ChannelSyncReport, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let mut report = ChannelSyncReport::default();

        for channel_id in channel_ids {
            let inserted = sqlx::query(
                "INSERT INTO channel_configuration (channel_id, team_id, enabled, response_mode)
                 VALUES (?, ?, 0, 'mention_only')
                 ON CONFLICT(channel_id) DO NOTHING",
            )
            .bind(&channel_id.0)
            .bind(&team_id.0)
            .execute(&mut *tx)
            .await?;

            if inserted.rows_affected() == 0 {
                report.already_known += 1;
            } else {
                report.added += 1;
            }
        }

        tx.commit().await?;
        Ok(report)
    }
}

fn channel_from_row(row: SqliteRow) -> Result<ChannelConfig, RepositoryError> {
    let mode_raw = row.try_get::<String, _>("response_mode")?;
    let response_mode = ResponseMode::parse(&mode_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown response mode `{mode_raw}`")))?;

    Ok(ChannelConfig {
        channel_id: ChannelId(row.try_get("channel_id")?),
        team_id: TeamId(row.try_get("team_id")?),
        enabled: row.try_get::<i64, _>("enabled")? != 0,
        response_mode,
    })
}

#[cfg(test)]
mod tests {
    use mattergate_core::domain::channel::{ChannelId, ChannelSyncReport, ResponseMode};
    use mattergate_core::domain::registration::TeamId;

    use super::SqlChannelConfigStore;
    use crate::fixtures;
    use crate::repositories::ChannelConfigStore;
    use crate::{connect_with_settings, DbPool};

    #[tokio::test]
    async fn missing_channel_rows_read_as_none() {
        let pool = setup_pool().await;
        let store = SqlChannelConfigStore::new(pool.clone());

        let found =
            store.find_channel(&ChannelId("chan-none".to_string())).await.expect("find channel");
        assert_eq!(found, None);

        pool.close().await;
    }

    #[tokio::test]
    async fn sync_inserts_defaults_and_counts_known_channels() {
        let pool = setup_pool().await;
        seed_channel(&pool, "chan-1", "team-1", true, "all_messages").await;

        let store = SqlChannelConfigStore::new(pool.clone());
        let team = TeamId("team-1".to_string());
        let channels = [ChannelId("chan-1".to_string()), ChannelId("chan-2".to_string())];

        let report = store.register_channels(&team, &channels).await.expect("sync channels");
        assert_eq!(report, ChannelSyncReport { added: 1, already_known: 1 });

        // The pre-existing row keeps its operator-set configuration.
        let existing = store
            .find_channel(&ChannelId("chan-1".to_string()))
            .await
            .expect("find existing")
            .expect("row should exist");
        assert!(existing.enabled);
        assert_eq!(existing.response_mode, ResponseMode::AllMessages);

        let added = store
            .find_channel(&ChannelId("chan-2".to_string()))
            .await
            .expect("find added")
            .expect("row should exist");
        assert!(!added.enabled);
        assert_eq!(added.response_mode, ResponseMode::MentionOnly);

        pool.close().await;
    }

    #[tokio::test]
    async fn sync_never_prunes_channels_absent_upstream() {
        let pool = setup_pool().await;
        seed_channel(&pool, "chan-old", "team-1", false, "mention_only").await;

        let store = SqlChannelConfigStore::new(pool.clone());
        let team = TeamId("team-1".to_string());

        store
            .register_channels(&team, &[ChannelId("chan-new".to_string())])
            .await
            .expect("sync channels");

        let kept =
            store.find_channel(&ChannelId("chan-old".to_string())).await.expect("find old channel");
        assert!(kept.is_some());

        pool.close().await;
    }

    // A single-connection pool keeps one private in-memory database alive
    // for the whole test, isolated from every other test in the binary.
    async fn setup_pool() -> DbPool {
        let pool =
            connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect test pool");
        fixtures::apply_schema(&pool).await.expect("apply schema");
        pool
    }

    async fn seed_channel(pool: &DbPool, channel: &str, team: &str, enabled: bool, mode: &str) {
        sqlx::query(
            "INSERT INTO channel_configuration (channel_id, team_id, enabled, response_mode)
             VALUES (?, ?, ?, ?)",
        )
        .bind(channel)
        .bind(team)
        .bind(i64::from(enabled))
        .bind(mode)
        .execute(pool)
        .await
        .expect("seed channel");
    }
}
