use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::info;

use mattergate_backend::{AnswerError, HttpAnswerClient};
use mattergate_core::config::{AppConfig, ConfigError, LoadOptions};
use mattergate_db::repositories::{
    ChannelConfigStore, RegistrationStore, SqlChannelConfigStore, SqlRegistrationStore,
};
use mattergate_db::{connect_from_config, DbPool};
use mattergate_gateway::commands::CommandExecutor;
use mattergate_gateway::dedupe::DedupeGuard;
use mattergate_gateway::pipeline::{Origin, Pipeline};
use mattergate_gateway::respond::Responder;
use mattergate_gateway::sessions::ConversationTracker;
use mattergate_gateway::tenants::TenantCache;
use mattergate_mattermost::client::{ApiError, HttpPlatformClient, PlatformClient};
use mattergate_mattermost::socket::{ReconnectPolicy, StreamRunner};
use mattergate_mattermost::ws::WebSocketEventSource;

/// Tables the gateway reads and writes. The admin backend owns the schema;
/// bootstrap only verifies it has been provisioned.
const REQUIRED_TABLES: &[&str] = &["team_registration", "registration_key", "channel_configuration"];

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pipeline: Pipeline,
    runners: Vec<JoinHandle<()>>,
}

impl Application {
    /// Stops ingestion first, then drains queued work up to the configured
    /// grace period. Work still in flight at the deadline is abandoned.
    pub async fn shutdown(self) {
        for runner in &self.runners {
            runner.abort();
        }
        for runner in self.runners {
            let _ = runner.await;
        }

        let grace = Duration::from_secs(self.config.server.graceful_shutdown_secs);
        self.pipeline.shutdown(grace).await;
        self.db_pool.close().await;
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("schema probe failed: {0}")]
    SchemaProbe(#[source] sqlx::Error),
    #[error("required table `{table}` is missing; provision the schema with the admin tooling")]
    SchemaMissing { table: String },
    #[error("backend client setup failed: {0}")]
    Backend(#[source] AnswerError),
    #[error("mattermost server `{server}` client setup failed: {source}")]
    Platform {
        server: String,
        #[source]
        source: ApiError,
    },
    #[error("mattermost server `{server}` rejected the bot token: {source}")]
    Authentication {
        server: String,
        #[source]
        source: ApiError,
    },
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting gateway bootstrap");

    let db_pool =
        connect_from_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        "database connection established"
    );

    verify_schema(&db_pool).await?;
    info!(event_name = "system.bootstrap.schema_verified", "required tables present");

    let registrations: Arc<dyn RegistrationStore> =
        Arc::new(SqlRegistrationStore::new(db_pool.clone()));
    let channels: Arc<dyn ChannelConfigStore> =
        Arc::new(SqlChannelConfigStore::new(db_pool.clone()));

    let tenants = Arc::new(TenantCache::new(
        registrations.clone(),
        Duration::from_secs(config.gateway.tenant_cache_ttl_secs),
    ));
    let sessions = Arc::new(ConversationTracker::new(
        Duration::from_secs(config.gateway.session_idle_secs),
        config.gateway.session_capacity,
    ));
    let dedupe = Arc::new(DedupeGuard::new(
        Duration::from_secs(config.gateway.dedupe_ttl_secs),
        config.gateway.dedupe_capacity,
    ));
    let answers = Arc::new(
        HttpAnswerClient::new(
            &config.backend.base_url,
            Duration::from_secs(config.backend.timeout_secs),
        )
        .map_err(BootstrapError::Backend)?,
    );

    let executor =
        Arc::new(CommandExecutor::new(registrations, channels.clone(), tenants.clone()));
    let responder = Arc::new(Responder::new(
        channels,
        tenants,
        sessions,
        answers,
        config.backend.max_in_flight_per_tenant as usize,
        Duration::from_secs(config.backend.retry_backoff_secs),
    ));

    // Each configured server gets its own REST client and identity check. A
    // rejected token stops bootstrap here rather than at the first reply.
    let ping_interval = Duration::from_secs(config.mattermost.ping_interval_secs);
    let mut origins = Vec::new();
    let mut sources = Vec::new();
    for server in &config.mattermost.servers {
        let platform = Arc::new(
            HttpPlatformClient::new(&server.url, server.bot_token.clone()).map_err(|source| {
                BootstrapError::Platform { server: server.name.clone(), source }
            })?,
        );
        let identity = platform.current_user().await.map_err(|source| {
            BootstrapError::Authentication { server: server.name.clone(), source }
        })?;
        info!(
            event_name = "system.bootstrap.identity_verified",
            server = %server.name,
            username = %identity.username,
            "bot identity verified"
        );

        origins.push(Origin {
            server: server.name.clone(),
            platform,
            bot_user_id: identity.user_id,
        });
        sources.push((
            server.name.clone(),
            WebSocketEventSource::new(server.url.clone(), server.bot_token.clone(), ping_interval),
        ));
    }

    let pipeline = Pipeline::spawn(origins, dedupe, executor, responder, &config.gateway);

    let reconnect_policy = ReconnectPolicy {
        base_delay_ms: config.mattermost.reconnect_base_delay_ms,
        max_delay_ms: config.mattermost.reconnect_max_delay_ms,
    };
    let mut runners = Vec::new();
    for (name, source) in sources {
        let runner = StreamRunner::new(
            name,
            Arc::new(source),
            pipeline.handle(),
            reconnect_policy.clone(),
        );
        runners.push(tokio::spawn(async move { runner.start().await }));
    }

    info!(
        event_name = "system.bootstrap.complete",
        servers = config.mattermost.servers.len(),
        "gateway bootstrap complete"
    );

    Ok(Application { config, db_pool, pipeline, runners })
}

async fn verify_schema(pool: &DbPool) -> Result<(), BootstrapError> {
    for table in REQUIRED_TABLES {
        let found: Option<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?",
        )
        .bind(table)
        .fetch_optional(pool)
        .await
        .map_err(BootstrapError::SchemaProbe)?;

        if found.is_none() {
            return Err(BootstrapError::SchemaMissing { table: (*table).to_string() });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use mattergate_core::config::{ConfigOverrides, LoadOptions};
    use mattergate_db::{apply_schema, connect_with_settings};

    use crate::bootstrap::{bootstrap, verify_schema, BootstrapError};

    fn overrides(database_url: &str) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(database_url.to_string()),
                backend_base_url: Some("https://answers.example.com".to_string()),
                mattermost_server_url: Some("https://chat.example.com".to_string()),
                mattermost_bot_token: Some("test-token".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_without_a_bot_token() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                backend_base_url: Some("https://answers.example.com".to_string()),
                mattermost_server_url: Some("https://chat.example.com".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;

        let message = result.err().expect("bootstrap should fail").to_string();
        assert!(message.contains("bot_token"), "got: {message}");
    }

    #[tokio::test]
    async fn bootstrap_refuses_an_unprovisioned_database() {
        let result = bootstrap(overrides("sqlite::memory:")).await;

        match result {
            Err(BootstrapError::SchemaMissing { table }) => {
                assert_eq!(table, "team_registration");
            }
            other => panic!("expected a schema error, got {:?}", other.err().map(|e| e.to_string())),
        }
    }

    #[tokio::test]
    async fn the_schema_probe_accepts_a_provisioned_database() {
        let pool =
            connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool should connect");
        apply_schema(&pool).await.expect("schema should apply");

        verify_schema(&pool).await.expect("probe should pass");

        pool.close().await;
    }

    #[tokio::test]
    async fn the_schema_probe_names_the_first_missing_table() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5)
            .await
            .expect("pool should connect");

        let error = verify_schema(&pool).await.expect_err("nothing is provisioned");
        assert!(error.to_string().contains("team_registration"), "got: {error}");

        pool.close().await;
    }
}
