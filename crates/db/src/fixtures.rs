use crate::connection::DbPool;
use crate::repositories::RepositoryError;

/// Table shapes the gateway consumes. The schema is owned by the admin backend
/// and its migration tooling; this provisions the same shape for tests and
/// local runs, so it must stay in sync with that contract.
const SCHEMA_STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS team_registration (
        team_id TEXT PRIMARY KEY,
        tenant_id TEXT NOT NULL,
        credential_ref TEXT NOT NULL,
        registered_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS registration_key (
        token TEXT PRIMARY KEY,
        tenant_id TEXT NOT NULL,
        credential_ref TEXT NOT NULL,
        expires_at TEXT NOT NULL,
        consumed INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE TABLE IF NOT EXISTS channel_configuration (
        channel_id TEXT PRIMARY KEY,
        team_id TEXT NOT NULL,
        enabled INTEGER NOT NULL DEFAULT 0,
        response_mode TEXT NOT NULL DEFAULT 'mention_only'
    )",
    "CREATE INDEX IF NOT EXISTS idx_channel_configuration_team
        ON channel_configuration (team_id)",
];

pub async fn apply_schema(pool: &DbPool) -> Result<(), RepositoryError> {
    let mut tx = pool.begin().await?;

    for statement in SCHEMA_STATEMENTS {
        sqlx::query(statement).execute(&mut *tx).await?;
    }

    tx.commit().await?;
    Ok(())
}
