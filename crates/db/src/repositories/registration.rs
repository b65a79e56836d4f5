use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use mattergate_core::domain::registration::{
    RedemptionResult, RegistrationKey, TeamId, TeamRegistration, TenantId,
};

use super::{RegistrationStore, RepositoryError};
use crate::DbPool;

pub struct SqlRegistrationStore {
    pool: DbPool,
}

impl SqlRegistrationStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl RegistrationStore for SqlRegistrationStore {
    async fn find_registration(
        &self,
        team_id: &TeamId,
    ) -> Result<Option<TeamRegistration>, RepositoryError> {
        let row = sqlx::query(
            "SELECT
                team_id,
                tenant_id,
                credential_ref,
                registered_at
             FROM team_registration
             WHERE team_id = ?",
        )
        .bind(&team_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(registration_from_row).transpose()
    }

    async fn redeem_key(
        &self,
        token: &str,
        team_id: &TeamId,
        now: DateTime<Utc>,
    ) -> Result<RedemptionResult, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            "SELECT
                token,
                tenant_id,
                credential_ref,
                expires_at,
                consumed
             FROM registration_key
             WHERE token = ?",
        )
        .bind(token)
        .fetch_optional(&mut *tx)
        .await?;

        // Early returns drop the transaction, rolling back untouched state.
        let key = match row {
            Some(row) => key_from_row(row)?,
            None => return Ok(RedemptionResult::KeyNotFound),
        };

        if key.is_expired(now) {
            return Ok(RedemptionResult::KeyExpired);
        }
        if key.consumed {
            return Ok(RedemptionResult::KeyAlreadyConsumed);
        }

        // The consumed guard covers a redemption that committed between the
        // read above and this write; losing that race reports AlreadyConsumed.
        let consume = sqlx::query(
            "UPDATE registration_key
             SET consumed = 1
             WHERE token = ? AND consumed = 0",
        )
        .bind(token)
        .execute(&mut *tx)
        .await?;

        if consume.rows_affected() == 0 {
            return Ok(RedemptionResult::KeyAlreadyConsumed);
        }

        let registration = TeamRegistration {
            team_id: team_id.clone(),
            tenant_id: key.tenant_id,
            credential_ref: key.credential_ref,
            registered_at: now,
        };

        sqlx::query(
            "INSERT INTO team_registration (
                team_id,
                tenant_id,
                credential_ref,
                registered_at
             ) VALUES (?, ?, ?, ?)
             ON CONFLICT(team_id) DO UPDATE SET
                tenant_id = excluded.tenant_id,
                credential_ref = excluded.credential_ref,
                registered_at = excluded.registered_at",
        )
        .bind(&registration.team_id.0)
        .bind(&registration.tenant_id.0)
        .bind(&registration.credential_ref)
        .bind(registration.registered_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(RedemptionResult::Registered(registration))
    }
}

fn registration_from_row(row: SqliteRow) -> Result<TeamRegistration, RepositoryError> {
    Ok(TeamRegistration {
        team_id: TeamId(row.try_get("team_id")?),
        tenant_id: TenantId(row.try_get("tenant_id")?),
        credential_ref: row.try_get("credential_ref")?,
        registered_at: parse_timestamp("registered_at", row.try_get("registered_at")?)?,
    })
}

fn key_from_row(row: SqliteRow) -> Result<RegistrationKey, RepositoryError> {
    Ok(RegistrationKey {
        token: row.try_get("token")?,
        tenant_id: TenantId(row.try_get("tenant_id")?),
        credential_ref: row.try_get("credential_ref")?,
        expires_at: parse_timestamp("expires_at", row.try_get("expires_at")?)?,
        consumed: row.try_get::<i64, _>("consumed")? != 0,
    })
}

fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}
