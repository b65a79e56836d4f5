use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TeamId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(pub String);

/// The binding between an external team and an internal tenant. One active row
/// per team; re-registration replaces it wholesale.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamRegistration {
    pub team_id: TeamId,
    pub tenant_id: TenantId,
    pub credential_ref: String,
    pub registered_at: DateTime<Utc>,
}

/// One-shot token provisioned by an administrator. Carries the backend
/// credential reference that redemption copies into the registration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationKey {
    pub token: String,
    pub tenant_id: TenantId,
    pub credential_ref: String,
    pub expires_at: DateTime<Utc>,
    pub consumed: bool,
}

impl RegistrationKey {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Outcome of an atomic key redemption. Infrastructure failures are reported
/// separately; these are the domain-level verdicts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RedemptionResult {
    Registered(TeamRegistration),
    KeyNotFound,
    KeyExpired,
    KeyAlreadyConsumed,
}

/// What the rest of the gateway needs to act on behalf of a team: the tenant
/// identity and the credential presented to the answer service.
#[derive(Clone, Debug)]
pub struct TenantContext {
    pub tenant_id: TenantId,
    pub credential: SecretString,
}

impl TenantContext {
    pub fn from_registration(registration: &TeamRegistration) -> Self {
        Self {
            tenant_id: registration.tenant_id.clone(),
            credential: registration.credential_ref.clone().into(),
        }
    }
}
