use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;

use mattergate_core::{TeamId, TenantContext};
use mattergate_db::repositories::{RegistrationStore, RepositoryError};

/// What a team id resolves to. Absence is cached like presence, so unregistered
/// teams do not hammer the store on every message.
#[derive(Clone, Debug)]
pub enum Resolution {
    Tenant(TenantContext),
    NotRegistered,
}

struct CacheSlot {
    resolution: Resolution,
    cached_at: Instant,
}

/// Read-through cache over the registration store. `invalidate` makes a new
/// registration visible immediately instead of after the TTL.
pub struct TenantCache {
    store: Arc<dyn RegistrationStore>,
    ttl: Duration,
    epoch: AtomicU64,
    entries: RwLock<HashMap<TeamId, CacheSlot>>,
}

impl TenantCache {
    pub fn new(store: Arc<dyn RegistrationStore>, ttl: Duration) -> Self {
        Self { store, ttl, epoch: AtomicU64::new(0), entries: RwLock::new(HashMap::new()) }
    }

    pub async fn resolve(&self, team_id: &TeamId) -> Result<Resolution, RepositoryError> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            if let Some(slot) = entries.get(team_id) {
                if now.duration_since(slot.cached_at) < self.ttl {
                    return Ok(slot.resolution.clone());
                }
            }
        }

        let epoch_before = self.epoch.load(Ordering::SeqCst);
        let resolution = match self.store.find_registration(team_id).await? {
            Some(registration) => Resolution::Tenant(TenantContext::from_registration(&registration)),
            None => Resolution::NotRegistered,
        };

        // A load that raced an invalidation stays uncached; the next resolve
        // reads the store again and sees the fresh row.
        if self.epoch.load(Ordering::SeqCst) == epoch_before {
            let mut entries = self.entries.write().await;
            entries.insert(
                team_id.clone(),
                CacheSlot { resolution: resolution.clone(), cached_at: now },
            );
        }

        Ok(resolution)
    }

    pub async fn invalidate(&self, team_id: &TeamId) {
        // Bump before removing so an in-flight load can't re-insert the stale
        // row after the remove.
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.entries.write().await.remove(team_id);
    }
}
