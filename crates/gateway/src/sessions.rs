use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use mattergate_core::{PostId, SessionId};

struct Mapping {
    session_id: SessionId,
    last_activity_at: Instant,
}

/// Maps thread roots to backend sessions. The backend owns conversational
/// continuity; the gateway only remembers which session a thread belongs to,
/// for as long as the thread stays active.
pub struct ConversationTracker {
    idle_window: Duration,
    capacity: usize,
    state: Mutex<HashMap<String, Mapping>>,
}

impl ConversationTracker {
    pub fn new(idle_window: Duration, capacity: usize) -> Self {
        Self { idle_window, capacity, state: Mutex::new(HashMap::new()) }
    }

    /// Session mapped to this thread root, if the thread is still active.
    /// A hit counts as activity and extends the idle window.
    pub async fn resolve(&self, root: &PostId) -> Option<SessionId> {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        match state.get_mut(&root.0) {
            Some(mapping) if now.duration_since(mapping.last_activity_at) < self.idle_window => {
                mapping.last_activity_at = now;
                Some(mapping.session_id.clone())
            }
            Some(_) => {
                state.remove(&root.0);
                None
            }
            None => None,
        }
    }

    pub async fn record(&self, root: &PostId, session_id: SessionId) {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        state.retain(|_, mapping| now.duration_since(mapping.last_activity_at) < self.idle_window);

        if !state.contains_key(&root.0) && state.len() >= self.capacity {
            // The least recently active thread leaves; its next reply simply
            // mints a fresh session.
            let oldest = state
                .iter()
                .min_by_key(|(_, mapping)| mapping.last_activity_at)
                .map(|(root, _)| root.clone());
            if let Some(oldest) = oldest {
                state.remove(&oldest);
            }
        }

        state.insert(root.0.clone(), Mapping { session_id, last_activity_at: now });
    }
}
