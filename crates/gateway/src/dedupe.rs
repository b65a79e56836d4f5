use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use mattergate_core::PostId;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Observation {
    FirstTime,
    AlreadySeen,
}

/// Bounded set of recently seen message ids. The platform delivers at least
/// once, so re-delivered events (reconnect replays, edits of a handled post)
/// must be recognized and discarded before they reach command or policy logic.
pub struct DedupeGuard {
    ttl: Duration,
    capacity: usize,
    state: Mutex<DedupeState>,
}

#[derive(Default)]
struct DedupeState {
    seen: HashSet<String>,
    order: VecDeque<(String, Instant)>,
}

impl DedupeState {
    fn evict_expired(&mut self, now: Instant, ttl: Duration) {
        while self.order.front().is_some_and(|(_, seen_at)| now.duration_since(*seen_at) >= ttl) {
            if let Some((expired, _)) = self.order.pop_front() {
                self.seen.remove(&expired);
            }
        }
    }
}

impl DedupeGuard {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self { ttl, capacity, state: Mutex::new(DedupeState::default()) }
    }

    pub async fn observe(&self, message_id: &PostId) -> Observation {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        state.evict_expired(now, self.ttl);

        if state.seen.contains(&message_id.0) {
            return Observation::AlreadySeen;
        }
        if state.seen.len() >= self.capacity {
            // Insertion order doubles as age order; the oldest id leaves first.
            if let Some((oldest, _)) = state.order.pop_front() {
                state.seen.remove(&oldest);
            }
        }
        state.seen.insert(message_id.0.clone());
        state.order.push_back((message_id.0.clone(), now));
        Observation::FirstTime
    }
}
