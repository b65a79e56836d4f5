use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info, warn};

use mattergate_backend::{answer_with_retry, AnswerClient, AnswerRequest};
use mattergate_core::{NormalizedMessage, TenantId, UserId};
use mattergate_db::repositories::ChannelConfigStore;
use mattergate_mattermost::client::{split_message, PlatformClient};

use crate::policy::{decide, Decision};
use crate::sessions::ConversationTracker;
use crate::tenants::{Resolution, TenantCache};

/// Caps concurrent backend calls per tenant. Waiters queue on the tenant's
/// semaphore, so a burst in one team never starves another tenant's budget.
struct AdmissionControl {
    max_in_flight: usize,
    gates: Mutex<HashMap<TenantId, Arc<Semaphore>>>,
}

impl AdmissionControl {
    fn new(max_in_flight: usize) -> Self {
        Self { max_in_flight, gates: Mutex::new(HashMap::new()) }
    }

    async fn gate(&self, tenant_id: &TenantId) -> Arc<Semaphore> {
        let mut gates = self.gates.lock().await;
        gates
            .entry(tenant_id.clone())
            .or_insert_with(|| Arc::new(Semaphore::new(self.max_in_flight)))
            .clone()
    }
}

/// Text posted when the backend fails twice in a row.
pub fn fallback_message() -> String {
    "Sorry, I couldn't reach the answer service just now. Please try again shortly.".to_owned()
}

/// Drives a conversational message through policy, tenancy, session mapping and
/// the backend, then publishes the answer into the message's thread.
pub struct Responder {
    channels: Arc<dyn ChannelConfigStore>,
    tenants: Arc<TenantCache>,
    sessions: Arc<ConversationTracker>,
    answers: Arc<dyn AnswerClient>,
    admission: AdmissionControl,
    retry_backoff: Duration,
}

impl Responder {
    pub fn new(
        channels: Arc<dyn ChannelConfigStore>,
        tenants: Arc<TenantCache>,
        sessions: Arc<ConversationTracker>,
        answers: Arc<dyn AnswerClient>,
        max_in_flight_per_tenant: usize,
        retry_backoff: Duration,
    ) -> Self {
        Self {
            channels,
            tenants,
            sessions,
            answers,
            admission: AdmissionControl::new(max_in_flight_per_tenant),
            retry_backoff,
        }
    }

    pub async fn respond(
        &self,
        platform: &dyn PlatformClient,
        bot_user_id: &UserId,
        message: &NormalizedMessage,
    ) {
        let channel = match self.channels.find_channel(&message.channel_id).await {
            Ok(channel) => channel,
            Err(error) => {
                warn!(
                    event_name = "gateway.policy.lookup_failed",
                    channel_id = %message.channel_id.0,
                    error = %error,
                    "channel lookup failed; message skipped"
                );
                return;
            }
        };

        match decide(message, channel.as_ref(), bot_user_id) {
            Decision::Skip(reason) => {
                debug!(
                    event_name = "gateway.policy.skipped",
                    message_id = %message.message_id.0,
                    channel_id = %message.channel_id.0,
                    ?reason,
                    "message skipped"
                );
                return;
            }
            Decision::Respond => {}
        }

        let context = match self.tenants.resolve(&message.team_id).await {
            Ok(Resolution::Tenant(context)) => context,
            Ok(Resolution::NotRegistered) => {
                debug!(
                    event_name = "gateway.tenant.unregistered",
                    team_id = %message.team_id.0,
                    "message from unregistered team skipped"
                );
                return;
            }
            Err(error) => {
                warn!(
                    event_name = "gateway.tenant.lookup_failed",
                    team_id = %message.team_id.0,
                    error = %error,
                    "tenant resolution failed; message skipped"
                );
                return;
            }
        };

        let root = message.thread_root().clone();
        let session_id = self.sessions.resolve(&root).await;
        let request = AnswerRequest {
            credential: context.credential.clone(),
            session_id,
            message: message.text.clone(),
        };

        let outcome = {
            let gate = self.admission.gate(&context.tenant_id).await;
            // Holding the Ok keeps the permit; the gate is never closed.
            let _permit = gate.acquire_owned().await;
            answer_with_retry(self.answers.as_ref(), &request, self.retry_backoff).await
        };

        match outcome {
            Ok(reply) => {
                self.sessions.record(&root, reply.session_id.clone()).await;
                info!(
                    event_name = "egress.backend.answered",
                    message_id = %message.message_id.0,
                    session_id = %reply.session_id.0,
                    "backend answered"
                );
                for chunk in split_message(&reply.answer_text) {
                    if let Err(error) =
                        platform.create_post(&message.channel_id, &chunk, Some(&root)).await
                    {
                        warn!(
                            event_name = "egress.mattermost.post_failed",
                            channel_id = %message.channel_id.0,
                            error = %error,
                            "posting the answer failed"
                        );
                        break;
                    }
                }
            }
            Err(error) => {
                warn!(
                    event_name = "egress.backend.failed",
                    message_id = %message.message_id.0,
                    error = %error,
                    "backend failed after retry; posting fallback"
                );
                if let Err(error) =
                    platform.create_post(&message.channel_id, &fallback_message(), Some(&root)).await
                {
                    warn!(
                        event_name = "egress.mattermost.post_failed",
                        channel_id = %message.channel_id.0,
                        error = %error,
                        "posting the fallback failed"
                    );
                }
            }
        }
    }
}
