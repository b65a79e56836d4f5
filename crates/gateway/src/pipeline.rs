use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, warn};

use mattergate_core::config::GatewayConfig;
use mattergate_core::{NormalizedMessage, UserId};
use mattergate_mattermost::client::PlatformClient;
use mattergate_mattermost::socket::{EventSink, SinkClosed};

use crate::commands::{classify, command_failure_message, CommandExecutor, MessageKind};
use crate::dedupe::{DedupeGuard, Observation};
use crate::respond::Responder;

/// One configured Mattermost server: its REST surface and the identity the
/// gateway's bot account holds there.
pub struct Origin {
    pub server: String,
    pub platform: Arc<dyn PlatformClient>,
    pub bot_user_id: UserId,
}

struct Job {
    origin: Arc<Origin>,
    message: NormalizedMessage,
}

/// Where stream runners deliver decoded messages. Tags each message with its
/// origin and feeds the shared bounded queue; a full queue backpressures the
/// runner instead of dropping.
pub struct PipelineHandle {
    origins: HashMap<String, Arc<Origin>>,
    input: mpsc::Sender<Job>,
}

#[async_trait]
impl EventSink for PipelineHandle {
    async fn deliver(
        &self,
        server: &str,
        message: NormalizedMessage,
    ) -> Result<(), SinkClosed> {
        let Some(origin) = self.origins.get(server) else {
            warn!(
                event_name = "gateway.pipeline.unknown_origin",
                server, "message from an unconfigured server dropped"
            );
            return Ok(());
        };
        self.input
            .send(Job { origin: origin.clone(), message })
            .await
            .map_err(|_| SinkClosed)
    }
}

struct Stages {
    dedupe: Arc<DedupeGuard>,
    executor: Arc<CommandExecutor>,
    responder: Arc<Responder>,
    channel_queue_capacity: usize,
}

/// The processing pipeline: one router task fanning out to one worker task per
/// channel. The per-channel worker serializes processing, so replies in a
/// channel keep arrival order while distinct channels progress independently.
pub struct Pipeline {
    handle: Arc<PipelineHandle>,
    router: JoinHandle<()>,
}

impl Pipeline {
    pub fn spawn(
        origins: Vec<Origin>,
        dedupe: Arc<DedupeGuard>,
        executor: Arc<CommandExecutor>,
        responder: Arc<Responder>,
        config: &GatewayConfig,
    ) -> Self {
        let (input, jobs) = mpsc::channel(config.queue_capacity);
        let origins = origins
            .into_iter()
            .map(|origin| (origin.server.clone(), Arc::new(origin)))
            .collect();
        let stages = Arc::new(Stages {
            dedupe,
            executor,
            responder,
            channel_queue_capacity: config.channel_queue_capacity,
        });
        let router = tokio::spawn(route(jobs, stages));
        Self { handle: Arc::new(PipelineHandle { origins, input }), router }
    }

    pub fn handle(&self) -> Arc<PipelineHandle> {
        self.handle.clone()
    }

    /// Closes the input and drains queued work. Work still unfinished at the
    /// deadline is abandoned.
    pub async fn shutdown(mut self, grace: Duration) {
        drop(self.handle);
        if tokio::time::timeout(grace, &mut self.router).await.is_err() {
            warn!(
                event_name = "system.shutdown.drain_timeout",
                "drain deadline passed; abandoning in-flight work"
            );
            self.router.abort();
        }
    }
}

async fn route(mut jobs: mpsc::Receiver<Job>, stages: Arc<Stages>) {
    let mut workers: HashMap<String, mpsc::Sender<Job>> = HashMap::new();
    let mut tasks = JoinSet::new();

    while let Some(job) = jobs.recv().await {
        if stages.dedupe.observe(&job.message.message_id).await == Observation::AlreadySeen {
            debug!(
                event_name = "gateway.dedupe.suppressed",
                message_id = %job.message.message_id.0,
                "duplicate event suppressed"
            );
            continue;
        }
        if job.message.author_id == job.origin.bot_user_id {
            debug!(
                event_name = "gateway.pipeline.self_authored",
                message_id = %job.message.message_id.0,
                "own post skipped"
            );
            continue;
        }
        if job.message.text.trim().is_empty() {
            debug!(
                event_name = "gateway.pipeline.empty_message",
                message_id = %job.message.message_id.0,
                "empty message skipped"
            );
            continue;
        }

        let key = job.message.channel_id.0.clone();
        let sender = workers.entry(key.clone()).or_insert_with(|| {
            let (tx, rx) = mpsc::channel(stages.channel_queue_capacity);
            tasks.spawn(channel_worker(rx, stages.clone()));
            tx
        });
        if sender.send(job).await.is_err() {
            // Only a panicked worker closes its queue; forget it and let the
            // channel's next message spawn a replacement.
            workers.remove(&key);
        }
    }

    // Input closed: dropping the senders lets each worker drain and finish.
    drop(workers);
    while tasks.join_next().await.is_some() {}
}

async fn channel_worker(mut jobs: mpsc::Receiver<Job>, stages: Arc<Stages>) {
    while let Some(job) = jobs.recv().await {
        handle_message(&job, &stages).await;
    }
}

async fn handle_message(job: &Job, stages: &Stages) {
    let message = &job.message;
    match classify(&message.text) {
        MessageKind::Command(command) => {
            let reply = match stages
                .executor
                .execute(job.origin.platform.as_ref(), message, &command)
                .await
            {
                Ok(reply) => reply,
                Err(error) => {
                    warn!(
                        event_name = "gateway.command.failed",
                        message_id = %message.message_id.0,
                        error = %error,
                        "command execution failed"
                    );
                    command_failure_message()
                }
            };
            post_reply(job, &reply).await;
        }
        MessageKind::InvalidCommand(error) => {
            post_reply(job, &error.user_reply()).await;
        }
        MessageKind::Conversational => {
            stages
                .responder
                .respond(job.origin.platform.as_ref(), &job.origin.bot_user_id, message)
                .await;
        }
    }
}

async fn post_reply(job: &Job, reply: &str) {
    let message = &job.message;
    if let Err(error) = job
        .origin
        .platform
        .create_post(&message.channel_id, reply, Some(message.thread_root()))
        .await
    {
        warn!(
            event_name = "egress.mattermost.post_failed",
            channel_id = %message.channel_id.0,
            error = %error,
            "posting the command reply failed"
        );
    }
}
