//! Event Processing - dedupe, policy, tenancy and the answer pipeline
//!
//! This crate turns decoded platform events into replies:
//!
//! - `pipeline`: bounded router fanning out to per-channel workers
//! - `dedupe`: TTL suppression of re-delivered event ids
//! - `commands`: `!register` / `!sync-channels` parsing and execution
//! - `policy`: pure respond-or-skip decision per message
//! - `tenants`: read-through cache over team registrations
//! - `sessions`: thread-root to backend-session mapping
//! - `respond`: backend call, retry, chunked publishing
//!
//! # Architecture
//!
//! ```text
//! StreamRunner (per server)
//!        |
//!        v  deliver(server, message)
//! PipelineHandle ──> router ──> per-channel worker
//!                     |                |
//!                  DedupeGuard      classify
//!                                      |
//!                     +────────────────+───────────────+
//!                     |                                |
//!              CommandExecutor                    Responder
//!              (stores, cache)        (policy -> tenants -> sessions
//!                                      -> backend -> publisher)
//! ```
//!
//! # Key Types
//!
//! - [`pipeline::Pipeline`] / [`pipeline::Origin`] - wiring and shutdown
//! - [`dedupe::DedupeGuard`] - at-least-once delivery absorber
//! - [`commands::CommandExecutor`] - control-command side effects
//! - [`tenants::TenantCache`] - team-to-tenant resolution
//! - [`respond::Responder`] - conversational answering

pub mod commands;
pub mod dedupe;
pub mod pipeline;
pub mod policy;
pub mod respond;
pub mod sessions;
pub mod tenants;
