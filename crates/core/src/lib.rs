pub mod config;
pub mod domain;

pub use domain::channel::{ChannelConfig, ChannelId, ChannelSyncReport, ResponseMode};
pub use domain::message::{NormalizedMessage, PostId, UserId};
pub use domain::registration::{
    RedemptionResult, RegistrationKey, TeamId, TeamRegistration, TenantContext, TenantId,
};
pub use domain::session::SessionId;
