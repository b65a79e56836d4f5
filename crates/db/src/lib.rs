pub mod connection;
pub mod fixtures;
pub mod repositories;

pub use connection::{connect, connect_from_config, connect_with_settings, DbPool};
pub use fixtures::apply_schema;
