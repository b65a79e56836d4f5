pub mod channel;
pub mod message;
pub mod registration;
pub mod session;
