//! Backend answer-service client
//!
//! One HTTP surface: send a message (plus an optional session id) under a
//! tenant's credential, get back `{session_id, answer_text}`. The service is
//! opaque to the gateway; thread history lives behind the session id, not here.

pub mod client;

pub use client::{
    answer_with_retry, AnswerClient, AnswerError, AnswerReply, AnswerRequest, HttpAnswerClient,
};
