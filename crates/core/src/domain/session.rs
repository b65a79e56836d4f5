use serde::{Deserialize, Serialize};

/// Opaque backend conversation handle. Minted by the backend on the first
/// message of a thread and replayed on every follow-up.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);
