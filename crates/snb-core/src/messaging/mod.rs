//! Messenger abstraction plus the backoff decorator shared by all outbound calls.

pub mod gated;
pub mod port;
pub mod types;
