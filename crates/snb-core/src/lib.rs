//! Core of the snail community bot.
//!
//! Framework-agnostic on purpose: Telegram lives behind the messaging port,
//! implemented in the `snb-telegram` adapter crate. What lives here is the
//! deferred-deletion queue and the fault isolation layer (classifier, rate
//! tracker, error façade) plus the small amount of content the commands serve.

pub mod config;
pub mod content;
pub mod deletion;
pub mod domain;
pub mod errors;
pub mod fault;
pub mod formatting;
pub mod logging;
pub mod messaging;
pub mod poll;

pub use errors::{Error, Result, TransportError};
