//! Fault isolation: classify transport errors, track their rate, react.

pub mod classify;
pub mod handler;
pub mod tracker;

pub use classify::{classify, Disposition, ErrorClassification, ErrorCode};
pub use handler::{BotErrorHandler, ErrorPolicy, FaultObserver, HandledError, LoggingObserver};
pub use tracker::ErrorRateTracker;
