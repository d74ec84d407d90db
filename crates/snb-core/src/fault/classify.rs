use std::{fmt, time::Duration};

use crate::errors::{ConnectionFault, TransportError};

/// Retry-after applied when a 429 arrives without a server hint.
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(30);

/// Status reported for API errors whose shape we could not read.
pub const UNKNOWN_STATUS: u16 = 0;

/// Connection faults worth a polling backoff.
pub const RETRYABLE_POLLING_FAULTS: [ConnectionFault; 4] = [
    ConnectionFault::TimedOut,
    ConnectionFault::Reset,
    ConnectionFault::DnsNotFound,
    ConnectionFault::DnsRetry,
];

/// Bad Request descriptions meaning the message is gone or can never be deleted.
const PERMANENT_DELETE_MARKERS: [&str; 3] = [
    "message to delete not found",
    "message not found",
    "message can't be deleted",
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ErrorClassification {
    RateLimited { retry_after: Duration },
    Forbidden,
    BadRequest { description: String },
    UnknownTransport { status: u16 },
    NonTransport { fault: Option<ConnectionFault> },
}

/// Whether retrying an operation that failed this way can ever help.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    Permanent,
    Transient,
}

/// Key under which occurrences are counted by the rate tracker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    RateLimited,
    Forbidden,
    BadRequest,
    UnknownTransport(u16),
    NonTransport,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RateLimited => f.write_str("rate_limited"),
            Self::Forbidden => f.write_str("forbidden"),
            Self::BadRequest => f.write_str("bad_request"),
            Self::UnknownTransport(status) => write!(f, "unknown_transport_{status}"),
            Self::NonTransport => f.write_str("non_transport"),
        }
    }
}

impl ErrorClassification {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::RateLimited { .. } => ErrorCode::RateLimited,
            Self::Forbidden => ErrorCode::Forbidden,
            Self::BadRequest { .. } => ErrorCode::BadRequest,
            Self::UnknownTransport { status } => ErrorCode::UnknownTransport(*status),
            Self::NonTransport { .. } => ErrorCode::NonTransport,
        }
    }

    /// Disposition of a failed *deletion*.
    ///
    /// Only Forbidden and the "message is gone" family of Bad Requests are
    /// permanent; everything else gets the retry budget.
    pub fn disposition(&self) -> Disposition {
        match self {
            Self::Forbidden => Disposition::Permanent,
            Self::BadRequest { description } if is_message_gone(description) => {
                Disposition::Permanent
            }
            Self::BadRequest { .. }
            | Self::RateLimited { .. }
            | Self::UnknownTransport { .. }
            | Self::NonTransport { .. } => Disposition::Transient,
        }
    }

    /// True for connection faults the polling layer should back off on.
    pub fn is_retryable_polling_fault(&self) -> bool {
        matches!(
            self,
            Self::NonTransport { fault: Some(f) } if RETRYABLE_POLLING_FAULTS.contains(f)
        )
    }
}

/// Classify a raw transport error. Total: every shape maps to a variant.
pub fn classify(err: &TransportError) -> ErrorClassification {
    match err {
        TransportError::Api {
            status,
            description,
            retry_after,
        } => match status {
            Some(403) => ErrorClassification::Forbidden,
            Some(429) => ErrorClassification::RateLimited {
                retry_after: retry_after.unwrap_or(DEFAULT_RETRY_AFTER),
            },
            Some(400) => ErrorClassification::BadRequest {
                description: description.clone(),
            },
            Some(other) => ErrorClassification::UnknownTransport { status: *other },
            None => ErrorClassification::UnknownTransport {
                status: UNKNOWN_STATUS,
            },
        },
        TransportError::Connection { fault, .. } => {
            ErrorClassification::NonTransport { fault: Some(*fault) }
        }
        TransportError::Other { .. } => ErrorClassification::NonTransport { fault: None },
    }
}

/// Map a Telegram error description to the HTTP-like status it came with.
///
/// Telegram prefixes descriptions with the status reason ("Bad Request: ...",
/// "Forbidden: ..."). Adapters that only see the description use this to
/// rebuild the status.
pub fn status_from_description(description: &str) -> Option<u16> {
    let d = description.trim_start();
    let prefixes: [(&str, u16); 6] = [
        ("Bad Request", 400),
        ("Unauthorized", 401),
        ("Forbidden", 403),
        ("Not Found", 404),
        ("Conflict", 409),
        ("Too Many Requests", 429),
    ];
    prefixes
        .iter()
        .find(|(prefix, _)| d.starts_with(prefix))
        .map(|(_, status)| *status)
}

fn is_message_gone(description: &str) -> bool {
    let lower = description.to_lowercase();
    PERMANENT_DELETE_MARKERS.iter().any(|m| lower.contains(m))
}
