use std::time::Duration;

/// Core error type.
///
/// Adapter crates map their specific errors into this type. Transport failures
/// keep their structure in [`TransportError`] so the fault layer can classify
/// them without string sniffing.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Raw failure reported by the messaging transport.
///
/// This is the shape errors have when they cross the adapter boundary, before
/// classification. `status` is `None` when the API answered with something we
/// could not map to an HTTP-like code.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("telegram api error ({}): {description}", status_label(.status))]
    Api {
        status: Option<u16>,
        description: String,
        retry_after: Option<Duration>,
    },

    #[error("connection fault [{}]: {description}", fault_code(.fault))]
    Connection {
        fault: ConnectionFault,
        description: String,
    },

    #[error("{description}")]
    Other { description: String },
}

impl TransportError {
    pub fn api(status: u16, description: impl Into<String>) -> Self {
        Self::Api {
            status: Some(status),
            description: description.into(),
            retry_after: None,
        }
    }

    pub fn rate_limited(retry_after: Option<Duration>) -> Self {
        Self::Api {
            status: Some(429),
            description: "Too Many Requests: retry later".to_string(),
            retry_after,
        }
    }

    pub fn connection(fault: ConnectionFault, description: impl Into<String>) -> Self {
        Self::Connection {
            fault,
            description: description.into(),
        }
    }

    pub fn description(&self) -> &str {
        match self {
            Self::Api { description, .. }
            | Self::Connection { description, .. }
            | Self::Other { description } => description,
        }
    }

    /// Short machine-readable origin code, used in log context.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Api { .. } => "ETELEGRAM",
            Self::Connection { fault, .. } => fault.code(),
            Self::Other { .. } => "EFATAL",
        }
    }
}

impl From<Error> for TransportError {
    fn from(err: Error) -> Self {
        match err {
            Error::Transport(t) => t,
            other => TransportError::Other {
                description: other.to_string(),
            },
        }
    }
}

fn status_label(status: &Option<u16>) -> String {
    status
        .map(|s| s.to_string())
        .unwrap_or_else(|| "no status".to_string())
}

fn fault_code(fault: &ConnectionFault) -> &'static str {
    fault.code()
}

/// Local network fault observed while talking to the API.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConnectionFault {
    TimedOut,
    Reset,
    DnsNotFound,
    DnsRetry,
    Refused,
    Other,
}

impl ConnectionFault {
    pub fn code(self) -> &'static str {
        match self {
            Self::TimedOut => "ETIMEDOUT",
            Self::Reset => "ECONNRESET",
            Self::DnsNotFound => "ENOTFOUND",
            Self::DnsRetry => "EAI_AGAIN",
            Self::Refused => "ECONNREFUSED",
            Self::Other => "ENETWORK",
        }
    }
}
