//! Boundary between teloxide errors and the core's `TransportError`.

use std::{io, pin::Pin, sync::Arc};

use teloxide::{error_handlers::ErrorHandler, RequestError};

use snb_core::{
    errors::{ConnectionFault, TransportError},
    fault::{classify::status_from_description, BotErrorHandler},
};

/// Convert a teloxide request error into the core's raw transport error.
pub fn transport_error(err: &RequestError) -> TransportError {
    match err {
        RequestError::Api(api) => {
            let description = api.to_string();
            TransportError::Api {
                status: status_from_description(&description),
                description,
                retry_after: None,
            }
        }
        RequestError::RetryAfter(after) => TransportError::Api {
            status: Some(429),
            description: err.to_string(),
            retry_after: Some(*after),
        },
        RequestError::MigrateToChatId(_) => TransportError::api(400, err.to_string()),
        RequestError::Network(e) => {
            let description = e.to_string();
            let fault = if e.is_timeout() {
                ConnectionFault::TimedOut
            } else if e.is_connect() {
                connect_fault(&description)
            } else {
                ConnectionFault::Other
            };
            TransportError::connection(fault, description)
        }
        RequestError::Io(e) => {
            TransportError::connection(io_fault(e.kind()), e.to_string())
        }
        // Unparseable response: an API error whose shape we cannot read.
        RequestError::InvalidJson { .. } => TransportError::Api {
            status: None,
            description: err.to_string(),
            retry_after: None,
        },
        #[allow(unreachable_patterns)]
        _ => TransportError::Other {
            description: err.to_string(),
        },
    }
}

fn connect_fault(description: &str) -> ConnectionFault {
    let lower = description.to_lowercase();
    if lower.contains("temporary failure in name resolution") || lower.contains("try again") {
        ConnectionFault::DnsRetry
    } else if lower.contains("dns") || lower.contains("lookup") || lower.contains("resolve") {
        ConnectionFault::DnsNotFound
    } else if lower.contains("refused") {
        ConnectionFault::Refused
    } else {
        ConnectionFault::Reset
    }
}

fn io_fault(kind: io::ErrorKind) -> ConnectionFault {
    match kind {
        io::ErrorKind::TimedOut => ConnectionFault::TimedOut,
        io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::UnexpectedEof => ConnectionFault::Reset,
        io::ErrorKind::ConnectionRefused => ConnectionFault::Refused,
        _ => ConnectionFault::Other,
    }
}

/// Where an error reached us from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorSource {
    /// An update handler returned an error.
    Handler,
    /// The long-polling update listener failed.
    Polling,
}

/// teloxide error handler that forwards into the core façade.
pub struct FacadeErrorHandler {
    errors: Arc<BotErrorHandler>,
    source: ErrorSource,
}

impl FacadeErrorHandler {
    pub fn new(errors: Arc<BotErrorHandler>, source: ErrorSource) -> Arc<Self> {
        Arc::new(Self { errors, source })
    }
}

impl ErrorHandler<RequestError> for FacadeErrorHandler {
    fn handle_error(
        self: Arc<Self>,
        error: RequestError,
    ) -> Pin<Box<dyn std::future::Future<Output = ()> + Send>> {
        Box::pin(async move {
            let raw = transport_error(&error);
            match self.source {
                ErrorSource::Handler => {
                    self.errors.handle_bot_error(&raw, None).await;
                }
                ErrorSource::Polling => {
                    self.errors.handle_polling_error(&raw).await;
                }
            }
        })
    }
}
