use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use tracing::{error, info, warn};

use crate::{
    domain::ChatId,
    errors::{ConnectionFault, TransportError},
    fault::{
        classify::{classify, ErrorClassification, ErrorCode},
        tracker::{ErrorRateTracker, DEFAULT_ERROR_THRESHOLD, DEFAULT_ERROR_WINDOW},
    },
    messaging::gated::BackoffGate,
};

#[derive(Clone, Copy, Debug)]
pub struct ErrorPolicy {
    /// Occurrences within `window` that count as a burst.
    pub threshold: usize,
    pub window: Duration,
}

impl Default for ErrorPolicy {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_ERROR_THRESHOLD,
            window: DEFAULT_ERROR_WINDOW,
        }
    }
}

/// Hooks for protective action. Defaults only log.
#[async_trait]
pub trait FaultObserver: Send + Sync {
    async fn on_blocked_user(&self, chat_id: ChatId) {
        info!(chat_id = chat_id.0, "user has blocked the bot");
    }

    async fn on_threshold_exceeded(&self, code: ErrorCode, count: usize) {
        error!(%code, count, "error threshold exceeded");
    }

    /// Polling hit a retryable connection fault. No reconnect logic lives here;
    /// the update listener keeps polling on its own.
    async fn on_polling_backoff(&self, fault: ConnectionFault) {
        info!(fault = fault.code(), "handling polling timeout with backoff");
    }
}

/// Observer that keeps the default logging behavior.
#[derive(Clone, Copy, Debug, Default)]
pub struct LoggingObserver;

impl FaultObserver for LoggingObserver {}

/// What the façade concluded about one error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HandledError {
    pub classification: ErrorClassification,
    pub threshold_exceeded: bool,
}

/// Entry point for transport errors: classifies, records, reacts.
///
/// Nothing in here fails; the worst outcome of any error is a log line.
pub struct BotErrorHandler {
    tracker: Arc<ErrorRateTracker>,
    gate: Arc<BackoffGate>,
    policy: ErrorPolicy,
    observer: Arc<dyn FaultObserver>,
}

impl BotErrorHandler {
    pub fn new(
        tracker: Arc<ErrorRateTracker>,
        gate: Arc<BackoffGate>,
        policy: ErrorPolicy,
        observer: Arc<dyn FaultObserver>,
    ) -> Self {
        Self {
            tracker,
            gate,
            policy,
            observer,
        }
    }

    pub fn tracker(&self) -> &Arc<ErrorRateTracker> {
        &self.tracker
    }

    /// Handle an error raised by a request (handler or deletion). `chat_id` is
    /// the chat the request targeted, when known.
    ///
    /// A rate-limit error blocks here for the server's retry-after.
    pub async fn handle_bot_error(
        &self,
        err: &TransportError,
        chat_id: Option<ChatId>,
    ) -> HandledError {
        let classification = classify(err);
        let code = classification.code();
        let timestamp = Utc::now().to_rfc3339();
        let chat = chat_id.map(|c| c.0);

        self.tracker.record(code);

        match &classification {
            ErrorClassification::Forbidden => {
                error!(
                    %timestamp,
                    error_code = err.code(),
                    ?chat,
                    description = err.description(),
                    "bot was blocked by the user"
                );
                if let Some(chat_id) = chat_id {
                    self.observer.on_blocked_user(chat_id).await;
                }
            }
            ErrorClassification::RateLimited { retry_after } => {
                error!(
                    %timestamp,
                    error_code = err.code(),
                    ?chat,
                    retry_after_secs = retry_after.as_secs(),
                    "too many requests"
                );
                self.gate.backoff(*retry_after).await;
            }
            ErrorClassification::BadRequest { description } => {
                error!(
                    %timestamp,
                    error_code = err.code(),
                    ?chat,
                    %description,
                    "bad request"
                );
                info!(%timestamp, ?chat, %description, "invalid bot usage");
            }
            ErrorClassification::UnknownTransport { status } => {
                error!(
                    %timestamp,
                    error_code = err.code(),
                    ?chat,
                    status,
                    description = err.description(),
                    "unknown telegram error"
                );
            }
            ErrorClassification::NonTransport { .. } => {
                error!(
                    %timestamp,
                    error_code = err.code(),
                    ?chat,
                    description = err.description(),
                    "non-telegram error"
                );
            }
        }

        let threshold_exceeded = self.check_threshold(code).await;
        HandledError {
            classification,
            threshold_exceeded,
        }
    }

    /// Handle an error raised by the update listener.
    pub async fn handle_polling_error(&self, err: &TransportError) -> HandledError {
        warn!(
            timestamp = %Utc::now().to_rfc3339(),
            error_code = err.code(),
            description = err.description(),
            "polling error"
        );

        let handled = self.handle_bot_error(err, None).await;
        if let ErrorClassification::NonTransport { fault: Some(fault) } = &handled.classification
        {
            if handled.classification.is_retryable_polling_fault() {
                self.observer.on_polling_backoff(*fault).await;
            }
        }
        handled
    }

    async fn check_threshold(&self, code: ErrorCode) -> bool {
        let exceeded =
            self.tracker
                .check_threshold(code, self.policy.threshold, self.policy.window);
        if exceeded {
            let count = self.tracker.count(code);
            self.observer.on_threshold_exceeded(code, count).await;
        }
        exceeded
    }
}
