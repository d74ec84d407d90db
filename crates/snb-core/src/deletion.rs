//! Deferred message deletion with bounded retries.
//!
//! Every queued deletion is driven by one spawned task that owns its timer:
//! it sleeps for the initial delay, attempts the deletion, and on a transient
//! failure sleeps for the retry delay and tries again, until the retry budget
//! runs out. The shared map only holds bookkeeping (state, attempt count,
//! cancellation token), so cancelling is a map removal plus a token cancel.
//!
//! Any await may race with `cancel`/`shutdown`, so the driver re-checks its
//! entry (by generation) after every transport call and backs off silently if
//! the entry is gone.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    domain::{ChatId, MessageRef},
    errors::TransportError,
    fault::{
        classify::{classify, Disposition, ErrorClassification},
        handler::BotErrorHandler,
    },
    messaging::{port::MessagingPort, types::TextFormat},
    Result,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeletionPolicy {
    /// Delay before the first attempt, for `enqueue_default`.
    pub delay: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
    /// Delay before deleting an incoming command message.
    pub command_delay: Duration,
}

impl Default for DeletionPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(15_000),
            max_retries: 3,
            retry_delay: Duration::from_millis(1_000),
            command_delay: Duration::from_millis(500),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskState {
    /// Waiting for the first attempt.
    Pending,
    /// A delete request is in flight.
    Attempting,
    /// The n-th retry is armed.
    Retrying(u32),
}

/// Result of one deletion attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AttemptOutcome {
    Deleted,
    /// Permanent failure; the task was dropped without retrying.
    Dropped(ErrorClassification),
    /// Transient failure; retry number `attempt` runs after `after`.
    Retry { attempt: u32, after: Duration },
    /// Transient failure with the retry budget spent; the task was dropped.
    Exhausted(ErrorClassification),
    /// No task for this key (cancelled, finished, or replaced mid-attempt).
    Missing,
    /// Another attempt for this key is still in flight.
    InFlight,
}

struct DeletionTask {
    generation: u64,
    attempts: u32,
    state: TaskState,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

/// Queue of pending deletions, keyed by message.
///
/// Cheap to clone; clones share the same queue.
#[derive(Clone)]
pub struct DeletionQueue {
    inner: Arc<QueueInner>,
}

struct QueueInner {
    messenger: Arc<dyn MessagingPort>,
    errors: Option<Arc<BotErrorHandler>>,
    policy: DeletionPolicy,
    tasks: Mutex<HashMap<MessageRef, DeletionTask>>,
    generations: AtomicU64,
}

impl DeletionQueue {
    pub fn new(messenger: Arc<dyn MessagingPort>, policy: DeletionPolicy) -> Self {
        Self::build(messenger, policy, None)
    }

    /// Queue whose failed attempts are also reported to the error façade
    /// (classified, rate-tracked, rate-limit backoff honored).
    pub fn with_error_handler(
        messenger: Arc<dyn MessagingPort>,
        policy: DeletionPolicy,
        errors: Arc<BotErrorHandler>,
    ) -> Self {
        Self::build(messenger, policy, Some(errors))
    }

    fn build(
        messenger: Arc<dyn MessagingPort>,
        policy: DeletionPolicy,
        errors: Option<Arc<BotErrorHandler>>,
    ) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                messenger,
                errors,
                policy,
                tasks: Mutex::new(HashMap::new()),
                generations: AtomicU64::new(0),
            }),
        }
    }

    pub fn policy(&self) -> DeletionPolicy {
        self.inner.policy
    }

    /// Schedule deletion of `msg` after `delay`.
    ///
    /// Returns `false` (and changes nothing) if a deletion for `msg` is
    /// already pending.
    pub async fn enqueue(&self, msg: MessageRef, delay: Duration) -> bool {
        let mut tasks = self.inner.tasks.lock().await;
        if tasks.contains_key(&msg) {
            debug!(%msg, "deletion already queued");
            return false;
        }

        let generation = self.inner.generations.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let queue = self.clone();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            queue.drive(msg, generation, token, delay).await;
        });

        tasks.insert(
            msg,
            DeletionTask {
                generation,
                attempts: 0,
                state: TaskState::Pending,
                cancel,
                handle: Some(handle),
            },
        );
        true
    }

    pub async fn enqueue_default(&self, msg: MessageRef) -> bool {
        self.enqueue(msg, self.inner.policy.delay).await
    }

    /// Delete an incoming command message shortly after it arrived.
    pub async fn delete_command(&self, msg: MessageRef) -> bool {
        self.enqueue(msg, self.inner.policy.command_delay).await
    }

    /// Send `text` and queue its deletion after `ttl`.
    pub async fn send_disappearing(
        &self,
        chat_id: ChatId,
        text: &str,
        ttl: Duration,
    ) -> Result<MessageRef> {
        let sent = self
            .inner
            .messenger
            .send_message(chat_id, text, TextFormat::Plain)
            .await?;
        self.enqueue(sent, ttl).await;
        Ok(sent)
    }

    /// Drop the pending deletion of `msg`, if any.
    ///
    /// An attempt already in flight finishes its request but leaves the map
    /// alone and never retries.
    pub async fn cancel(&self, msg: MessageRef) -> bool {
        let removed = self.inner.tasks.lock().await.remove(&msg);
        match removed {
            Some(task) => {
                task.cancel.cancel();
                debug!(%msg, "deletion cancelled");
                true
            }
            None => false,
        }
    }

    /// Cancel every pending deletion. Safe to call more than once.
    pub async fn shutdown(&self) {
        let drained: Vec<DeletionTask> = {
            let mut tasks = self.inner.tasks.lock().await;
            tasks.drain().map(|(_, t)| t).collect()
        };
        if !drained.is_empty() {
            debug!(count = drained.len(), "dropping pending deletions");
        }
        for task in drained {
            task.cancel.cancel();
            if let Some(handle) = task.handle {
                handle.abort();
            }
        }
    }

    pub async fn contains(&self, msg: MessageRef) -> bool {
        self.inner.tasks.lock().await.contains_key(&msg)
    }

    pub async fn pending_count(&self) -> usize {
        self.inner.tasks.lock().await.len()
    }

    pub async fn state_of(&self, msg: MessageRef) -> Option<TaskState> {
        self.inner.tasks.lock().await.get(&msg).map(|t| t.state)
    }

    /// Run one deletion attempt for whatever task is queued under `msg`.
    ///
    /// Normally invoked by the task's own timer. A call for a key with no
    /// task is a silent no-op.
    pub async fn attempt_delete(&self, msg: MessageRef) -> AttemptOutcome {
        self.attempt(msg, None).await
    }

    async fn drive(
        &self,
        msg: MessageRef,
        generation: u64,
        cancel: CancellationToken,
        delay: Duration,
    ) {
        let mut wait = delay;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = sleep(wait) => {}
            }

            match self.attempt(msg, Some(generation)).await {
                AttemptOutcome::Retry { after, .. } => wait = after,
                // Someone else's attempt is in flight; look again once it settles.
                AttemptOutcome::InFlight => {
                    wait = self.inner.policy.retry_delay.max(Duration::from_millis(1));
                }
                _ => return,
            }
        }
    }

    async fn attempt(&self, msg: MessageRef, expected: Option<u64>) -> AttemptOutcome {
        let generation = {
            let mut tasks = self.inner.tasks.lock().await;
            let Some(task) = tasks.get_mut(&msg) else {
                return AttemptOutcome::Missing;
            };
            if expected.is_some_and(|g| g != task.generation) {
                return AttemptOutcome::Missing;
            }
            if task.state == TaskState::Attempting {
                return AttemptOutcome::InFlight;
            }
            task.state = TaskState::Attempting;
            task.generation
        };

        let result = self.inner.messenger.delete_message(msg).await;

        let failure = match result {
            Ok(()) => {
                let mut tasks = self.inner.tasks.lock().await;
                if !owns(&tasks, msg, generation) {
                    return AttemptOutcome::Missing;
                }
                tasks.remove(&msg);
                debug!(%msg, "message deleted");
                return AttemptOutcome::Deleted;
            }
            Err(e) => TransportError::from(e),
        };

        let classification = match &self.inner.errors {
            Some(errors) => {
                errors
                    .handle_bot_error(&failure, Some(msg.chat_id))
                    .await
                    .classification
            }
            None => classify(&failure),
        };

        let mut tasks = self.inner.tasks.lock().await;
        if !owns(&tasks, msg, generation) {
            debug!(%msg, "deletion task vanished during attempt");
            return AttemptOutcome::Missing;
        }

        if classification.disposition() == Disposition::Permanent {
            tasks.remove(&msg);
            warn!(
                chat_id = msg.chat_id.0,
                message_id = msg.message_id.0,
                description = failure.description(),
                "message already deleted or not deletable; dropping"
            );
            return AttemptOutcome::Dropped(classification);
        }

        let max_retries = self.inner.policy.max_retries;
        let Some(task) = tasks.get_mut(&msg) else {
            return AttemptOutcome::Missing;
        };
        if task.attempts < max_retries {
            task.attempts += 1;
            task.state = TaskState::Retrying(task.attempts);
            // With the façade attached the backoff has already been waited out.
            let after = match self.inner.errors {
                Some(_) => self.inner.policy.retry_delay,
                None => retry_delay_for(&classification, self.inner.policy.retry_delay),
            };
            debug!(%msg, attempt = task.attempts, ?after, "deletion failed; retrying");
            return AttemptOutcome::Retry {
                attempt: task.attempts,
                after,
            };
        }

        let attempts = task.attempts + 1;
        tasks.remove(&msg);
        warn!(
            chat_id = msg.chat_id.0,
            message_id = msg.message_id.0,
            attempts,
            error = failure.description(),
            "failed to delete message after {max_retries} retries"
        );
        AttemptOutcome::Exhausted(classification)
    }
}

fn owns(tasks: &HashMap<MessageRef, DeletionTask>, msg: MessageRef, generation: u64) -> bool {
    tasks
        .get(&msg)
        .is_some_and(|t| t.generation == generation)
}

/// A rate-limited attempt waits at least as long as the server asked.
fn retry_delay_for(classification: &ErrorClassification, retry_delay: Duration) -> Duration {
    match classification {
        ErrorClassification::RateLimited { retry_after } => retry_delay.max(*retry_after),
        _ => retry_delay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{MessageId, UserId},
        errors::Error,
        fault::{handler::ErrorPolicy, tracker::ErrorRateTracker, ErrorCode, LoggingObserver},
        messaging::{
            gated::BackoffGate,
            types::{ChatMemberRole, InlineKeyboard, PollRequest},
        },
    };
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;
    use tokio::time::Instant;

    /// Messenger whose deletes fail with a fixed error (or succeed).
    #[derive(Default)]
    struct FakeMessenger {
        fail_with: StdMutex<Option<TransportError>>,
        delete_latency: Duration,
        deletes: StdMutex<Vec<(MessageRef, Instant)>>,
        next_id: StdMutex<i32>,
    }

    impl FakeMessenger {
        fn failing(err: TransportError) -> Self {
            Self {
                fail_with: StdMutex::new(Some(err)),
                ..Default::default()
            }
        }

        fn delete_count(&self) -> usize {
            self.deletes.lock().unwrap().len()
        }

        fn delete_times(&self) -> Vec<Instant> {
            self.deletes.lock().unwrap().iter().map(|(_, t)| *t).collect()
        }
    }

    #[async_trait]
    impl MessagingPort for FakeMessenger {
        async fn send_message(
            &self,
            chat_id: ChatId,
            _text: &str,
            _format: TextFormat,
        ) -> Result<MessageRef> {
            let mut id = self.next_id.lock().unwrap();
            *id += 1;
            Ok(MessageRef::new(chat_id, MessageId(*id)))
        }

        async fn send_inline_keyboard(
            &self,
            chat_id: ChatId,
            text: &str,
            _keyboard: InlineKeyboard,
        ) -> Result<MessageRef> {
            self.send_message(chat_id, text, TextFormat::Plain).await
        }

        async fn delete_message(&self, msg: MessageRef) -> Result<()> {
            self.deletes.lock().unwrap().push((msg, Instant::now()));
            if !self.delete_latency.is_zero() {
                sleep(self.delete_latency).await;
            }
            match self.fail_with.lock().unwrap().clone() {
                Some(err) => Err(Error::Transport(err)),
                None => Ok(()),
            }
        }

        async fn send_poll(&self, chat_id: ChatId, poll: &PollRequest) -> Result<MessageRef> {
            self.send_message(chat_id, &poll.question, TextFormat::Plain)
                .await
        }

        async fn member_role(&self, _chat_id: ChatId, _user_id: UserId) -> Result<ChatMemberRole> {
            Ok(ChatMemberRole::Member)
        }

        async fn answer_callback_query(
            &self,
            _callback_id: &str,
            _text: Option<&str>,
        ) -> Result<()> {
            Ok(())
        }
    }

    fn key(chat: i64, msg: i32) -> MessageRef {
        MessageRef::new(ChatId(chat), MessageId(msg))
    }

    fn policy(max_retries: u32, retry_ms: u64) -> DeletionPolicy {
        DeletionPolicy {
            max_retries,
            retry_delay: Duration::from_millis(retry_ms),
            ..DeletionPolicy::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn deletes_after_delay_and_clears_entry() {
        let api = Arc::new(FakeMessenger::default());
        let queue = DeletionQueue::new(api.clone(), DeletionPolicy::default());
        let k = key(100, 1);
        let start = Instant::now();

        assert!(queue.enqueue_default(k).await);
        assert_eq!(queue.state_of(k).await, Some(TaskState::Pending));

        sleep(Duration::from_millis(14_900)).await;
        assert_eq!(api.delete_count(), 0);

        sleep(Duration::from_millis(200)).await;
        assert_eq!(api.delete_count(), 1);
        assert!(api.delete_times()[0] - start >= Duration::from_millis(15_000));
        assert!(!queue.contains(k).await);
    }

    #[tokio::test(start_paused = true)]
    async fn enqueue_is_idempotent_per_key() {
        let api = Arc::new(FakeMessenger::default());
        let queue = DeletionQueue::new(api.clone(), DeletionPolicy::default());
        let k = key(100, 2);

        assert!(queue.enqueue(k, Duration::from_secs(1)).await);
        assert!(!queue.enqueue(k, Duration::from_millis(10)).await);
        assert_eq!(queue.pending_count().await, 1);

        sleep(Duration::from_secs(2)).await;
        assert_eq!(api.delete_count(), 1);
        assert_eq!(queue.pending_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn message_not_found_is_dropped_without_retry() {
        let api = Arc::new(FakeMessenger::failing(TransportError::api(
            400,
            "Bad Request: message to delete not found",
        )));
        let queue = DeletionQueue::new(api.clone(), policy(3, 10));
        let k = key(100, 55);

        queue.enqueue(k, Duration::ZERO).await;
        sleep(Duration::from_millis(100)).await;

        assert_eq!(api.delete_count(), 1);
        assert!(!queue.contains(k).await);
    }

    #[tokio::test(start_paused = true)]
    async fn forbidden_is_dropped_without_retry() {
        let api = Arc::new(FakeMessenger::failing(TransportError::api(
            403,
            "Forbidden: bot is not a member of the supergroup chat",
        )));
        let queue = DeletionQueue::new(api.clone(), policy(3, 10));

        queue.enqueue(key(1, 1), Duration::ZERO).await;
        sleep(Duration::from_millis(100)).await;

        assert_eq!(api.delete_count(), 1);
        assert_eq!(queue.pending_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_exhaust_retry_budget() {
        let api = Arc::new(FakeMessenger::failing(TransportError::api(
            500,
            "Internal Server Error",
        )));
        let queue = DeletionQueue::new(api.clone(), policy(2, 10));
        let k = key(100, 56);

        queue.enqueue(k, Duration::ZERO).await;
        sleep(Duration::from_millis(500)).await;

        assert_eq!(api.delete_count(), 3);
        let times = api.delete_times();
        for pair in times.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(10));
        }
        assert!(!queue.contains(k).await);

        // Nothing left armed.
        sleep(Duration::from_secs(5)).await;
        assert_eq!(api.delete_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn non_transport_errors_are_retried_too() {
        let api = Arc::new(FakeMessenger::failing(TransportError::Other {
            description: "socket closed".to_string(),
        }));
        let queue = DeletionQueue::new(api.clone(), policy(1, 10));

        queue.enqueue(key(5, 5), Duration::ZERO).await;
        sleep(Duration::from_millis(200)).await;

        assert_eq!(api.delete_count(), 2);
        assert_eq!(queue.pending_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_armed_retry_stops_further_attempts() {
        let api = Arc::new(FakeMessenger::failing(TransportError::api(
            502,
            "Bad Gateway",
        )));
        let queue = DeletionQueue::new(api.clone(), policy(3, 100));
        let k = key(100, 57);

        queue.enqueue(k, Duration::ZERO).await;
        sleep(Duration::from_millis(50)).await;
        assert_eq!(api.delete_count(), 1);
        assert_eq!(queue.state_of(k).await, Some(TaskState::Retrying(1)));

        assert!(queue.cancel(k).await);
        assert!(!queue.cancel(k).await);

        // A stale timer firing after the cancel finds nothing to do.
        assert_eq!(queue.attempt_delete(k).await, AttemptOutcome::Missing);

        sleep(Duration::from_secs(1)).await;
        assert_eq!(api.delete_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_while_in_flight_leaves_no_retry_behind() {
        let api = Arc::new(FakeMessenger {
            fail_with: StdMutex::new(Some(TransportError::api(500, "Internal Server Error"))),
            delete_latency: Duration::from_millis(50),
            ..Default::default()
        });
        let queue = DeletionQueue::new(api.clone(), policy(3, 10));
        let k = key(7, 7);

        queue.enqueue(k, Duration::ZERO).await;
        sleep(Duration::from_millis(10)).await;
        assert_eq!(queue.state_of(k).await, Some(TaskState::Attempting));
        assert_eq!(queue.attempt_delete(k).await, AttemptOutcome::InFlight);

        queue.cancel(k).await;
        sleep(Duration::from_secs(1)).await;

        assert_eq!(api.delete_count(), 1);
        assert!(!queue.contains(k).await);
    }

    #[tokio::test(start_paused = true)]
    async fn timer_outlives_overlapping_manual_attempt() {
        let api = Arc::new(FakeMessenger {
            fail_with: StdMutex::new(Some(TransportError::api(500, "Internal Server Error"))),
            delete_latency: Duration::from_millis(50),
            ..Default::default()
        });
        let queue = DeletionQueue::new(api.clone(), policy(3, 10));
        let k = key(9, 9);

        queue.enqueue(k, Duration::from_millis(20)).await;
        let manual = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.attempt_delete(k).await })
        };

        // The timer fires at 20 ms while the manual attempt is still in flight.
        assert_eq!(
            manual.await.unwrap(),
            AttemptOutcome::Retry {
                attempt: 1,
                after: Duration::from_millis(10)
            }
        );

        sleep(Duration::from_secs(60)).await;
        assert_eq!(api.delete_count(), 4);
        assert!(!queue.contains(k).await);
        assert!(queue.enqueue(k, Duration::from_secs(1)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn reenqueue_after_cancel_is_not_hijacked_by_old_attempt() {
        let api = Arc::new(FakeMessenger {
            delete_latency: Duration::from_millis(50),
            ..Default::default()
        });
        let queue = DeletionQueue::new(api.clone(), policy(3, 10));
        let k = key(8, 8);

        queue.enqueue(k, Duration::ZERO).await;
        sleep(Duration::from_millis(10)).await;
        queue.cancel(k).await;
        assert!(queue.enqueue(k, Duration::from_secs(10)).await);

        // The old in-flight attempt completes but must not remove the new task.
        sleep(Duration::from_millis(100)).await;
        assert_eq!(queue.state_of(k).await, Some(TaskState::Pending));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_everything_and_is_repeatable() {
        let api = Arc::new(FakeMessenger::default());
        let queue = DeletionQueue::new(api.clone(), DeletionPolicy::default());
        for i in 0..10 {
            queue.enqueue(key(1, i), Duration::from_secs(1)).await;
        }
        assert_eq!(queue.pending_count().await, 10);

        queue.shutdown().await;
        queue.shutdown().await;
        assert_eq!(queue.pending_count().await, 0);

        sleep(Duration::from_secs(5)).await;
        assert_eq!(api.delete_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn send_disappearing_queues_sent_message() {
        let api = Arc::new(FakeMessenger::default());
        let queue = DeletionQueue::new(api.clone(), DeletionPolicy::default());

        let sent = queue
            .send_disappearing(ChatId(3), "hello", Duration::from_secs(15))
            .await
            .unwrap();
        assert!(queue.contains(sent).await);

        sleep(Duration::from_secs(16)).await;
        assert_eq!(api.deletes.lock().unwrap()[0].0, sent);
    }

    #[tokio::test(start_paused = true)]
    async fn failures_flow_into_error_tracker() {
        let api = Arc::new(FakeMessenger::failing(TransportError::api(
            500,
            "Internal Server Error",
        )));
        let tracker = Arc::new(ErrorRateTracker::new(Duration::from_secs(300)));
        let errors = Arc::new(BotErrorHandler::new(
            tracker.clone(),
            Arc::new(BackoffGate::new()),
            ErrorPolicy::default(),
            Arc::new(LoggingObserver),
        ));
        let queue = DeletionQueue::with_error_handler(api.clone(), policy(2, 10), errors);

        queue.enqueue(key(1, 1), Duration::ZERO).await;
        sleep(Duration::from_millis(200)).await;

        assert_eq!(tracker.count(ErrorCode::UnknownTransport(500)), 3);
    }

    #[test]
    fn rate_limited_retry_waits_for_server_hint() {
        let rl = ErrorClassification::RateLimited {
            retry_after: Duration::from_secs(5),
        };
        assert_eq!(
            retry_delay_for(&rl, Duration::from_secs(1)),
            Duration::from_secs(5)
        );
        assert_eq!(
            retry_delay_for(&ErrorClassification::Forbidden, Duration::from_secs(1)),
            Duration::from_secs(1)
        );
    }
}
