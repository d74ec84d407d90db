use std::{sync::Arc, time::Duration};

use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};
use tracing::info;

use crate::{
    domain::{ChatId, MessageRef, UserId},
    messaging::{
        port::MessagingPort,
        types::{ChatMemberRole, InlineKeyboard, PollRequest, TextFormat},
    },
    Result,
};

/// Process-wide rate-limit backoff point.
///
/// A 429 arms the gate until `now + retry_after`; every gated caller waits for
/// it to open before issuing its request. There is one gate per bot, not one
/// per chat.
#[derive(Debug, Default)]
pub struct BackoffGate {
    closed_until: Mutex<Option<Instant>>,
}

impl BackoffGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Close the gate for `duration` (never shortening an active backoff) and
    /// wait until it opens again.
    pub async fn backoff(&self, duration: Duration) {
        let until = {
            let mut slot = self.closed_until.lock().await;
            let candidate = Instant::now() + duration;
            let until = match *slot {
                Some(existing) if existing > candidate => existing,
                _ => candidate,
            };
            *slot = Some(until);
            until
        };
        info!(wait_secs = duration.as_secs_f64(), "rate limit reached, backing off");
        sleep_until(until).await;
    }

    /// Wait until any active backoff has elapsed.
    pub async fn wait_open(&self) {
        let until = {
            let mut slot = self.closed_until.lock().await;
            match *slot {
                Some(until) if until > Instant::now() => Some(until),
                Some(_) => {
                    *slot = None;
                    None
                }
                None => None,
            }
        };
        if let Some(until) = until {
            sleep_until(until).await;
        }
    }

    pub async fn remaining(&self) -> Duration {
        let slot = self.closed_until.lock().await;
        slot.map(|until| until.saturating_duration_since(Instant::now()))
            .unwrap_or_default()
    }
}

/// MessagingPort decorator that holds every outbound call behind the
/// [`BackoffGate`].
pub struct GatedMessenger {
    inner: Arc<dyn MessagingPort>,
    gate: Arc<BackoffGate>,
}

impl GatedMessenger {
    pub fn new(inner: Arc<dyn MessagingPort>, gate: Arc<BackoffGate>) -> Self {
        Self { inner, gate }
    }
}

#[async_trait::async_trait]
impl MessagingPort for GatedMessenger {
    async fn send_message(
        &self,
        chat_id: ChatId,
        text: &str,
        format: TextFormat,
    ) -> Result<MessageRef> {
        self.gate.wait_open().await;
        self.inner.send_message(chat_id, text, format).await
    }

    async fn send_inline_keyboard(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: InlineKeyboard,
    ) -> Result<MessageRef> {
        self.gate.wait_open().await;
        self.inner.send_inline_keyboard(chat_id, text, keyboard).await
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<()> {
        self.gate.wait_open().await;
        self.inner.delete_message(msg).await
    }

    async fn send_poll(&self, chat_id: ChatId, poll: &PollRequest) -> Result<MessageRef> {
        self.gate.wait_open().await;
        self.inner.send_poll(chat_id, poll).await
    }

    async fn member_role(&self, chat_id: ChatId, user_id: UserId) -> Result<ChatMemberRole> {
        self.gate.wait_open().await;
        self.inner.member_role(chat_id, user_id).await
    }

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        // Callback answers expire quickly; waiting out a long backoff makes them useless.
        self.inner.answer_callback_query(callback_id, text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn gate_blocks_until_backoff_elapses() {
        let gate = Arc::new(BackoffGate::new());
        let start = Instant::now();

        let g = gate.clone();
        let backoff = tokio::spawn(async move { g.backoff(Duration::from_secs(3)).await });
        tokio::task::yield_now().await;

        gate.wait_open().await;
        assert!(start.elapsed() >= Duration::from_secs(3));
        backoff.await.unwrap();
        assert_eq!(gate.remaining().await, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn shorter_backoff_does_not_shorten_active_one() {
        let gate = Arc::new(BackoffGate::new());
        let start = Instant::now();

        let g = gate.clone();
        let long = tokio::spawn(async move { g.backoff(Duration::from_secs(10)).await });
        tokio::task::yield_now().await;

        gate.backoff(Duration::from_secs(1)).await;
        assert!(start.elapsed() >= Duration::from_secs(10));
        long.await.unwrap();
    }

    /// Records when each delete reached the transport.
    #[derive(Default)]
    struct RecordingMessenger {
        deletes: std::sync::Mutex<Vec<Instant>>,
    }

    #[async_trait::async_trait]
    impl MessagingPort for RecordingMessenger {
        async fn send_message(
            &self,
            chat_id: ChatId,
            _text: &str,
            _format: TextFormat,
        ) -> Result<MessageRef> {
            Ok(MessageRef::new(chat_id, crate::domain::MessageId(1)))
        }

        async fn send_inline_keyboard(
            &self,
            chat_id: ChatId,
            text: &str,
            _keyboard: InlineKeyboard,
        ) -> Result<MessageRef> {
            self.send_message(chat_id, text, TextFormat::Plain).await
        }

        async fn delete_message(&self, _msg: MessageRef) -> Result<()> {
            self.deletes.lock().unwrap().push(Instant::now());
            Ok(())
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

    #[tokio::test(start_paused = true)]
    async fn gated_delete_waits_out_active_backoff() {
        let inner = Arc::new(RecordingMessenger::default());
        let gate = Arc::new(BackoffGate::new());
        let messenger = GatedMessenger::new(inner.clone(), gate.clone());
        let start = Instant::now();

        let g = gate.clone();
        let backoff = tokio::spawn(async move { g.backoff(Duration::from_secs(5)).await });
        tokio::task::yield_now().await;

        let msg = MessageRef::new(ChatId(1), crate::domain::MessageId(2));
        messenger.delete_message(msg).await.unwrap();

        let deletes = inner.deletes.lock().unwrap().clone();
        assert_eq!(deletes.len(), 1);
        assert!(deletes[0] - start >= Duration::from_secs(5));
        backoff.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn callback_answers_skip_the_gate() {
        let inner = Arc::new(RecordingMessenger::default());
        let gate = Arc::new(BackoffGate::new());
        let messenger = GatedMessenger::new(inner, gate.clone());
        let start = Instant::now();

        let g = gate.clone();
        let _backoff = tokio::spawn(async move { g.backoff(Duration::from_secs(5)).await });
        tokio::task::yield_now().await;

        messenger.answer_callback_query("cb-1", None).await.unwrap();
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn open_gate_does_not_wait() {
        let gate = BackoffGate::new();
        let start = std::time::Instant::now();
        gate.wait_open().await;
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
