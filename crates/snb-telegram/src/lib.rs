//! Telegram adapter (teloxide).
//!
//! Implements the `snb-core` MessagingPort over the Bot API and turns
//! teloxide's `RequestError` into the core's `TransportError` at the boundary.

use async_trait::async_trait;

use teloxide::{
    prelude::*,
    types::{InlineKeyboardButton, InlineKeyboardMarkup, ParseMode},
    RequestError,
};

pub mod errors;
pub mod handlers;
pub mod router;

use snb_core::{
    domain::{ChatId, MessageId, MessageRef, UserId},
    messaging::{
        port::MessagingPort,
        types::{ChatMemberRole, InlineKeyboard, PollRequest, TextFormat},
    },
    Error, Result,
};

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    pub fn bot(&self) -> Bot {
        self.bot.clone()
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn tg_msg_id(message_id: MessageId) -> teloxide::types::MessageId {
        teloxide::types::MessageId(message_id.0)
    }

    fn msg_ref(chat_id: ChatId, msg: &Message) -> MessageRef {
        MessageRef::new(chat_id, MessageId(msg.id.0))
    }

    async fn call<T, Fut>(fut: Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, RequestError>>,
        Fut::IntoFuture: Send,
    {
        fut.await
            .map_err(|e| Error::Transport(errors::transport_error(&e)))
    }
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    async fn send_message(
        &self,
        chat_id: ChatId,
        text: &str,
        format: TextFormat,
    ) -> Result<MessageRef> {
        let req = self
            .bot
            .send_message(Self::tg_chat(chat_id), text.to_string());
        let msg = match format {
            TextFormat::Plain => Self::call(req).await?,
            TextFormat::Html => Self::call(req.parse_mode(ParseMode::Html)).await?,
        };
        Ok(Self::msg_ref(chat_id, &msg))
    }

    async fn send_inline_keyboard(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: InlineKeyboard,
    ) -> Result<MessageRef> {
        let rows: Vec<Vec<InlineKeyboardButton>> = keyboard
            .buttons
            .into_iter()
            .map(|b| vec![InlineKeyboardButton::callback(b.label, b.callback_data)])
            .collect();
        let markup = InlineKeyboardMarkup::new(rows);

        let msg = Self::call(
            self.bot
                .send_message(Self::tg_chat(chat_id), text.to_string())
                .reply_markup(markup),
        )
        .await?;
        Ok(Self::msg_ref(chat_id, &msg))
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<()> {
        Self::call(
            self.bot
                .delete_message(Self::tg_chat(msg.chat_id), Self::tg_msg_id(msg.message_id)),
        )
        .await?;
        Ok(())
    }

    async fn send_poll(&self, chat_id: ChatId, poll: &PollRequest) -> Result<MessageRef> {
        let msg = Self::call(
            self.bot
                .send_poll(
                    Self::tg_chat(chat_id),
                    poll.question.clone(),
                    poll.options.clone(),
                )
                .is_anonymous(poll.is_anonymous)
                .allows_multiple_answers(poll.allows_multiple_answers),
        )
        .await?;
        Ok(Self::msg_ref(chat_id, &msg))
    }

    async fn member_role(&self, chat_id: ChatId, user_id: UserId) -> Result<ChatMemberRole> {
        let user = u64::try_from(user_id.0)
            .map_err(|_| Error::External(format!("invalid user id: {}", user_id.0)))?;
        let member = Self::call(
            self.bot
                .get_chat_member(Self::tg_chat(chat_id), teloxide::types::UserId(user)),
        )
        .await?;

        let role = if member.kind.is_owner() {
            ChatMemberRole::Owner
        } else if member.kind.is_administrator() {
            ChatMemberRole::Administrator
        } else {
            ChatMemberRole::Member
        };
        Ok(role)
    }

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        let mut req = self.bot.answer_callback_query(callback_id.to_string());
        if let Some(t) = text {
            req = req.text(t.to_string());
        }
        Self::call(req).await?;
        Ok(())
    }
}
