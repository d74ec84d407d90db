use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageRef, UserId},
    messaging::types::{ChatMemberRole, InlineKeyboard, PollRequest, TextFormat},
    Result,
};

/// Outbound side of the messaging transport.
///
/// Implementations report transport failures as
/// [`Error::Transport`](crate::Error::Transport) so callers can classify them.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    async fn send_message(
        &self,
        chat_id: ChatId,
        text: &str,
        format: TextFormat,
    ) -> Result<MessageRef>;

    async fn send_inline_keyboard(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: InlineKeyboard,
    ) -> Result<MessageRef>;

    async fn delete_message(&self, msg: MessageRef) -> Result<()>;

    async fn send_poll(&self, chat_id: ChatId, poll: &PollRequest) -> Result<MessageRef>;

    async fn member_role(&self, chat_id: ChatId, user_id: UserId) -> Result<ChatMemberRole>;

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()>;
}
