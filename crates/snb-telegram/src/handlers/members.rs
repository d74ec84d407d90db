use std::sync::Arc;

use teloxide::prelude::*;
use tracing::info;

use snb_core::{content::COMMAND_LIST, domain::ChatId, messaging::types::TextFormat};

use crate::router::AppState;

use super::commands::display_name;

pub async fn handle_new_members(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(members) = msg.new_chat_members() else {
        return Ok(());
    };
    let chat_id = ChatId(msg.chat.id.0);

    for member in members {
        if Some(member.id.0) == state.bot_user_id {
            continue;
        }

        let name = display_name(member, "there");
        info!(chat_id = chat_id.0, user_id = member.id.0, "welcoming new member");
        let body = format!(
            "Hello, {name}! Welcome to our chat. Here are some commands you can use:\n\n{COMMAND_LIST}"
        );
        if let Err(e) = state
            .messenger
            .send_message(chat_id, &body, TextFormat::Plain)
            .await
        {
            state.report(e, Some(chat_id)).await;
        }
    }

    Ok(())
}
