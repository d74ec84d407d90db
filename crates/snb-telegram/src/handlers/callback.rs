use std::sync::Arc;

use teloxide::{prelude::*, types::CallbackQuery};
use tracing::{debug, warn};

use snb_core::{
    content::OptionSelection,
    domain::{ChatId, MessageId, MessageRef},
};

use crate::router::AppState;

use super::commands::display_name;

async fn answer(state: &AppState, query_id: &str, text: Option<&str>, chat_id: Option<ChatId>) {
    if let Err(e) = state.messenger.answer_callback_query(query_id, text).await {
        state.report(e, chat_id).await;
    }
}

pub async fn handle_callback(q: CallbackQuery, state: Arc<AppState>) -> ResponseResult<()> {
    let chat_id = q.message.as_ref().map(|m| ChatId(m.chat.id.0));

    let Some(data) = q.data.as_deref() else {
        warn!("callback query without data");
        answer(&state, &q.id, Some("No action specified."), chat_id).await;
        return Ok(());
    };

    let Some(selection) = OptionSelection::decode(data) else {
        debug!(data, "unrecognised callback data");
        answer(&state, &q.id, Some("Invalid action."), chat_id).await;
        return Ok(());
    };

    if selection.initiator != q.from.id.0 as i64 {
        answer(&state, &q.id, Some("Unauthorized action."), chat_id).await;
        return Ok(());
    }

    let Some(message) = q.message.as_ref() else {
        warn!("callback query has no associated message");
        answer(&state, &q.id, Some("No message context found."), None).await;
        return Ok(());
    };
    let chat_id = ChatId(message.chat.id.0);
    let keyboard = MessageRef::new(chat_id, MessageId(message.id.0));

    let Some(option) = state.catalog.option(&selection.group, selection.index) else {
        answer(&state, &q.id, Some("Option not found."), Some(chat_id)).await;
        return Ok(());
    };

    let body = format!(
        "Hey {}, you selected: {}. Here's the link: {}",
        display_name(&q.from, "there"),
        option.name,
        option.url
    );
    state.send_disappearing(chat_id, &body).await;

    // The keyboard goes now; its timed deletion would only hit "not found".
    state.deletions.cancel(keyboard).await;
    if let Err(e) = state.messenger.delete_message(keyboard).await {
        state.report(e, Some(chat_id)).await;
    }

    answer(&state, &q.id, None, Some(chat_id)).await;
    Ok(())
}
