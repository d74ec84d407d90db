use std::sync::Arc;

use teloxide::{prelude::*, types::User};
use tracing::{debug, warn};

use snb_core::{
    content::{fact_greeting, OptionSelection, COMMAND_LIST},
    domain::{ChatId, MessageId, MessageRef, UserId},
    formatting::mention_html,
    messaging::types::{InlineButton, InlineKeyboard, TextFormat},
    poll::{parse_poll_command, POLL_USAGE},
};

use crate::router::AppState;

fn parse_command(text: &str) -> (String, String) {
    // Telegram may send `/cmd@botname arg1 ...`
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    (cmd, rest)
}

pub(crate) fn display_name(user: &User, fallback: &str) -> String {
    if !user.first_name.is_empty() {
        return user.first_name.clone();
    }
    user.username
        .clone()
        .unwrap_or_else(|| fallback.to_string())
}

pub async fn handle_command(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let Some(text) = msg.text() else {
        return Ok(());
    };

    let chat_id = ChatId(msg.chat.id.0);
    let command = MessageRef::new(chat_id, MessageId(msg.id.0));
    let user_name = display_name(user, "there");

    let (cmd, arg) = parse_command(text);
    debug!(command = %cmd, chat_id = chat_id.0, "command received");

    match cmd.as_str() {
        "help" => {
            state.deletions.delete_command(command).await;
            let body = format!(
                "Hello {user_name}! Here are the commands you can use:\n{COMMAND_LIST}"
            );
            state.send_disappearing(chat_id, &body).await;
        }

        "snails" => {
            state.deletions.delete_command(command).await;
            let Some(fact) = state.catalog.random_fact() else {
                return Ok(());
            };
            let body = fact_greeting(&user_name, fact);
            if let Err(e) = state
                .messenger
                .send_message(chat_id, &body, TextFormat::Plain)
                .await
            {
                state.report(e, Some(chat_id)).await;
            }
        }

        "socials" => {
            state.deletions.delete_command(command).await;
            let links = state
                .catalog
                .socials
                .iter()
                .map(|l| format!("{}: {}", l.name, l.url))
                .collect::<Vec<_>>()
                .join("\n");
            let body = format!("Hey {user_name}, here are our social media links:\n\n{links}");
            state.send_disappearing(chat_id, &body).await;
        }

        "search" => {
            state.deletions.delete_command(command).await;
            handle_search(&state, chat_id, user, &user_name, &arg).await;
        }

        "poll" => {
            let poll_name = display_name(user, "User");
            handle_poll(&state, chat_id, command, user, &poll_name, &arg).await;
        }

        _ => {}
    }

    Ok(())
}

async fn handle_search(
    state: &AppState,
    chat_id: ChatId,
    user: &User,
    user_name: &str,
    query: &str,
) {
    let query = query.trim();
    if query.is_empty() {
        let body = format!(
            "Sorry {user_name}, you didn't provide a search query. Please use: /search [query]"
        );
        state.send_disappearing(chat_id, &body).await;
        return;
    }

    if let Some(object) = state.catalog.find_object(query) {
        let body = format!(
            "Hello {user_name}, you selected: {}. Here's the link: {}",
            object.name, object.url
        );
        state.send_disappearing(chat_id, &body).await;
        return;
    }

    let Some(group) = state.catalog.find_group(query) else {
        let body = format!(
            "Sorry {user_name}, no matching object found for \"{}\". Please try again.",
            query.to_lowercase()
        );
        state.send_disappearing(chat_id, &body).await;
        return;
    };

    let initiator = user.id.0 as i64;
    let buttons = group
        .options
        .iter()
        .enumerate()
        .map(|(index, option)| InlineButton {
            label: option.name.clone(),
            callback_data: OptionSelection {
                group: group.name.clone(),
                index,
                initiator,
            }
            .encode(),
        })
        .collect();

    let body = format!("Hey {user_name}, please choose an option from the list below:");
    match state
        .messenger
        .send_inline_keyboard(chat_id, &body, InlineKeyboard::new(buttons))
        .await
    {
        Ok(sent) => {
            state.deletions.enqueue(sent, state.cfg.message_ttl).await;
        }
        Err(e) => state.report(e, Some(chat_id)).await,
    }
}

async fn handle_poll(
    state: &AppState,
    chat_id: ChatId,
    command: MessageRef,
    user: &User,
    user_name: &str,
    arg: &str,
) {
    let user_id = user.id.0 as i64;
    let notice_ttl = state.cfg.notice_ttl;

    let is_admin = match state.messenger.member_role(chat_id, UserId(user_id)).await {
        Ok(role) => role.is_admin(),
        Err(e) => {
            warn!(chat_id = chat_id.0, user_id, error = %e, "admin check failed");
            false
        }
    };

    if !is_admin {
        let body = format!(
            "❌ {}, you do not have the necessary permissions to create a poll.",
            mention_html(user_id, user_name)
        );
        match state
            .messenger
            .send_message(chat_id, &body, TextFormat::Html)
            .await
        {
            Ok(notice) => {
                state.deletions.enqueue(notice, notice_ttl).await;
            }
            Err(e) => state.report(e, Some(chat_id)).await,
        }
        state.deletions.enqueue(command, notice_ttl).await;
        return;
    }

    let poll = match parse_poll_command(arg) {
        Ok(poll) => poll,
        Err(e) => {
            debug!(chat_id = chat_id.0, error = %e, "rejected poll command");
            match state
                .messenger
                .send_message(chat_id, POLL_USAGE, TextFormat::Plain)
                .await
            {
                Ok(usage) => {
                    state.deletions.enqueue(usage, notice_ttl).await;
                }
                Err(e) => state.report(e, Some(chat_id)).await,
            }
            state.deletions.enqueue(command, notice_ttl).await;
            return;
        }
    };

    if let Err(e) = state.messenger.send_poll(chat_id, &poll).await {
        state.report(e, Some(chat_id)).await;
        return;
    }
    state
        .deletions
        .enqueue(command, state.cfg.poll_command_delete_delay)
        .await;
}
