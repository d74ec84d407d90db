pub use crate::poll::PollRequest;

/// How the transport should render outgoing text.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextFormat {
    Plain,
    Html,
}

/// Inline keyboard laid out one button per row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineKeyboard {
    pub buttons: Vec<InlineButton>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineButton {
    pub label: String,
    pub callback_data: String,
}

impl InlineKeyboard {
    pub fn new(buttons: Vec<InlineButton>) -> Self {
        Self { buttons }
    }
}

/// Coarse membership status; only admin-ness matters to the bot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatMemberRole {
    Owner,
    Administrator,
    Member,
}

impl ChatMemberRole {
    pub fn is_admin(self) -> bool {
        matches!(self, Self::Owner | Self::Administrator)
    }
}
