use chrono::{DateTime, Utc};

use crate::{domain::UserId, update::Chat};

/// Separator between the sender header and the relayed text.
pub const SEPARATOR: &str = "------------------------------------------------";

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Telegram rejects forum topic names longer than this.
pub const MAX_TOPIC_NAME_CHARS: usize = 128;

/// Escape the characters legacy Telegram Markdown treats as markup.
pub fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '_' | '*' | '`' | '[') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Escape text that sits inside a `*bold*` entity.
///
/// Legacy Markdown does not allow escapes inside an entity, so a `*` closes the
/// entity, emits an escaped star and reopens it. Other markup characters are
/// literal there.
pub fn escape_markdown_bold(text: &str) -> String {
    text.replace('*', "*\\**")
}

/// Text relayed from a private user into their topic.
pub fn user_text(display_name: &str, text: &str) -> String {
    format!(
        "*{}:*\n{SEPARATOR}\n\n{}",
        escape_markdown_bold(display_name),
        escape_markdown(text)
    )
}

/// Identity banner pinned at the top of a freshly created topic.
pub fn banner_text(profile: &Chat, user: UserId, at: DateTime<Utc>) -> String {
    format!(
        "Nickname: {}\nUsername: {}\nUserID: {}\nStarted: {}",
        escape_markdown(&profile.display_name()),
        escape_markdown(&profile.handle()),
        user,
        at.format(TIMESTAMP_FORMAT)
    )
}

pub fn topic_name(display_name: &str) -> String {
    display_name.chars().take(MAX_TOPIC_NAME_CHARS).collect()
}
