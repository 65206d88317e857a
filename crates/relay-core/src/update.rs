//! Inbound webhook payload.
//!
//! Only the subset of Telegram's `Update` object the relay reads is modelled;
//! unknown fields are ignored, except that a message keeps its remaining fields
//! in `extra` so service notices can be told apart from relayable content.

use serde::Deserialize;

use crate::domain::{ChatId, MessageId, MessageRef, TopicId};

/// Message fields that mark a group service notice rather than content.
const SERVICE_FIELDS: &[&str] = &[
    "forum_topic_created",
    "forum_topic_edited",
    "forum_topic_closed",
    "forum_topic_reopened",
    "general_forum_topic_hidden",
    "general_forum_topic_unhidden",
    "pinned_message",
    "new_chat_members",
    "left_chat_member",
    "new_chat_title",
    "new_chat_photo",
    "delete_chat_photo",
];

#[derive(Clone, Debug, Deserialize)]
pub struct Update {
    #[serde(default)]
    pub update_id: i64,
    pub message: Option<Message>,
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Message {
    pub message_id: i32,
    pub message_thread_id: Option<i32>,
    pub chat: Chat,
    pub from: Option<User>,
    pub text: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Message {
    pub fn chat_id(&self) -> ChatId {
        ChatId(self.chat.id)
    }

    pub fn msg_ref(&self) -> MessageRef {
        MessageRef {
            chat_id: self.chat_id(),
            message_id: MessageId(self.message_id),
        }
    }

    pub fn topic(&self) -> Option<TopicId> {
        self.message_thread_id.map(TopicId)
    }

    pub fn is_service(&self) -> bool {
        SERVICE_FIELDS.iter().any(|f| self.extra.contains_key(*f))
    }
}

/// A chat as seen in updates and as returned by `getChat`.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct Chat {
    pub id: i64,
    #[serde(rename = "type", default)]
    pub kind: String,
    pub title: Option<String>,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl Chat {
    pub fn is_private(&self) -> bool {
        self.kind == "private"
    }

    /// `first last` for people, the title for groups, the id as a last resort.
    pub fn display_name(&self) -> String {
        let name = format!(
            "{} {}",
            self.first_name.as_deref().unwrap_or(""),
            self.last_name.as_deref().unwrap_or("")
        );
        let name = name.trim();
        if !name.is_empty() {
            return name.to_string();
        }
        match self.title.as_deref().map(str::trim) {
            Some(title) if !title.is_empty() => title.to_string(),
            _ => self.id.to_string(),
        }
    }

    /// Public handle, or the display name when the chat has none.
    pub fn handle(&self) -> String {
        match self.username.as_deref() {
            Some(u) if !u.is_empty() => u.to_string(),
            _ => self.display_name(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    pub data: Option<String>,
}
