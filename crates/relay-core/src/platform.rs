use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageId, MessageRef, TopicId},
    update::Chat,
    Result,
};

/// Destination of an outbound message: a chat, optionally narrowed to a topic.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Target {
    pub chat_id: ChatId,
    pub topic: Option<TopicId>,
}

impl Target {
    pub fn chat(chat_id: ChatId) -> Self {
        Self {
            chat_id,
            topic: None,
        }
    }

    pub fn topic(chat_id: ChatId, topic: TopicId) -> Self {
        Self {
            chat_id,
            topic: Some(topic),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextFormat {
    Plain,
    Markdown,
}

/// Hexagonal port for the messaging platform.
///
/// Implementations are expected to apply their own retry discipline (the
/// Telegram adapter routes every call through `gateway::RetryGateway`).
#[async_trait]
pub trait PlatformApi: Send + Sync {
    async fn get_chat(&self, chat_id: ChatId) -> Result<Chat>;

    async fn create_forum_topic(&self, chat_id: ChatId, name: &str) -> Result<TopicId>;

    async fn delete_forum_topic(&self, chat_id: ChatId, topic: TopicId) -> Result<()>;

    async fn send_message(&self, target: Target, text: &str, format: TextFormat)
        -> Result<MessageRef>;

    /// Content-preserving copy of `source` into `target`.
    async fn copy_message(&self, target: Target, source: MessageRef) -> Result<MessageId>;

    async fn pin_message(&self, message: MessageRef) -> Result<()>;
}
