//! Telegram adapter.
//!
//! Implements the `relay-core` PlatformApi over the Bot API and serves the
//! webhook that feeds updates into the core router.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

pub mod server;
pub mod transport;

use relay_core::{
    domain::{ChatId, MessageId, MessageRef, TopicId},
    gateway::{RetryGateway, RetryPolicy, Transport},
    platform::{PlatformApi, Target, TextFormat},
    update::Chat,
    Result,
};

pub use transport::HttpTransport;

#[derive(Deserialize)]
struct ForumTopic {
    message_thread_id: i32,
}

#[derive(Deserialize)]
struct SentMessage {
    message_id: i32,
}

/// Bot API client. Every call goes through the retry gateway.
pub struct TelegramApi<T = HttpTransport> {
    gateway: RetryGateway<T>,
}

impl<T: Transport> TelegramApi<T> {
    pub fn new(transport: T, policy: RetryPolicy) -> Self {
        Self {
            gateway: RetryGateway::new(transport, policy),
        }
    }

    async fn call<R: for<'de> Deserialize<'de>>(&self, method: &str, payload: Value) -> Result<R> {
        let result = self.gateway.call(method, &payload).await?;
        Ok(serde_json::from_value(result)?)
    }

    fn with_target(mut payload: Value, target: Target) -> Value {
        payload["chat_id"] = json!(target.chat_id.0);
        if let Some(topic) = target.topic {
            payload["message_thread_id"] = json!(topic.0);
        }
        payload
    }
}

#[async_trait]
impl<T: Transport> PlatformApi for TelegramApi<T> {
    async fn get_chat(&self, chat_id: ChatId) -> Result<Chat> {
        self.call("getChat", json!({ "chat_id": chat_id.0 })).await
    }

    async fn create_forum_topic(&self, chat_id: ChatId, name: &str) -> Result<TopicId> {
        let topic: ForumTopic = self
            .call(
                "createForumTopic",
                json!({ "chat_id": chat_id.0, "name": name }),
            )
            .await?;
        Ok(TopicId(topic.message_thread_id))
    }

    async fn delete_forum_topic(&self, chat_id: ChatId, topic: TopicId) -> Result<()> {
        let _: bool = self
            .call(
                "deleteForumTopic",
                json!({ "chat_id": chat_id.0, "message_thread_id": topic.0 }),
            )
            .await?;
        Ok(())
    }

    async fn send_message(
        &self,
        target: Target,
        text: &str,
        format: TextFormat,
    ) -> Result<MessageRef> {
        let mut payload = Self::with_target(json!({ "text": text }), target);
        if format == TextFormat::Markdown {
            payload["parse_mode"] = json!("Markdown");
        }
        let sent: SentMessage = self.call("sendMessage", payload).await?;
        Ok(MessageRef {
            chat_id: target.chat_id,
            message_id: MessageId(sent.message_id),
        })
    }

    async fn copy_message(&self, target: Target, source: MessageRef) -> Result<MessageId> {
        let payload = Self::with_target(
            json!({
                "from_chat_id": source.chat_id.0,
                "message_id": source.message_id.0,
            }),
            target,
        );
        let copied: SentMessage = self.call("copyMessage", payload).await?;
        Ok(MessageId(copied.message_id))
    }

    async fn pin_message(&self, message: MessageRef) -> Result<()> {
        let _: bool = self
            .call(
                "pinChatMessage",
                json!({
                    "chat_id": message.chat_id.0,
                    "message_id": message.message_id.0,
                    "disable_notification": true,
                }),
            )
            .await?;
        Ok(())
    }
}
