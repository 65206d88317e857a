use std::sync::Arc;

use crate::{
    domain::{ChatId, TopicId, UserId},
    formatting::user_text,
    platform::{PlatformApi, Target, TextFormat},
    update::Message,
    Result,
};

/// Relays message content between private chats and topics.
///
/// Exactly one platform call per forwarded message.
pub struct MessageForwarder {
    platform: Arc<dyn PlatformApi>,
    group: ChatId,
}

impl MessageForwarder {
    pub fn new(platform: Arc<dyn PlatformApi>, group: ChatId) -> Self {
        Self { platform, group }
    }

    /// Private user -> their topic. Text gets a sender header; anything else is
    /// copied so media and captions are preserved.
    pub async fn to_topic(&self, sender: &str, topic: TopicId, message: &Message) -> Result<()> {
        let target = Target::topic(self.group, topic);
        match message.text.as_deref() {
            Some(text) => {
                self.platform
                    .send_message(target, &user_text(sender, text), TextFormat::Markdown)
                    .await?;
            }
            None => {
                self.platform.copy_message(target, message.msg_ref()).await?;
            }
        }
        Ok(())
    }

    /// Staff reply -> private chat, verbatim.
    pub async fn to_user(&self, user: UserId, message: &Message) -> Result<()> {
        self.platform
            .copy_message(Target::chat(user.chat()), message.msg_ref())
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MessageId, MessageRef};
    use crate::formatting::SEPARATOR;
    use crate::testing::{private_chat, Call, FakePlatform, GROUP};

    fn message(chat: crate::update::Chat, text: Option<&str>) -> Message {
        Message {
            message_id: 55,
            message_thread_id: None,
            chat,
            from: None,
            text: text.map(str::to_string),
            extra: Default::default(),
        }
    }

    #[tokio::test]
    async fn text_goes_out_as_markdown_with_header() {
        let platform = FakePlatform::new();
        let fwd = MessageForwarder::new(platform.clone(), GROUP);

        fwd.to_topic("Ada", TopicId(9), &message(private_chat(42, "Ada"), Some("hi")))
            .await
            .unwrap();

        assert_eq!(
            platform.calls(),
            vec![Call::Send {
                target: Target::topic(GROUP, TopicId(9)),
                text: format!("*Ada:*\n{SEPARATOR}\n\nhi"),
                format: TextFormat::Markdown,
            }]
        );
    }

    #[tokio::test]
    async fn media_is_copied_into_topic() {
        let platform = FakePlatform::new();
        let fwd = MessageForwarder::new(platform.clone(), GROUP);

        fwd.to_topic("Ada", TopicId(9), &message(private_chat(42, "Ada"), None))
            .await
            .unwrap();

        assert_eq!(
            platform.calls(),
            vec![Call::Copy {
                target: Target::topic(GROUP, TopicId(9)),
                source: MessageRef {
                    chat_id: ChatId(42),
                    message_id: MessageId(55),
                },
            }]
        );
    }

    #[tokio::test]
    async fn staff_reply_is_copied_to_private_chat() {
        let platform = FakePlatform::new();
        let fwd = MessageForwarder::new(platform.clone(), GROUP);
        let staff = crate::update::Chat {
            id: GROUP.0,
            kind: "supergroup".to_string(),
            ..Default::default()
        };

        fwd.to_user(UserId(42), &message(staff, Some("thanks!")))
            .await
            .unwrap();

        assert_eq!(
            platform.calls(),
            vec![Call::Copy {
                target: Target::chat(ChatId(42)),
                source: MessageRef {
                    chat_id: GROUP,
                    message_id: MessageId(55),
                },
            }]
        );
    }
}
