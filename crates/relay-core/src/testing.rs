//! Shared fakes for unit tests.

use std::{
    collections::{HashMap, HashSet},
    net::SocketAddr,
    sync::{
        atomic::{AtomicI32, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;

use crate::{
    config::{Config, DEFAULT_WELCOME_TEXT},
    directory::TopicDirectory,
    domain::{ChatId, MessageId, MessageRef, TopicId},
    errors::Error,
    platform::{PlatformApi, Target, TextFormat},
    store::MemoryStore,
    update::Chat,
    Result,
};

pub const GROUP: ChatId = ChatId(-100_777);

pub fn test_config() -> Arc<Config> {
    Arc::new(Config {
        telegram_bot_token: "x".to_string(),
        staff_group_id: GROUP,
        telegram_api_base: "http://127.0.0.1:1".to_string(),
        listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
        webhook_path: "/webhook".to_string(),
        webhook_secret: None,
        store_path: None,
        welcome_text: DEFAULT_WELCOME_TEXT.to_string(),
        retry_max_attempts: 3,
        retry_base_delay: Duration::from_millis(1),
        http_timeout: Duration::from_secs(1),
        handler_deadline: Duration::from_secs(5),
    })
}

pub fn memory_directory() -> Arc<TopicDirectory> {
    Arc::new(TopicDirectory::new(Arc::new(MemoryStore::default())))
}

pub fn private_chat(id: i64, first_name: &str) -> Chat {
    Chat {
        id,
        kind: "private".to_string(),
        first_name: Some(first_name.to_string()),
        ..Chat::default()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    GetChat(ChatId),
    CreateTopic { chat: ChatId, name: String },
    DeleteTopic { chat: ChatId, topic: TopicId },
    Send { target: Target, text: String, format: TextFormat },
    Copy { target: Target, source: MessageRef },
    Pin(MessageRef),
}

/// Records every platform call; individual methods can be made to fail.
#[derive(Default)]
pub struct FakePlatform {
    calls: Mutex<Vec<Call>>,
    failing: Mutex<HashSet<&'static str>>,
    stalled: Mutex<HashSet<&'static str>>,
    profiles: Mutex<HashMap<i64, Chat>>,
    next_topic: AtomicI32,
    next_message: AtomicI32,
}

impl FakePlatform {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make `method` (e.g. `"send_message"`) return a platform error.
    pub fn fail(&self, method: &'static str) {
        self.failing.lock().unwrap().insert(method);
    }

    /// Make `method` never complete.
    pub fn stall(&self, method: &'static str) {
        self.stalled.lock().unwrap().insert(method);
    }

    pub fn with_profile(&self, chat: Chat) {
        self.profiles.lock().unwrap().insert(chat.id, chat);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| pred(c)).count()
    }

    pub fn topics_created(&self) -> usize {
        self.count(|c| matches!(c, Call::CreateTopic { .. }))
    }

    async fn record(&self, method: &'static str, call: Call) -> Result<()> {
        self.calls.lock().unwrap().push(call);
        let stalled = self.stalled.lock().unwrap().contains(method);
        if stalled {
            std::future::pending::<()>().await;
        }
        if self.failing.lock().unwrap().contains(method) {
            return Err(Error::Platform {
                description: format!("{method} failed"),
            });
        }
        Ok(())
    }

    fn next_message_id(&self) -> MessageId {
        MessageId(1000 + self.next_message.fetch_add(1, Ordering::SeqCst))
    }
}

#[async_trait]
impl PlatformApi for FakePlatform {
    async fn get_chat(&self, chat_id: ChatId) -> Result<Chat> {
        self.record("get_chat", Call::GetChat(chat_id)).await?;
        let known = self.profiles.lock().unwrap().get(&chat_id.0).cloned();
        Ok(known.unwrap_or_else(|| private_chat(chat_id.0, &format!("User{}", chat_id.0))))
    }

    async fn create_forum_topic(&self, chat_id: ChatId, name: &str) -> Result<TopicId> {
        // Let concurrent callers interleave here.
        tokio::task::yield_now().await;
        self.record(
            "create_forum_topic",
            Call::CreateTopic {
                chat: chat_id,
                name: name.to_string(),
            },
        )
        .await?;
        Ok(TopicId(100 + self.next_topic.fetch_add(1, Ordering::SeqCst)))
    }

    async fn delete_forum_topic(&self, chat_id: ChatId, topic: TopicId) -> Result<()> {
        self.record(
            "delete_forum_topic",
            Call::DeleteTopic {
                chat: chat_id,
                topic,
            },
        )
        .await
    }

    async fn send_message(
        &self,
        target: Target,
        text: &str,
        format: TextFormat,
    ) -> Result<MessageRef> {
        self.record(
            "send_message",
            Call::Send {
                target,
                text: text.to_string(),
                format,
            },
        )
        .await?;
        Ok(MessageRef {
            chat_id: target.chat_id,
            message_id: self.next_message_id(),
        })
    }

    async fn copy_message(&self, target: Target, source: MessageRef) -> Result<MessageId> {
        self.record("copy_message", Call::Copy { target, source }).await?;
        Ok(self.next_message_id())
    }

    async fn pin_message(&self, message: MessageRef) -> Result<()> {
        self.record("pin_message", Call::Pin(message)).await
    }
}
