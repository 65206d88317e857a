//! Classifies inbound updates and dispatches them to the right relay action.

use std::{collections::HashMap, sync::Arc};

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::{
    config::Config,
    directory::TopicDirectory,
    domain::{ChatId, TopicId, UserId},
    forwarder::MessageForwarder,
    platform::{PlatformApi, Target, TextFormat},
    provisioner::TopicProvisioner,
    update::{CallbackQuery, Message, Update},
    Result,
};

pub const START_COMMAND: &str = "/start";

#[derive(Clone, Debug)]
pub enum InboundEvent {
    /// `/start` in a private chat.
    Start { chat: ChatId },
    /// Message inside a topic of the staff group.
    StaffReply { topic: TopicId, message: Message },
    /// Anything else that carries a message.
    UserMessage { message: Message },
    CallbackQuery(CallbackQuery),
    /// Staff-group service notice (topic created, message pinned, ...).
    Service { message: Message },
    Unsupported,
}

pub fn classify(update: Update, group: ChatId) -> InboundEvent {
    if let Some(message) = update.message {
        if message.chat.is_private() && message.text.as_deref() == Some(START_COMMAND) {
            return InboundEvent::Start {
                chat: message.chat_id(),
            };
        }
        if message.chat_id() == group {
            if message.is_service() {
                return InboundEvent::Service { message };
            }
            if let Some(topic) = message.topic() {
                return InboundEvent::StaffReply { topic, message };
            }
        }
        return InboundEvent::UserMessage { message };
    }
    match update.callback_query {
        Some(q) => InboundEvent::CallbackQuery(q),
        None => InboundEvent::Unsupported,
    }
}

/// Per-user async mutexes serializing first-contact provisioning.
#[derive(Default)]
pub struct UserLocks {
    inner: Mutex<HashMap<UserId, Arc<Mutex<()>>>>,
}

impl UserLocks {
    pub async fn lock_user(&self, user: UserId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            map.entry(user)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Forget `user`'s mutex once nobody holds or waits on it.
    pub async fn release(&self, user: UserId) {
        let mut map = self.inner.lock().await;
        if map.get(&user).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            map.remove(&user);
        }
    }

    #[cfg(test)]
    async fn tracked(&self) -> usize {
        self.inner.lock().await.len()
    }
}

pub struct Router {
    cfg: Arc<Config>,
    platform: Arc<dyn PlatformApi>,
    directory: Arc<TopicDirectory>,
    provisioner: TopicProvisioner,
    forwarder: MessageForwarder,
    locks: UserLocks,
}

impl Router {
    pub fn new(
        cfg: Arc<Config>,
        platform: Arc<dyn PlatformApi>,
        directory: Arc<TopicDirectory>,
    ) -> Self {
        Self {
            provisioner: TopicProvisioner::new(cfg.clone(), platform.clone(), directory.clone()),
            forwarder: MessageForwarder::new(platform.clone(), cfg.staff_group_id),
            locks: UserLocks::default(),
            cfg,
            platform,
            directory,
        }
    }

    pub async fn handle_update(&self, update: Update) -> Result<()> {
        let event = classify(update, self.cfg.staff_group_id);
        self.handle_event(event).await
    }

    pub async fn handle_event(&self, event: InboundEvent) -> Result<()> {
        match event {
            InboundEvent::Start { chat } => {
                self.platform
                    .send_message(Target::chat(chat), &self.cfg.welcome_text, TextFormat::Plain)
                    .await?;
                Ok(())
            }
            InboundEvent::StaffReply { topic, message } => {
                match self.directory.lookup_user(topic).await? {
                    Some(user) => {
                        debug!(%topic, %user, "relaying staff reply");
                        self.forwarder.to_user(user, &message).await
                    }
                    None => {
                        warn!(%topic, "no user mapped to topic; treating group as sender");
                        self.relay_from_user(&message).await
                    }
                }
            }
            InboundEvent::UserMessage { message } => {
                if message.chat_id() == self.cfg.staff_group_id {
                    warn!("group message outside any topic; treating group as sender");
                }
                self.relay_from_user(&message).await
            }
            InboundEvent::CallbackQuery(q) => {
                debug!(callback_id = %q.id, "ignoring callback query");
                Ok(())
            }
            InboundEvent::Service { message } => {
                debug!(message_id = message.message_id, "ignoring service message");
                Ok(())
            }
            InboundEvent::Unsupported => {
                debug!("ignoring update without message");
                Ok(())
            }
        }
    }

    async fn relay_from_user(&self, message: &Message) -> Result<()> {
        let user = UserId(message.chat.id);
        let topic = self.resolve_topic(user).await?;
        self.forwarder
            .to_topic(&message.chat.display_name(), topic, message)
            .await
    }

    async fn resolve_topic(&self, user: UserId) -> Result<TopicId> {
        if let Some(topic) = self.directory.lookup_topic(user).await? {
            return Ok(topic);
        }

        let topic = {
            let _guard = self.locks.lock_user(user).await;
            self.provision_if_unmapped(user).await
        };
        self.locks.release(user).await;
        topic
    }

    async fn provision_if_unmapped(&self, user: UserId) -> Result<TopicId> {
        // Re-check: a concurrent delivery may have provisioned while we waited.
        if let Some(topic) = self.directory.lookup_topic(user).await? {
            return Ok(topic);
        }

        info!(%user, "first contact; provisioning topic");
        Ok(self.provisioner.provision(user).await?.topic)
    }
}
