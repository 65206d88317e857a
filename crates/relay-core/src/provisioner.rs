//! First-contact provisioning: one forum topic plus a pinned identity banner.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::{
    config::Config,
    directory::TopicDirectory,
    domain::{ChatId, TopicId, UserId},
    errors::Error,
    formatting::{banner_text, topic_name},
    platform::{PlatformApi, Target, TextFormat},
    update::Chat,
    Result,
};

#[derive(Clone, Debug)]
pub struct Provisioned {
    pub topic: TopicId,
    pub profile: Chat,
}

pub struct TopicProvisioner {
    cfg: Arc<Config>,
    platform: Arc<dyn PlatformApi>,
    directory: Arc<TopicDirectory>,
}

impl TopicProvisioner {
    pub fn new(
        cfg: Arc<Config>,
        platform: Arc<dyn PlatformApi>,
        directory: Arc<TopicDirectory>,
    ) -> Self {
        Self {
            cfg,
            platform,
            directory,
        }
    }

    /// Create, announce and record a topic for `user`.
    ///
    /// The mapping is only written once the banner is pinned. A topic whose
    /// banner could not be posted or pinned, or whose mapping could not be
    /// recorded, is deleted again before the error is returned. The same
    /// happens when this future is dropped before the mapping is written.
    pub async fn provision(&self, user: UserId) -> Result<Provisioned> {
        let profile = self.platform.get_chat(user.chat()).await?;
        let group = self.cfg.staff_group_id;

        let topic = self
            .platform
            .create_forum_topic(group, &topic_name(&profile.display_name()))
            .await?;
        info!(%user, %topic, "created topic");
        let pending = PendingTopic::new(self.platform.clone(), group, topic);

        if let Err(e) = self.post_banner(&profile, user, topic).await {
            warn!(%user, %topic, error = %e, "banner failed; removing orphaned topic");
            pending.discard().await;
            return Err(e);
        }

        // Recording runs to completion even if we are cancelled, so the topic
        // is handed over before it starts.
        pending.keep();
        let directory = self.directory.clone();
        let recorded = tokio::spawn(async move { directory.record(user, topic).await })
            .await
            .map_err(|e| Error::External(format!("record task failed: {e}")))
            .and_then(|r| r);

        match recorded {
            Ok(()) => {}
            Err(Error::Conflict { existing, .. }) => {
                // Someone else provisioned this user in the meantime; theirs wins.
                info!(%user, %topic, %existing, "user already mapped; discarding new topic");
                delete_topic(self.platform.as_ref(), group, topic).await;
                return Ok(Provisioned {
                    topic: existing,
                    profile,
                });
            }
            Err(e) => {
                delete_topic(self.platform.as_ref(), group, topic).await;
                return Err(e);
            }
        }

        if let Err(e) = self
            .platform
            .send_message(
                Target::chat(user.chat()),
                &self.cfg.welcome_text,
                TextFormat::Plain,
            )
            .await
        {
            warn!(%user, error = %e, "welcome message failed");
        }

        Ok(Provisioned { topic, profile })
    }

    async fn post_banner(&self, profile: &Chat, user: UserId, topic: TopicId) -> Result<()> {
        let banner = self
            .platform
            .send_message(
                Target::topic(self.cfg.staff_group_id, topic),
                &banner_text(profile, user, Utc::now()),
                TextFormat::Markdown,
            )
            .await?;
        self.platform.pin_message(banner).await
    }
}

async fn delete_topic(platform: &dyn PlatformApi, group: ChatId, topic: TopicId) {
    if let Err(e) = platform.delete_forum_topic(group, topic).await {
        warn!(%topic, error = %e, "could not delete orphaned topic");
    }
}

/// A created topic not yet handed to the directory.
///
/// Dropped while still held (provisioning cancelled, e.g. by the handler
/// deadline), it deletes the topic on a background task.
struct PendingTopic {
    platform: Arc<dyn PlatformApi>,
    group: ChatId,
    topic: Option<TopicId>,
}

impl PendingTopic {
    fn new(platform: Arc<dyn PlatformApi>, group: ChatId, topic: TopicId) -> Self {
        Self {
            platform,
            group,
            topic: Some(topic),
        }
    }

    fn keep(mut self) {
        self.topic = None;
    }

    async fn discard(mut self) {
        if let Some(topic) = self.topic.take() {
            delete_topic(self.platform.as_ref(), self.group, topic).await;
        }
    }
}

impl Drop for PendingTopic {
    fn drop(&mut self) {
        let Some(topic) = self.topic.take() else {
            return;
        };
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            error!(%topic, "provisioning abandoned outside a runtime; topic left orphaned");
            return;
        };
        warn!(%topic, "provisioning abandoned; removing orphaned topic");
        let platform = self.platform.clone();
        let group = self.group;
        handle.spawn(async move { delete_topic(platform.as_ref(), group, topic).await });
    }
}
