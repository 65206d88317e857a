//! Bidirectional user <-> topic mapping on top of a `KvStore`.
//!
//! Each entry is two records, `user:<id> -> <topic>` and `topic:<id> -> <user>`.
//! `record` is the only writer and keeps them in agreement.

use std::sync::Arc;

use tracing::{error, warn};

use crate::{
    domain::{TopicId, UserId},
    errors::Error,
    store::KvStore,
    Result,
};

const REVERSE_WRITE_ATTEMPTS: u32 = 3;

pub struct TopicDirectory {
    store: Arc<dyn KvStore>,
}

fn user_key(user: UserId) -> String {
    format!("user:{user}")
}

fn topic_key(topic: TopicId) -> String {
    format!("topic:{topic}")
}

fn parse_id<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| Error::Store(format!("non-numeric value under {key}: {raw:?}")))
}

impl TopicDirectory {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    pub async fn lookup_topic(&self, user: UserId) -> Result<Option<TopicId>> {
        let key = user_key(user);
        self.store
            .get(&key)
            .await?
            .map(|raw| parse_id(&key, &raw).map(TopicId))
            .transpose()
    }

    pub async fn lookup_user(&self, topic: TopicId) -> Result<Option<UserId>> {
        let key = topic_key(topic);
        self.store
            .get(&key)
            .await?
            .map(|raw| parse_id(&key, &raw).map(UserId))
            .transpose()
    }

    /// Write both directions of `(user, topic)`.
    ///
    /// The forward record is a conditional insert: a user already mapped to a
    /// different topic yields `Error::Conflict` and nothing is written. If the
    /// reverse record cannot be written the forward record is removed again,
    /// but only when this call inserted it.
    pub async fn record(&self, user: UserId, topic: TopicId) -> Result<()> {
        let forward = user_key(user);
        let inserted = match self
            .store
            .put_if_absent(&forward, &topic.to_string())
            .await?
        {
            None => true,
            Some(raw) => {
                let existing = TopicId(parse_id(&forward, &raw)?);
                if existing != topic {
                    return Err(Error::Conflict { user, existing });
                }
                // Same pair: (re)write the reverse record, keep the forward one.
                false
            }
        };

        let reverse = topic_key(topic);
        let mut attempt = 1;
        let err = loop {
            match self.store.put(&reverse, &user.to_string()).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < REVERSE_WRITE_ATTEMPTS => {
                    warn!(%user, %topic, attempt, error = %e, "reverse mapping write failed; retrying");
                    attempt += 1;
                }
                Err(e) => break e,
            }
        };

        if !inserted {
            return Err(err);
        }
        if let Err(rollback) = self.store.delete(&forward).await {
            error!(%user, %topic, error = %rollback, "rollback of forward mapping failed; directory is inconsistent");
        }
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `failures` writes to `topic:` keys.
    struct FlakyStore {
        inner: MemoryStore,
        failures: AtomicU32,
    }

    impl FlakyStore {
        fn new(failures: u32) -> Self {
            Self {
                inner: MemoryStore::default(),
                failures: AtomicU32::new(failures),
            }
        }
    }

    #[async_trait]
    impl KvStore for FlakyStore {
        async fn get(&self, key: &str) -> Result<Option<String>> {
            self.inner.get(key).await
        }

        async fn put(&self, key: &str, value: &str) -> Result<()> {
            if key.starts_with("topic:")
                && self
                    .failures
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok()
            {
                return Err(Error::Store("injected failure".to_string()));
            }
            self.inner.put(key, value).await
        }

        async fn put_if_absent(&self, key: &str, value: &str) -> Result<Option<String>> {
            self.inner.put_if_absent(key, value).await
        }

        async fn delete(&self, key: &str) -> Result<()> {
            self.inner.delete(key).await
        }
    }

    impl FlakyStore {
        fn fail_next(&self, failures: u32) {
            self.failures.store(failures, Ordering::SeqCst);
        }
    }

    fn directory() -> TopicDirectory {
        TopicDirectory::new(Arc::new(MemoryStore::default()))
    }

    #[tokio::test]
    async fn recorded_pairs_resolve_both_ways() {
        let dir = directory();
        let pairs = [(UserId(1), TopicId(10)), (UserId(2), TopicId(20)), (UserId(30), TopicId(3))];

        for (u, t) in pairs {
            dir.record(u, t).await.unwrap();
            assert_eq!(dir.lookup_topic(u).await.unwrap(), Some(t));
            assert_eq!(dir.lookup_user(t).await.unwrap(), Some(u));
        }
        for (u, t) in pairs {
            assert_eq!(dir.lookup_topic(u).await.unwrap(), Some(t));
            assert_eq!(dir.lookup_user(t).await.unwrap(), Some(u));
        }
    }

    #[tokio::test]
    async fn unknown_ids_are_absent() {
        let dir = directory();
        assert_eq!(dir.lookup_topic(UserId(1)).await.unwrap(), None);
        assert_eq!(dir.lookup_user(TopicId(1)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn user_and_topic_with_same_digits_do_not_collide() {
        let dir = directory();
        dir.record(UserId(7), TopicId(8)).await.unwrap();
        dir.record(UserId(8), TopicId(7)).await.unwrap();

        assert_eq!(dir.lookup_topic(UserId(7)).await.unwrap(), Some(TopicId(8)));
        assert_eq!(dir.lookup_user(TopicId(7)).await.unwrap(), Some(UserId(8)));
    }

    #[tokio::test]
    async fn second_topic_for_same_user_conflicts() {
        let dir = directory();
        dir.record(UserId(1), TopicId(10)).await.unwrap();

        let err = dir.record(UserId(1), TopicId(11)).await.unwrap_err();

        assert!(matches!(
            err,
            Error::Conflict {
                user: UserId(1),
                existing: TopicId(10)
            }
        ));
        assert_eq!(dir.lookup_user(TopicId(11)).await.unwrap(), None);
        assert_eq!(dir.lookup_topic(UserId(1)).await.unwrap(), Some(TopicId(10)));
    }

    #[tokio::test]
    async fn re_recording_same_pair_is_idempotent() {
        let dir = directory();
        dir.record(UserId(1), TopicId(10)).await.unwrap();
        dir.record(UserId(1), TopicId(10)).await.unwrap();
        assert_eq!(dir.lookup_user(TopicId(10)).await.unwrap(), Some(UserId(1)));
    }

    #[tokio::test]
    async fn transient_reverse_failure_is_retried() {
        let dir = TopicDirectory::new(Arc::new(FlakyStore::new(2)));

        dir.record(UserId(1), TopicId(10)).await.unwrap();

        assert_eq!(dir.lookup_topic(UserId(1)).await.unwrap(), Some(TopicId(10)));
        assert_eq!(dir.lookup_user(TopicId(10)).await.unwrap(), Some(UserId(1)));
    }

    #[tokio::test]
    async fn persistent_reverse_failure_rolls_back_forward_record() {
        let dir = TopicDirectory::new(Arc::new(FlakyStore::new(REVERSE_WRITE_ATTEMPTS)));

        let err = dir.record(UserId(1), TopicId(10)).await.unwrap_err();

        assert!(matches!(err, Error::Store(_)));
        assert_eq!(dir.lookup_topic(UserId(1)).await.unwrap(), None);
        assert_eq!(dir.lookup_user(TopicId(10)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn garbage_value_is_a_store_error() {
        let store = Arc::new(MemoryStore::default());
        store.put("user:1", "not-a-number").await.unwrap();
        let dir = TopicDirectory::new(store);

        assert!(matches!(
            dir.lookup_topic(UserId(1)).await,
            Err(Error::Store(_))
        ));
    }

    #[tokio::test]
    async fn failed_repair_keeps_existing_pair() {
        let store = Arc::new(FlakyStore::new(0));
        let dir = TopicDirectory::new(store.clone());
        dir.record(UserId(1), TopicId(10)).await.unwrap();

        store.fail_next(REVERSE_WRITE_ATTEMPTS);
        let err = dir.record(UserId(1), TopicId(10)).await.unwrap_err();

        assert!(matches!(err, Error::Store(_)));
        assert_eq!(dir.lookup_topic(UserId(1)).await.unwrap(), Some(TopicId(10)));
        assert_eq!(dir.lookup_user(TopicId(10)).await.unwrap(), Some(UserId(1)));
    }
}
