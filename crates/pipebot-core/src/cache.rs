//! Read-through / write-through memory layer over the [`Store`].
//!
//! Each cache owns one map behind one reader/writer lock. Entries live for the
//! process lifetime; there is no eviction.
//!
//! Write policy: memory first, then the store, both under the write lock. If
//! the store write fails the previous memory state for that key is restored,
//! so the cache never holds a value the store rejected.
//!
//! Read-through does not hold the lock across the store call. Writers bump a
//! per-key version, and a fetch that overlapped a write is discarded in favour
//! of whatever the writer left in memory.

use std::{collections::HashMap, future::Future, hash::Hash, sync::Arc};

use tokio::sync::RwLock;

use crate::{
    domain::{ChatId, SenderId},
    errors::Error,
    store::Store,
    Result,
};

struct Slots<K, V> {
    values: HashMap<K, V>,
    // Bumped by every put/remove so a read-through that raced a writer can
    // tell its store answer is stale.
    versions: HashMap<K, u64>,
}

impl<K: Eq + Hash + Clone, V> Slots<K, V> {
    fn version(&self, key: &K) -> u64 {
        self.versions.get(key).copied().unwrap_or(0)
    }

    fn bump(&mut self, key: &K) {
        *self.versions.entry(key.clone()).or_insert(0) += 1;
    }
}

struct ShadowMap<K, V> {
    inner: RwLock<Slots<K, V>>,
}

impl<K, V> ShadowMap<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn new() -> Self {
        Self {
            inner: RwLock::new(Slots {
                values: HashMap::new(),
                versions: HashMap::new(),
            }),
        }
    }

    #[cfg(test)]
    async fn peek(&self, key: &K) -> Option<V> {
        self.inner.read().await.values.get(key).cloned()
    }

    /// Memory first; on miss ask the store and remember only positive answers.
    async fn lookup<F, Fut>(&self, key: &K, fetch: F) -> Result<Option<V>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<V>>>,
    {
        let seen = {
            let slots = self.inner.read().await;
            if let Some(v) = slots.values.get(key) {
                return Ok(Some(v.clone()));
            }
            slots.version(key)
        };

        let fetched = fetch().await?;

        // A put or remove that landed while we were reading the store wins.
        let mut slots = self.inner.write().await;
        if slots.version(key) != seen {
            return Ok(slots.values.get(key).cloned());
        }
        let Some(fetched) = fetched else {
            return Ok(None);
        };
        let v = slots.values.entry(key.clone()).or_insert(fetched).clone();
        Ok(Some(v))
    }

    async fn put<F, Fut>(&self, key: K, value: V, persist: F) -> Result<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let mut slots = self.inner.write().await;
        slots.bump(&key);
        let previous = slots.values.insert(key.clone(), value);

        if let Err(e) = persist().await {
            match previous {
                Some(p) => {
                    slots.values.insert(key, p);
                }
                None => {
                    slots.values.remove(&key);
                }
            }
            return Err(e);
        }
        Ok(())
    }

    async fn remove<F, Fut>(&self, key: &K, persist: F) -> Result<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        self.remove_if(key, |_| true, persist).await.map(|_| ())
    }

    /// Remove the key only if `matches` accepts its current memory value.
    /// Returns whether anything was removed.
    async fn remove_if<P, F, Fut>(&self, key: &K, matches: P, persist: F) -> Result<bool>
    where
        P: FnOnce(Option<&V>) -> bool,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let mut slots = self.inner.write().await;
        if !matches(slots.values.get(key)) {
            return Ok(false);
        }
        slots.bump(key);
        let previous = slots.values.remove(key);

        if let Err(e) = persist().await {
            if let Some(p) = previous {
                slots.values.insert(key.clone(), p);
            }
            return Err(e);
        }
        Ok(true)
    }
}

// ============== Alias ==============

/// `(chat, sender) -> alias`.
pub struct AliasCache {
    store: Arc<dyn Store>,
    map: ShadowMap<(ChatId, SenderId), String>,
}

impl AliasCache {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            map: ShadowMap::new(),
        }
    }

    pub async fn lookup(&self, chat: &ChatId, sender: &SenderId) -> Result<Option<String>> {
        let key = (chat.clone(), sender.clone());
        self.map
            .lookup(&key, || self.store.get_alias(chat, sender))
            .await
    }

    pub async fn put(&self, chat: &ChatId, sender: &SenderId, alias: &str) -> Result<()> {
        if chat.is_blank() || sender.is_blank() || alias.trim().is_empty() {
            return Err(Error::invalid("chat, sender and alias are required"));
        }
        let alias = alias.trim();
        self.map
            .put((chat.clone(), sender.clone()), alias.to_string(), || {
                self.store.set_alias(chat, sender, alias)
            })
            .await
    }

    /// Memory-only view, without falling through to the store.
    #[cfg(test)]
    pub(crate) async fn cached(&self, chat: &ChatId, sender: &SenderId) -> Option<String> {
        self.map.peek(&(chat.clone(), sender.clone())).await
    }
}

// ============== Allow-list ==============

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum AllowKey {
    Group(ChatId),
    User(SenderId),
}

/// Group and user allow-lists. Only positive membership is cached.
pub struct AllowListCache {
    store: Arc<dyn Store>,
    map: ShadowMap<AllowKey, ()>,
}

impl AllowListCache {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            map: ShadowMap::new(),
        }
    }

    pub async fn is_group_allowed(&self, chat: &ChatId) -> Result<bool> {
        let key = AllowKey::Group(chat.clone());
        let hit = self
            .map
            .lookup(&key, || async {
                Ok(self.store.is_group_allowed(chat).await?.then_some(()))
            })
            .await?;
        Ok(hit.is_some())
    }

    pub async fn allow_group(&self, chat: &ChatId) -> Result<()> {
        if chat.is_blank() {
            return Err(Error::invalid("chat id is required"));
        }
        self.map
            .put(AllowKey::Group(chat.clone()), (), || {
                self.store.add_group_allowed(chat)
            })
            .await
    }

    pub async fn disallow_group(&self, chat: &ChatId) -> Result<()> {
        self.map
            .remove(&AllowKey::Group(chat.clone()), || {
                self.store.remove_group_allowed(chat)
            })
            .await
    }

    pub async fn is_user_allowed(&self, sender: &SenderId) -> Result<bool> {
        let key = AllowKey::User(sender.clone());
        let hit = self
            .map
            .lookup(&key, || async {
                Ok(self.store.is_user_allowed(sender).await?.then_some(()))
            })
            .await?;
        Ok(hit.is_some())
    }

    pub async fn allow_user(&self, sender: &SenderId) -> Result<()> {
        if sender.is_blank() {
            return Err(Error::invalid("sender id is required"));
        }
        self.map
            .put(AllowKey::User(sender.clone()), (), || {
                self.store.add_user_allowed(sender)
            })
            .await
    }

    pub async fn disallow_user(&self, sender: &SenderId) -> Result<()> {
        self.map
            .remove(&AllowKey::User(sender.clone()), || {
                self.store.remove_user_allowed(sender)
            })
            .await
    }
}

// ============== Media descriptions ==============

/// `content hash -> description`. An empty hash is always a miss and is never
/// written.
pub struct MediaDescriptionCache {
    store: Arc<dyn Store>,
    map: ShadowMap<String, String>,
}

impl MediaDescriptionCache {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            map: ShadowMap::new(),
        }
    }

    pub async fn lookup(&self, hash: &str) -> Result<Option<String>> {
        let hash = hash.trim();
        if hash.is_empty() {
            return Ok(None);
        }
        self.map
            .lookup(&hash.to_string(), || self.store.get_media_description(hash))
            .await
    }

    pub async fn put(&self, hash: &str, description: &str) -> Result<()> {
        let hash = hash.trim();
        if hash.is_empty() || description.trim().is_empty() {
            return Err(Error::invalid("hash and description are required"));
        }
        self.map
            .put(hash.to_string(), description.to_string(), || {
                self.store.set_media_description(hash, description)
            })
            .await
    }

    /// Drop a claim: remove the entry from memory and the store, but only
    /// while it still holds `claim`. Returns whether it was removed.
    pub async fn release(&self, hash: &str, claim: &str) -> Result<bool> {
        let hash = hash.trim();
        if hash.is_empty() {
            return Ok(false);
        }
        self.map
            .remove_if(
                &hash.to_string(),
                |current| current.map(String::as_str) == Some(claim),
                || self.store.remove_media_description(hash),
            )
            .await
    }

    #[cfg(test)]
    pub(crate) async fn cached(&self, hash: &str) -> Option<String> {
        self.map.peek(&hash.trim().to_string()).await
    }
}
