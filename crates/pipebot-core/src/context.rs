use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::{
    cache::{AliasCache, AllowListCache, MediaDescriptionCache},
    config::SharedConfig,
    domain::{ChatId, SenderId},
    enrich::EnrichmentPool,
    messaging::port::MessagingPort,
    store::Store,
    Result,
};

/// Everything the pipeline needs, built once at startup and shared by `Arc`.
pub struct AppContext {
    pub config: SharedConfig,
    pub store: Arc<dyn Store>,
    pub aliases: AliasCache,
    pub allow_list: AllowListCache,
    pub media: MediaDescriptionCache,
    pub messenger: Arc<dyn MessagingPort>,
    pub enrichment: EnrichmentPool,
    /// The bot's own identity as it appears in mention lists.
    pub self_id: String,
    /// Messages timestamped before this never trigger replies.
    pub started_at: DateTime<Utc>,
    pub allow_list_enforced: bool,
}

pub struct ContextParts {
    pub config: SharedConfig,
    pub store: Arc<dyn Store>,
    pub messenger: Arc<dyn MessagingPort>,
    pub enrichment: EnrichmentPool,
    pub self_id: String,
    pub started_at: DateTime<Utc>,
    pub allow_list_enforced: bool,
}

impl AppContext {
    pub fn new(parts: ContextParts) -> Arc<Self> {
        let ContextParts {
            config,
            store,
            messenger,
            enrichment,
            self_id,
            started_at,
            allow_list_enforced,
        } = parts;

        Arc::new(Self {
            config,
            aliases: AliasCache::new(store.clone()),
            allow_list: AllowListCache::new(store.clone()),
            media: MediaDescriptionCache::new(store.clone()),
            store,
            messenger,
            enrichment,
            self_id,
            started_at,
            allow_list_enforced,
        })
    }

    /// Seed the allow-lists from the operational document. Idempotent.
    pub async fn seed_allow_lists(&self) -> Result<usize> {
        let settings = self.config.current();
        let mut seeded = 0;
        for chat in &settings.operational.group_allow_list {
            if chat.trim().is_empty() {
                continue;
            }
            self.allow_list
                .allow_group(&ChatId::new(chat.trim()))
                .await?;
            seeded += 1;
        }
        for user in &settings.operational.user_allow_list {
            if user.trim().is_empty() {
                continue;
            }
            self.allow_list
                .allow_user(&SenderId::new(user.trim()))
                .await?;
            seeded += 1;
        }
        Ok(seeded)
    }
}
