//! In-process fakes for the ports, shared by the unit tests.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use crate::{
    config::{OperationalConfig, PromptsConfig, Settings, SharedConfig},
    context::{AppContext, ContextParts},
    domain::{ChatId, MediaKind, MessageId, NormalizedMessage, RawPayload, SenderId},
    enrich::{DescribeRequest, EnrichmentPool, MediaDescriber},
    errors::Error,
    messaging::{port::MessagingPort, types::QuotedMessage},
    store::{require, MessageLogEntry, Store},
    Result,
};

// ============== Store ==============

#[derive(Default)]
struct Tables {
    aliases: HashMap<(String, String), String>,
    groups: HashSet<String>,
    users: HashSet<String>,
    media: HashMap<String, String>,
    log: HashMap<String, MessageLogEntry>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn fail_writes(&self, on: bool) {
        self.fail_writes.store(on, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, on: bool) {
        self.fail_reads.store(on, Ordering::SeqCst);
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn write<T>(&self, f: impl FnOnce(&mut Tables) -> Result<T>) -> Result<T> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::store("simulated write failure"));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        f(&mut self.tables.lock().unwrap())
    }

    fn read<T>(&self, f: impl FnOnce(&Tables) -> T) -> Result<T> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Error::store("simulated read failure"));
        }
        Ok(f(&self.tables.lock().unwrap()))
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn set_alias(&self, chat: &ChatId, sender: &SenderId, alias: &str) -> Result<()> {
        let chat = require(chat.as_str(), "chat id")?.to_string();
        let sender = require(sender.as_str(), "sender id")?.to_string();
        let alias = require(alias, "alias")?.to_string();
        self.write(|t| {
            t.aliases.insert((chat, sender), alias);
            Ok(())
        })
    }

    async fn get_alias(&self, chat: &ChatId, sender: &SenderId) -> Result<Option<String>> {
        let key = (chat.as_str().to_string(), sender.as_str().to_string());
        self.read(|t| t.aliases.get(&key).cloned())
    }

    async fn add_group_allowed(&self, chat: &ChatId) -> Result<()> {
        let chat = require(chat.as_str(), "chat id")?.to_string();
        self.write(|t| {
            t.groups.insert(chat);
            Ok(())
        })
    }

    async fn remove_group_allowed(&self, chat: &ChatId) -> Result<()> {
        let chat = chat.as_str().to_string();
        self.write(|t| {
            t.groups.remove(&chat);
            Ok(())
        })
    }

    async fn is_group_allowed(&self, chat: &ChatId) -> Result<bool> {
        self.read(|t| t.groups.contains(chat.as_str()))
    }

    async fn add_user_allowed(&self, sender: &SenderId) -> Result<()> {
        let sender = require(sender.as_str(), "sender id")?.to_string();
        self.write(|t| {
            t.users.insert(sender);
            Ok(())
        })
    }

    async fn remove_user_allowed(&self, sender: &SenderId) -> Result<()> {
        let sender = sender.as_str().to_string();
        self.write(|t| {
            t.users.remove(&sender);
            Ok(())
        })
    }

    async fn is_user_allowed(&self, sender: &SenderId) -> Result<bool> {
        self.read(|t| t.users.contains(sender.as_str()))
    }

    async fn set_media_description(&self, hash: &str, description: &str) -> Result<()> {
        let hash = require(hash, "hash")?.to_string();
        let description = require(description, "description")?.to_string();
        self.write(|t| {
            t.media.insert(hash, description);
            Ok(())
        })
    }

    async fn get_media_description(&self, hash: &str) -> Result<Option<String>> {
        self.read(|t| t.media.get(hash).cloned())
    }

    async fn remove_media_description(&self, hash: &str) -> Result<()> {
        let hash = require(hash, "hash")?.to_string();
        self.write(|t| {
            t.media.remove(&hash);
            Ok(())
        })
    }

    async fn upsert_message_log(&self, entry: &MessageLogEntry) -> Result<()> {
        require(entry.message_id.as_str(), "message id")?;
        require(entry.chat_id.as_str(), "chat id")?;
        require(&entry.sender_name, "sender name")?;
        let entry = entry.clone();
        self.write(|t| {
            t.log.insert(entry.message_id.as_str().to_string(), entry);
            Ok(())
        })
    }

    async fn patch_message_log_description(
        &self,
        id: &MessageId,
        description: &str,
    ) -> Result<()> {
        let description = description.to_string();
        self.write(|t| match t.log.get_mut(id.as_str()) {
            Some(row) => {
                row.media_description = Some(description);
                Ok(())
            }
            None => Err(Error::store(format!("no message log row for {id}"))),
        })
    }

    async fn patch_message_log_text(&self, id: &MessageId, text: &str) -> Result<()> {
        let text = text.to_string();
        self.write(|t| match t.log.get_mut(id.as_str()) {
            Some(row) => {
                row.text = Some(text);
                Ok(())
            }
            None => Err(Error::store(format!("no message log row for {id}"))),
        })
    }

    async fn get_message_log(&self, id: &MessageId) -> Result<Option<MessageLogEntry>> {
        self.read(|t| t.log.get(id.as_str()).cloned())
    }
}

// ============== Messenger ==============

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Sent {
    Text { chat: ChatId, text: String },
    Reply { chat: ChatId, quoted: MessageId, text: String },
}

impl Sent {
    pub fn text(&self) -> &str {
        match self {
            Sent::Text { text, .. } | Sent::Reply { text, .. } => text,
        }
    }
}

#[derive(Default)]
pub struct RecordingMessenger {
    sent: Mutex<Vec<Sent>>,
}

impl RecordingMessenger {
    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.sent().iter().map(|s| s.text().to_string()).collect()
    }
}

#[async_trait]
impl MessagingPort for RecordingMessenger {
    async fn send_text(&self, chat_id: &ChatId, text: &str) -> Result<()> {
        self.sent.lock().unwrap().push(Sent::Text {
            chat: chat_id.clone(),
            text: text.to_string(),
        });
        Ok(())
    }

    async fn send_reply(
        &self,
        chat_id: &ChatId,
        quoted: &QuotedMessage,
        text: &str,
    ) -> Result<()> {
        self.sent.lock().unwrap().push(Sent::Reply {
            chat: chat_id.clone(),
            quoted: quoted.message_id.clone(),
            text: text.to_string(),
        });
        Ok(())
    }
}

// ============== Describer ==============

pub struct ScriptedDescriber {
    answer: String,
    delay: Duration,
    gate: Option<tokio::sync::Semaphore>,
    failures_left: AtomicUsize,
    calls: AtomicUsize,
    current: AtomicUsize,
    max_concurrent: AtomicUsize,
}

impl ScriptedDescriber {
    pub fn answering(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            delay: Duration::ZERO,
            gate: None,
            failures_left: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            current: AtomicUsize::new(0),
            max_concurrent: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fail the first `n` calls.
    pub fn failing_first(self, n: usize) -> Self {
        self.failures_left.store(n, Ordering::SeqCst);
        self
    }

    /// Block every call until `release()` is invoked.
    pub fn gated(mut self) -> Self {
        self.gate = Some(tokio::sync::Semaphore::new(0));
        self
    }

    pub fn release(&self) {
        if let Some(g) = &self.gate {
            g.add_permits(1_000);
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaDescriber for ScriptedDescriber {
    async fn describe(&self, _req: &DescribeRequest) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent.fetch_max(now, Ordering::SeqCst);

        if let Some(g) = &self.gate {
            let _ = g.acquire().await;
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        self.current.fetch_sub(1, Ordering::SeqCst);
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(Error::External("describer unavailable".to_string()));
        }
        Ok(self.answer.clone())
    }
}

// ============== Harness ==============

pub const OWNER_ID: &str = "owner-1";
pub const BOT_ID: &str = "bot-1";

pub fn started_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
}

/// A live group text message from a non-owner.
pub fn message(id: &str, text: &str) -> NormalizedMessage {
    NormalizedMessage {
        message_id: MessageId::new(id),
        chat_id: ChatId::new("group-1"),
        sender_id: SenderId::new("user-1"),
        sender_name: "Alice".to_string(),
        is_group: true,
        text: text.to_string(),
        media_kind: MediaKind::Text,
        media: None,
        timestamp: started_at() + chrono::Duration::minutes(1),
        mentions: Vec::new(),
        is_from_self: false,
        raw: RawPayload::empty(),
    }
}

/// A context wired to in-memory fakes.
pub struct Harness {
    pub ctx: Arc<AppContext>,
    pub store: Arc<MemoryStore>,
    pub messenger: Arc<RecordingMessenger>,
    pub describer: Arc<ScriptedDescriber>,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(ScriptedDescriber::answering("described"), OWNER_ID, false)
    }

    /// Allow-list enforcement switched on.
    pub fn enforcing() -> Self {
        Self::build(ScriptedDescriber::answering("described"), OWNER_ID, true)
    }

    pub fn gated(answer: &str) -> Self {
        Self::build(ScriptedDescriber::answering(answer).gated(), OWNER_ID, false)
    }

    /// The describer fails its first call, then answers "described".
    pub fn flaky() -> Self {
        Self::build(ScriptedDescriber::answering("described").failing_first(1), OWNER_ID, false)
    }

    pub fn without_owner() -> Self {
        Self::build(ScriptedDescriber::answering("described"), "", false)
    }

    /// Gated describer and the given placeholder description.
    pub fn with_placeholder(placeholder: &str) -> Self {
        let prompts = PromptsConfig {
            placeholder_description: placeholder.to_string(),
            ..Self::prompts()
        };
        Self::build_with(
            ScriptedDescriber::answering("described").gated(),
            OWNER_ID,
            false,
            prompts,
        )
    }

    fn prompts() -> PromptsConfig {
        PromptsConfig {
            info: "a message pipeline bot".to_string(),
            version: "pipebot 1.0".to_string(),
            ..Default::default()
        }
    }

    fn build(describer: ScriptedDescriber, owner: &str, enforced: bool) -> Self {
        Self::build_with(describer, owner, enforced, Self::prompts())
    }

    fn build_with(
        describer: ScriptedDescriber,
        owner: &str,
        enforced: bool,
        prompts: PromptsConfig,
    ) -> Self {
        let store = Arc::new(MemoryStore::default());
        let messenger = Arc::new(RecordingMessenger::default());
        let describer = Arc::new(describer);

        let settings = Settings {
            operational: OperationalConfig {
                owner_id: owner.to_string(),
                ..Default::default()
            },
            prompts,
        };

        let ctx = AppContext::new(ContextParts {
            config: SharedConfig::fixed(settings),
            store: store.clone(),
            messenger: messenger.clone(),
            enrichment: EnrichmentPool::new(describer.clone(), 2, Duration::from_secs(5)),
            self_id: BOT_ID.to_string(),
            started_at: started_at(),
            allow_list_enforced: enforced,
        });

        Self {
            ctx,
            store,
            messenger,
            describer,
        }
    }

    /// Wait until every accepted enrichment job has finished, without closing
    /// the pool.
    pub async fn settle(&self) {
        while self.ctx.enrichment.pending() > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    pub async fn log_row(&self, id: &str) -> Option<MessageLogEntry> {
        self.store
            .get_message_log(&MessageId::new(id))
            .await
            .unwrap()
    }
}
