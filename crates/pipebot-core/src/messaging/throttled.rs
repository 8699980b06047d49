use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use crate::{
    domain::ChatId,
    messaging::{port::MessagingPort, types::QuotedMessage},
    Result,
};

/// Minimum spacing between outbound sends.
#[derive(Clone, Copy, Debug)]
pub struct ThrottleConfig {
    /// Across all chats.
    pub global_min_interval: Duration,
    /// Within one chat.
    pub per_chat_min_interval: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        // Telegram allows roughly 30 msg/s overall and 1 msg/s per chat.
        Self {
            global_min_interval: Duration::from_millis(40),
            per_chat_min_interval: Duration::from_millis(1050),
        }
    }
}

/// Hands out send slots spaced `interval` apart.
#[derive(Debug)]
struct IntervalLimiter {
    interval: Duration,
    next: Instant,
}

impl IntervalLimiter {
    fn starting_at(interval: Duration, now: Instant) -> Self {
        Self { interval, next: now }
    }

    /// Claim the next free slot; returns how long to wait for it.
    fn reserve_at(&mut self, now: Instant) -> Duration {
        let slot = self.next.max(now);
        self.next = slot + self.interval;
        slot - now
    }
}

struct Limiters {
    global: IntervalLimiter,
    chats: HashMap<ChatId, IntervalLimiter>,
}

/// [`MessagingPort`] decorator that spaces sends out, globally and per chat.
pub struct ThrottledMessenger {
    inner: Arc<dyn MessagingPort>,
    per_chat_interval: Duration,
    limiters: Mutex<Limiters>,
}

impl ThrottledMessenger {
    pub fn new(inner: Arc<dyn MessagingPort>, cfg: ThrottleConfig) -> Self {
        Self {
            inner,
            per_chat_interval: cfg.per_chat_min_interval,
            limiters: Mutex::new(Limiters {
                global: IntervalLimiter::starting_at(cfg.global_min_interval, Instant::now()),
                chats: HashMap::new(),
            }),
        }
    }

    async fn wait_turn(&self, chat_id: &ChatId) {
        let wait = {
            let mut l = self.limiters.lock().await;
            let now = Instant::now();
            let global = l.global.reserve_at(now);
            let chat = l
                .chats
                .entry(chat_id.clone())
                .or_insert_with(|| IntervalLimiter::starting_at(self.per_chat_interval, now))
                .reserve_at(now);
            global.max(chat)
        };

        if !wait.is_zero() {
            sleep(wait).await;
        }
    }
}

#[async_trait::async_trait]
impl MessagingPort for ThrottledMessenger {
    async fn send_text(&self, chat_id: &ChatId, text: &str) -> Result<()> {
        self.wait_turn(chat_id).await;
        self.inner.send_text(chat_id, text).await
    }

    async fn send_reply(
        &self,
        chat_id: &ChatId,
        quoted: &QuotedMessage,
        text: &str,
    ) -> Result<()> {
        self.wait_turn(chat_id).await;
        self.inner.send_reply(chat_id, quoted, text).await
    }
}
