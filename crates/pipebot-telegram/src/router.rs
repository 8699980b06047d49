use std::sync::Arc;

use chrono::Utc;
use teloxide::{dispatching::Dispatcher, dptree, prelude::*};
use tracing::{info, warn};

use pipebot_core::{
    config::SharedConfig,
    context::{AppContext, ContextParts},
    enrich::EnrichmentPool,
    events::InboundEvent,
    messaging::{
        port::MessagingPort,
        throttled::{ThrottleConfig, ThrottledMessenger},
    },
    pipeline::spawn_event,
    store::Store,
};

use crate::{
    convert::{to_event, BotIdentity},
    TelegramMessenger,
};

pub struct PollingOptions {
    pub token: String,
    pub config: SharedConfig,
    pub store: Arc<dyn Store>,
    pub enrichment: EnrichmentPool,
    pub allow_list_enforced: bool,
}

#[derive(Clone)]
struct HandlerState {
    ctx: Arc<AppContext>,
    me: Arc<BotIdentity>,
}

/// Long-poll Telegram until the dispatcher stops (Ctrl-C).
///
/// Returns the context so the caller can drain the enrichment pool.
pub async fn run_polling(opts: PollingOptions) -> anyhow::Result<Arc<AppContext>> {
    let bot = Bot::new(opts.token);

    let me = bot.get_me().await?;
    let identity = BotIdentity {
        id: me.id.0.to_string(),
        username: me.username.clone(),
    };
    info!(bot = %me.username(), id = %identity.id, "telegram bot started");

    // Keep a RetryAfter retry at the adapter; throttle in front of it.
    let raw_messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));
    let messenger: Arc<dyn MessagingPort> = Arc::new(ThrottledMessenger::new(
        raw_messenger,
        ThrottleConfig::default(),
    ));

    let ctx = AppContext::new(ContextParts {
        config: opts.config,
        store: opts.store,
        messenger,
        enrichment: opts.enrichment,
        self_id: identity.id.clone(),
        started_at: Utc::now(),
        allow_list_enforced: opts.allow_list_enforced,
    });

    match ctx.seed_allow_lists().await {
        Ok(n) => info!(entries = n, "allow-lists seeded"),
        Err(e) => warn!("failed to seed allow-lists: {e}"),
    }

    let state = HandlerState {
        ctx: ctx.clone(),
        me: Arc::new(identity),
    };

    let handler = dptree::entry().branch(Update::filter_message().endpoint(on_message));

    spawn_event(ctx.clone(), InboundEvent::Connected);

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    spawn_event(
        ctx.clone(),
        InboundEvent::Disconnected {
            reason: Some("dispatcher stopped".to_string()),
        },
    )
    .await?;

    Ok(ctx)
}

async fn on_message(msg: Message, state: HandlerState) -> ResponseResult<()> {
    let evt = to_event(&msg, &state.me);
    spawn_event(state.ctx.clone(), evt);
    Ok(())
}
