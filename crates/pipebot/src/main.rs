use std::sync::Arc;

use tracing::info;

use pipebot_core::{
    config::{Config, SharedConfig},
    enrich::{EnrichmentPool, MediaDescriber, StaticDescriber},
    store::Store,
};
use pipebot_enrich::HttpDescriber;
use pipebot_sqlite::SqliteStore;
use pipebot_telegram::router::{run_polling, PollingOptions};

#[tokio::main]
async fn main() -> Result<(), pipebot_core::Error> {
    pipebot_core::logging::init("pipebot")?;

    let cfg = Config::load()?;
    let shared = SharedConfig::load(&cfg.config_file, &cfg.prompts_file)?;
    let settings = shared.current();

    let token = cfg
        .telegram_bot_token
        .clone()
        .or_else(|| Some(settings.operational.token.trim().to_string()).filter(|t| !t.is_empty()))
        .ok_or_else(|| {
            pipebot_core::Error::Config(
                "TELEGRAM_BOT_TOKEN is not set and the config file has no token".to_string(),
            )
        })?;

    let store: Arc<dyn Store> = Arc::new(SqliteStore::open(&cfg.db_path).await?);

    let describer: Arc<dyn MediaDescriber> = match &cfg.enrich_endpoint {
        Some(endpoint) => {
            info!(endpoint = %endpoint, "media descriptions via HTTP");
            Arc::new(HttpDescriber::new(
                endpoint.clone(),
                cfg.enrich_api_key.clone(),
                cfg.enrich_timeout,
            )?)
        }
        None => {
            info!("no ENRICH_ENDPOINT; using the built-in describer");
            // Empty canned text: describe from the media metadata.
            Arc::new(StaticDescriber::new(cfg.enrich_stub_delay, ""))
        }
    };
    let enrichment = EnrichmentPool::new(describer, cfg.enrich_max_concurrency, cfg.enrich_timeout);

    let ctx = run_polling(PollingOptions {
        token,
        config: shared,
        store,
        enrichment,
        allow_list_enforced: cfg.allow_list_enforced,
    })
    .await
    .map_err(|e| pipebot_core::Error::External(format!("telegram bot failed: {e}")))?;

    info!(pending = ctx.enrichment.pending(), "shutting down");
    ctx.enrichment.shutdown(cfg.enrich_shutdown_grace).await;

    Ok(())
}
