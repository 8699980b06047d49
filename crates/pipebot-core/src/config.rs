use std::{
    env, fs,
    path::{Path, PathBuf},
    sync::{Arc, RwLock},
    time::Duration,
};

use serde::{de::DeserializeOwned, Deserialize};

use crate::{domain::SenderId, errors::Error, Result};

/// Process-level runtime settings (environment + optional `.env`).
///
/// These are read once at startup. The chat-facing settings (owner, allow-lists,
/// canned replies) live in the two JSON documents behind [`SharedConfig`] so they
/// can be reloaded while running.
#[derive(Clone, Debug)]
pub struct Config {
    // Storage
    pub db_path: PathBuf,

    // Reloadable documents
    pub config_file: PathBuf,
    pub prompts_file: PathBuf,

    // Transport
    pub telegram_bot_token: Option<String>,

    // Enrichment
    pub enrich_endpoint: Option<String>,
    pub enrich_api_key: Option<String>,
    pub enrich_timeout: Duration,
    pub enrich_max_concurrency: usize,
    pub enrich_shutdown_grace: Duration,
    pub enrich_stub_delay: Duration,

    // Behavior flags
    pub allow_list_enforced: bool,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let enrich_max_concurrency = env_usize("ENRICH_MAX_CONCURRENCY").unwrap_or(4);
        if enrich_max_concurrency == 0 {
            return Err(Error::Config(
                "ENRICH_MAX_CONCURRENCY must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            db_path: env_path("PIPEBOT_DB_PATH").unwrap_or_else(|| PathBuf::from("pipebot.db")),
            config_file: env_path("PIPEBOT_CONFIG_FILE")
                .unwrap_or_else(|| PathBuf::from("config.json")),
            prompts_file: env_path("PIPEBOT_PROMPTS_FILE")
                .unwrap_or_else(|| PathBuf::from("prompts.json")),
            telegram_bot_token: env_str("TELEGRAM_BOT_TOKEN").and_then(non_empty),
            enrich_endpoint: env_str("ENRICH_ENDPOINT").and_then(non_empty),
            enrich_api_key: env_str("ENRICH_API_KEY").and_then(non_empty),
            enrich_timeout: Duration::from_millis(env_u64("ENRICH_TIMEOUT_MS").unwrap_or(60_000)),
            enrich_max_concurrency,
            enrich_shutdown_grace: Duration::from_millis(
                env_u64("ENRICH_SHUTDOWN_GRACE_MS").unwrap_or(5_000),
            ),
            enrich_stub_delay: Duration::from_millis(
                env_u64("ENRICH_STUB_DELAY_MS").unwrap_or(10_000),
            ),
            allow_list_enforced: env_bool("ALLOW_LIST_ENFORCED").unwrap_or(false),
        })
    }
}

// ============== Reloadable documents ==============

/// Operational document: owner identity, static allow-lists, auth token.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct OperationalConfig {
    pub token: String,
    pub owner_id: String,
    pub group_allow_list: Vec<String>,
    pub user_allow_list: Vec<String>,
}

impl OperationalConfig {
    /// The configured owner, if any.
    pub fn owner(&self) -> Option<SenderId> {
        non_empty(self.owner_id.trim().to_string()).map(SenderId)
    }
}

/// Canned reply strings.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct PromptsConfig {
    pub info: String,
    pub version: String,
    pub personality: String,
    pub mention_reply: String,
    pub placeholder_description: String,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            info: String::new(),
            version: String::new(),
            personality: String::new(),
            mention_reply: "👋".to_string(),
            placeholder_description: "Processing image...".to_string(),
        }
    }
}

impl PromptsConfig {
    /// The configured placeholder, or the built-in one when it is blank.
    pub fn placeholder(&self) -> String {
        if self.placeholder_description.trim().is_empty() {
            return Self::default().placeholder_description;
        }
        self.placeholder_description.clone()
    }
}

/// Both documents as one immutable snapshot.
#[derive(Clone, Debug, Default)]
pub struct Settings {
    pub operational: OperationalConfig,
    pub prompts: PromptsConfig,
}

impl Settings {
    pub fn read(config_file: &Path, prompts_file: &Path) -> Result<Self> {
        Ok(Self {
            operational: read_json(config_file)?,
            prompts: read_json(prompts_file)?,
        })
    }
}

/// The process-wide chat settings.
///
/// Readers take a cheap `Arc` snapshot. `reload()` parses both files first and
/// swaps only if both succeed, so a bad edit leaves the previous settings active.
pub struct SharedConfig {
    config_file: PathBuf,
    prompts_file: PathBuf,
    current: RwLock<Arc<Settings>>,
}

impl SharedConfig {
    pub fn load(config_file: impl Into<PathBuf>, prompts_file: impl Into<PathBuf>) -> Result<Self> {
        let config_file = config_file.into();
        let prompts_file = prompts_file.into();
        let settings = Settings::read(&config_file, &prompts_file)?;
        Ok(Self {
            config_file,
            prompts_file,
            current: RwLock::new(Arc::new(settings)),
        })
    }

    /// Fixed settings with no backing files; `reload()` will fail.
    pub fn fixed(settings: Settings) -> Self {
        Self {
            config_file: PathBuf::new(),
            prompts_file: PathBuf::new(),
            current: RwLock::new(Arc::new(settings)),
        }
    }

    pub fn current(&self) -> Arc<Settings> {
        match self.current.read() {
            Ok(g) => g.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn reload(&self) -> Result<()> {
        let next = Arc::new(Settings::read(&self.config_file, &self.prompts_file)?);
        match self.current.write() {
            Ok(mut g) => *g = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
        Ok(())
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let data = fs::read_to_string(path).map_err(|e| Error::InvalidPath {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    Ok(serde_json::from_str(&data)?)
}

// ============== Env helpers ==============

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        env::set_var(key, strip_quotes(v.trim()));
    }
}

fn strip_quotes(v: &str) -> &str {
    if v.len() >= 2
        && ((v.starts_with('"') && v.ends_with('"')) || (v.starts_with('\'') && v.ends_with('\'')))
    {
        return &v[1..v.len() - 1];
    }
    v
}

fn env_bool(key: &str) -> Option<bool> {
    env_str(key).map(|s| {
        matches!(
            s.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    env_str(key).and_then(|s| s.trim().parse::<usize>().ok())
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key).map(PathBuf::from)
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
