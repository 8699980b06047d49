use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{context::AppContext, domain::NormalizedMessage};

use super::{is_live, send_reply, send_text};

/// Group chat commands. Tokens are matched exactly and case-sensitively.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Summarize,
    Version,
    Info,
    Whitelist,
    Alias(Option<String>),
    Disable,
    Enable,
    ReloadJson,
}

impl Command {
    /// `None` for an unrecognised first token.
    pub fn parse(text: &str) -> Option<Self> {
        let mut words = text.split_whitespace();
        let cmd = match words.next()? {
            "-s" | "--summarize" => Self::Summarize,
            "-v" | "--version" => Self::Version,
            "-i" | "--info" => Self::Info,
            "--whitelist" => Self::Whitelist,
            "--alias" => Self::Alias(words.next().map(str::to_string)),
            "--disable" => Self::Disable,
            "--enable" => Self::Enable,
            "--reload-json" => Self::ReloadJson,
            _ => return None,
        };
        Some(cmd)
    }

    fn owner_only(&self) -> Option<&'static str> {
        match self {
            Self::Whitelist => Some("Only the owner can whitelist."),
            Self::ReloadJson => Some("Only the owner can reload configs."),
            _ => None,
        }
    }
}

pub(super) async fn handle_command(ctx: &Arc<AppContext>, msg: &NormalizedMessage) {
    if !is_live(ctx, msg) {
        return;
    }

    let Some(cmd) = Command::parse(&msg.text) else {
        debug!(chat = %msg.chat_id, "ignoring unknown command");
        return;
    };

    if let Some(refusal) = cmd.owner_only() {
        match ctx.config.current().operational.owner() {
            None => {
                send_text(ctx, msg, "Owner not configured correctly.").await;
                return;
            }
            Some(owner) if owner != msg.sender_id => {
                info!(sender = %msg.sender_id, ?cmd, "owner-only command refused");
                send_text(ctx, msg, refusal).await;
                return;
            }
            Some(_) => {}
        }
    }

    match &cmd {
        Command::Summarize => debug!(chat = %msg.chat_id, "summarize requested"),
        Command::Version => {
            let version = ctx.config.current().prompts.version.clone();
            send_text(ctx, msg, &version).await;
        }
        Command::Info => {
            let info = ctx.config.current().prompts.info.clone();
            send_text(ctx, msg, &info).await;
        }
        Command::Whitelist => match ctx.allow_list.allow_group(&msg.chat_id).await {
            Ok(()) => {
                info!(chat = %msg.chat_id, "group whitelisted");
                send_text(ctx, msg, "Group whitelisted.").await;
            }
            Err(e) => {
                warn!(chat = %msg.chat_id, "whitelist failed: {e}");
                send_text(ctx, msg, "Failed to whitelist group.").await;
            }
        },
        Command::Alias(None) => send_text(ctx, msg, "Usage: --alias <name>").await,
        Command::Alias(Some(name)) => {
            match ctx.aliases.put(&msg.chat_id, &msg.sender_id, name).await {
                Ok(()) => send_reply(ctx, msg, "Alias has been saved.").await,
                Err(e) => {
                    warn!(chat = %msg.chat_id, sender = %msg.sender_id, "alias save failed: {e}");
                    send_reply(ctx, msg, "Failed to save alias").await;
                }
            }
        }
        Command::Disable | Command::Enable => {
            debug!(chat = %msg.chat_id, ?cmd, "toggle requested");
        }
        Command::ReloadJson => match ctx.config.reload() {
            Ok(()) => {
                info!("configuration reloaded");
                send_text(ctx, msg, "Configs reloaded successfully.").await;
            }
            Err(e) => {
                warn!("configuration reload failed: {e}");
                send_text(ctx, msg, &format!("Failed to reload configs: {e}")).await;
            }
        },
    }
}
