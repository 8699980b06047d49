/// Created idempotently on every open.
pub(crate) const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS app_aliases (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    chat_jid TEXT NOT NULL,
    sender_jid TEXT NOT NULL,
    alias TEXT NOT NULL,
    UNIQUE(chat_jid, sender_jid)
);
CREATE INDEX IF NOT EXISTS idx_app_aliases_chat_jid ON app_aliases(chat_jid);
CREATE INDEX IF NOT EXISTS idx_app_aliases_sender_jid ON app_aliases(sender_jid);

CREATE TABLE IF NOT EXISTS app_group_allow_list (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    chat_jid TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS app_user_allow_list (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    sender_jid TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS app_media_descriptions (
    hash TEXT PRIMARY KEY NOT NULL,
    description TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS app_message_log (
    message_id TEXT PRIMARY KEY NOT NULL,
    chat_id TEXT NOT NULL,
    sender_name TEXT NOT NULL,
    media_description TEXT,
    text TEXT
);
CREATE INDEX IF NOT EXISTS idx_app_message_log_chat_id ON app_message_log(chat_id);
"#;
