//! SQLite implementation of the core `Store` port.
//!
//! One connection behind one mutex: every statement is serialized, and each
//! call runs on the blocking pool so the async runtime never waits on disk.

mod schema;

use std::{
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

use pipebot_core::{
    domain::{ChatId, MessageId, SenderId},
    store::{require, MessageLogEntry, Store},
    Error, Result,
};

#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let conn = tokio::task::spawn_blocking(move || -> Result<Connection> {
            let conn = Connection::open(&path).map_err(store_err)?;
            conn.busy_timeout(Duration::from_secs(5)).map_err(store_err)?;
            conn.execute_batch("PRAGMA journal_mode = WAL;")
                .map_err(store_err)?;
            prepare(&conn)?;
            info!(path = %path.display(), "message store opened");
            Ok(conn)
        })
        .await
        .map_err(|e| Error::store(format!("open task failed: {e}")))??;

        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(store_err)?;
        prepare(&conn)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    async fn run<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| Error::store("connection mutex poisoned"))?;
            f(&*guard).map_err(store_err)
        })
        .await
        .map_err(|e| Error::store(format!("store task failed: {e}")))?
    }

    /// Run an UPDATE and fail if it touched no row.
    async fn patch(&self, id: &MessageId, sql: &'static str, value: &str) -> Result<()> {
        let id = require(id.as_str(), "message id")?.to_string();
        let value = value.to_string();
        let missing = id.clone();
        let changed = self
            .run(move |c| c.execute(sql, params![value, id]))
            .await?;
        if changed == 0 {
            return Err(Error::store(format!("no message log row for {missing}")));
        }
        Ok(())
    }
}

fn prepare(conn: &Connection) -> Result<()> {
    conn.execute_batch(schema::SCHEMA).map_err(store_err)
}

fn store_err(e: rusqlite::Error) -> Error {
    Error::Store(e.to_string())
}

#[async_trait]
impl Store for SqliteStore {
    async fn set_alias(&self, chat: &ChatId, sender: &SenderId, alias: &str) -> Result<()> {
        let chat = require(chat.as_str(), "chat id")?.to_string();
        let sender = require(sender.as_str(), "sender id")?.to_string();
        let alias = require(alias, "alias")?.to_string();
        self.run(move |c| {
            c.execute(
                "INSERT INTO app_aliases (chat_jid, sender_jid, alias) VALUES (?1, ?2, ?3)
                 ON CONFLICT(chat_jid, sender_jid) DO UPDATE SET alias = excluded.alias",
                params![chat, sender, alias],
            )
        })
        .await
        .map(|_| ())
    }

    async fn get_alias(&self, chat: &ChatId, sender: &SenderId) -> Result<Option<String>> {
        let chat = require(chat.as_str(), "chat id")?.to_string();
        let sender = require(sender.as_str(), "sender id")?.to_string();
        self.run(move |c| {
            c.query_row(
                "SELECT alias FROM app_aliases WHERE chat_jid = ?1 AND sender_jid = ?2",
                params![chat, sender],
                |row| row.get(0),
            )
            .optional()
        })
        .await
    }

    async fn add_group_allowed(&self, chat: &ChatId) -> Result<()> {
        let chat = require(chat.as_str(), "chat id")?.to_string();
        self.run(move |c| {
            c.execute(
                "INSERT INTO app_group_allow_list (chat_jid) VALUES (?1)
                 ON CONFLICT(chat_jid) DO NOTHING",
                params![chat],
            )
        })
        .await
        .map(|_| ())
    }

    async fn remove_group_allowed(&self, chat: &ChatId) -> Result<()> {
        let chat = require(chat.as_str(), "chat id")?.to_string();
        self.run(move |c| {
            c.execute(
                "DELETE FROM app_group_allow_list WHERE chat_jid = ?1",
                params![chat],
            )
        })
        .await
        .map(|_| ())
    }

    async fn is_group_allowed(&self, chat: &ChatId) -> Result<bool> {
        let chat = require(chat.as_str(), "chat id")?.to_string();
        self.run(move |c| {
            c.query_row(
                "SELECT 1 FROM app_group_allow_list WHERE chat_jid = ?1",
                params![chat],
                |_| Ok(()),
            )
            .optional()
        })
        .await
        .map(|hit| hit.is_some())
    }

    async fn add_user_allowed(&self, sender: &SenderId) -> Result<()> {
        let sender = require(sender.as_str(), "sender id")?.to_string();
        self.run(move |c| {
            c.execute(
                "INSERT INTO app_user_allow_list (sender_jid) VALUES (?1)
                 ON CONFLICT(sender_jid) DO NOTHING",
                params![sender],
            )
        })
        .await
        .map(|_| ())
    }

    async fn remove_user_allowed(&self, sender: &SenderId) -> Result<()> {
        let sender = require(sender.as_str(), "sender id")?.to_string();
        self.run(move |c| {
            c.execute(
                "DELETE FROM app_user_allow_list WHERE sender_jid = ?1",
                params![sender],
            )
        })
        .await
        .map(|_| ())
    }

    async fn is_user_allowed(&self, sender: &SenderId) -> Result<bool> {
        let sender = require(sender.as_str(), "sender id")?.to_string();
        self.run(move |c| {
            c.query_row(
                "SELECT 1 FROM app_user_allow_list WHERE sender_jid = ?1",
                params![sender],
                |_| Ok(()),
            )
            .optional()
        })
        .await
        .map(|hit| hit.is_some())
    }

    async fn set_media_description(&self, hash: &str, description: &str) -> Result<()> {
        let hash = require(hash, "hash")?.to_string();
        let description = require(description, "description")?.to_string();
        self.run(move |c| {
            c.execute(
                "INSERT INTO app_media_descriptions (hash, description) VALUES (?1, ?2)
                 ON CONFLICT(hash) DO UPDATE SET description = excluded.description",
                params![hash, description],
            )
        })
        .await
        .map(|_| ())
    }

    async fn get_media_description(&self, hash: &str) -> Result<Option<String>> {
        let hash = require(hash, "hash")?.to_string();
        self.run(move |c| {
            c.query_row(
                "SELECT description FROM app_media_descriptions WHERE hash = ?1",
                params![hash],
                |row| row.get(0),
            )
            .optional()
        })
        .await
    }

    async fn remove_media_description(&self, hash: &str) -> Result<()> {
        let hash = require(hash, "hash")?.to_string();
        self.run(move |c| {
            c.execute(
                "DELETE FROM app_media_descriptions WHERE hash = ?1",
                params![hash],
            )
        })
        .await
        .map(|_| ())
    }

    async fn upsert_message_log(&self, entry: &MessageLogEntry) -> Result<()> {
        let id = require(entry.message_id.as_str(), "message id")?.to_string();
        let chat = require(entry.chat_id.as_str(), "chat id")?.to_string();
        let sender = require(&entry.sender_name, "sender name")?.to_string();
        let description = entry.media_description.clone();
        let text = entry.text.clone();
        self.run(move |c| {
            c.execute(
                "INSERT INTO app_message_log (message_id, chat_id, sender_name, media_description, text)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(message_id) DO UPDATE SET
                    chat_id = excluded.chat_id,
                    sender_name = excluded.sender_name,
                    media_description = excluded.media_description,
                    text = excluded.text",
                params![id, chat, sender, description, text],
            )
        })
        .await
        .map(|_| ())
    }

    async fn patch_message_log_description(
        &self,
        id: &MessageId,
        description: &str,
    ) -> Result<()> {
        self.patch(
            id,
            "UPDATE app_message_log SET media_description = ?1 WHERE message_id = ?2",
            description,
        )
        .await
    }

    async fn patch_message_log_text(&self, id: &MessageId, text: &str) -> Result<()> {
        self.patch(
            id,
            "UPDATE app_message_log SET text = ?1 WHERE message_id = ?2",
            text,
        )
        .await
    }

    async fn get_message_log(&self, id: &MessageId) -> Result<Option<MessageLogEntry>> {
        let id = require(id.as_str(), "message id")?.to_string();
        self.run(move |c| {
            c.query_row(
                "SELECT message_id, chat_id, sender_name, media_description, text
                 FROM app_message_log WHERE message_id = ?1",
                params![id],
                |row| {
                    Ok(MessageLogEntry {
                        message_id: MessageId(row.get(0)?),
                        chat_id: ChatId(row.get(1)?),
                        sender_name: row.get(2)?,
                        media_description: row.get(3)?,
                        text: row.get(4)?,
                    })
                },
            )
            .optional()
        })
        .await
    }
}
