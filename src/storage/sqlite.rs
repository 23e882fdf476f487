//! SQLite storage gateway
//!
//! One reader/writer lock orders every operation across all tables. An
//! insert holds the write side for all of its rows, a lookup holds the read
//! side for the envelope fetch and every join, so a reader never observes an
//! envelope whose parent rows are not yet visible.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension, params};

use super::expiry::{ExpiryPolicy, SWEEP_INTERVAL};
use super::schema::{
    self, AttributeRow, EnvelopeRow, GroupMessageRow, PrivateMessageRow, QuoteRow, UinInfo,
};
use crate::hash::{self, NO_REFERENCE, SurrogateKey};
use crate::message::{
    MessageKind, QuotedInfo, StoredGroupMessage, StoredMessage, StoredMessageAttribute,
    StoredPrivateMessage,
};
use crate::{Context, Error, Result};

/// File name of the database inside its directory
pub const DATABASE_FILE_NAME: &str = "msg.db";

/// How a failed attribute/quote insert affects the envelope insert
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LinkageMode {
    /// Drop the reference and still store the envelope
    #[default]
    BestEffort,
    /// Fail the whole insert
    Strict,
}

type Clock = Box<dyn Fn() -> i64 + Send + Sync>;

fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// SQLite-backed message store
pub struct SqliteStore {
    /// Orders whole operations; `conn` only serializes statement execution
    lock: RwLock<()>,
    conn: Mutex<Connection>,
    expiry: ExpiryPolicy,
    linkage: LinkageMode,
    clock: Clock,
    inserts: AtomicU64,
}

impl SqliteStore {
    /// Open a database file, creating it and its parent directory if absent
    pub fn open(path: &Path, ttl: Duration) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).context("create database directory error")?;
            }
        }
        let conn = Connection::open(path).context("open sqlite3 error")?;
        tracing::info!("Opened message database at {}", path.display());
        Self::initialize(conn, ttl)
    }

    /// Open `<dir>/msg.db`
    pub fn open_in_dir(dir: &Path, ttl: Duration) -> Result<Self> {
        Self::open(&dir.join(DATABASE_FILE_NAME), ttl)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory(ttl: Duration) -> Result<Self> {
        let conn = Connection::open_in_memory().context("open sqlite3 error")?;
        Self::initialize(conn, ttl)
    }

    fn initialize(mut conn: Connection, ttl: Duration) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .context("enable foreign_keys error")?;
        for stmt in schema::all_schema_statements() {
            conn.execute(stmt, []).context("create sqlite3 table error")?;
        }
        for stmt in schema::INSERT_SENTINEL_ROWS {
            conn.execute(stmt, []).context("insert sentinel row error")?;
        }

        let expiry = ExpiryPolicy::new(ttl);
        let swept = expiry
            .sweep(&mut conn, unix_now())
            .context("sweep expired rows error")?;
        if swept.total() > 0 {
            tracing::debug!("Reclaimed {} expired rows on open", swept.total());
        }

        Ok(Self {
            lock: RwLock::new(()),
            conn: Mutex::new(conn),
            expiry,
            linkage: LinkageMode::default(),
            clock: Box::new(unix_now),
            inserts: AtomicU64::new(0),
        })
    }

    /// Choose how attribute/quote insert failures are handled
    pub fn with_linkage(mut self, linkage: LinkageMode) -> Self {
        self.linkage = linkage;
        self
    }

    /// Replace the unix-seconds time source used for expiry
    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> i64 + Send + Sync + 'static,
    {
        self.clock = Box::new(clock);
        self
    }

    pub fn expiry(&self) -> &ExpiryPolicy {
        &self.expiry
    }

    pub fn linkage(&self) -> LinkageMode {
        self.linkage
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, ()>> {
        self.lock.read().map_err(|_| Error::LockPoisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, ()>> {
        self.lock.write().map_err(|_| Error::LockPoisoned)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| Error::LockPoisoned)
    }

    // ========== Insert Operations ==========

    /// Store a group message with its attribute and quote
    pub fn insert_group_message(&self, msg: &StoredGroupMessage) -> Result<()> {
        let quote = msg.quoted_info.as_ref().map(quote_row).transpose()?;
        let content = serde_json::to_string(msg).context("insert marshal content error")?;

        let _guard = self.write()?;
        let mut conn = self.conn()?;
        let (attribute_id, quoted_info_id) =
            self.link_parents(&conn, msg.attribute.as_ref(), quote.as_ref())?;

        let row = GroupMessageRow {
            envelope: EnvelopeRow {
                global_id: msg.global_id,
                id: msg.id,
                sub_type: msg.sub_type.clone(),
                attribute_id,
                quoted_info_id,
                content,
            },
            group_code: msg.group_code,
            anonymous_id: msg.anonymous_id.clone(),
        };
        self.evict_expired(&conn, "group_message", msg.global_id)?;
        conn.execute(
            r#"
            INSERT INTO group_message (global_id, id, sub_type, group_code, anonymous_id, attribute_id, quoted_info_id, content, inserted_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                row.envelope.global_id,
                row.envelope.id,
                row.envelope.sub_type,
                row.group_code,
                row.anonymous_id,
                row.envelope.attribute_id,
                row.envelope.quoted_info_id,
                row.envelope.content,
                (self.clock)(),
            ],
        )
        .context("insert group message error")?;
        tracing::debug!("Stored group message {} in group {}", msg.global_id, msg.group_code);

        self.maybe_sweep(&mut conn);
        Ok(())
    }

    /// Store a private message with its attribute and quote
    pub fn insert_private_message(&self, msg: &StoredPrivateMessage) -> Result<()> {
        let quote = msg.quoted_info.as_ref().map(quote_row).transpose()?;
        let content = serde_json::to_string(msg).context("insert marshal content error")?;

        let _guard = self.write()?;
        let mut conn = self.conn()?;
        let (attribute_id, quoted_info_id) =
            self.link_parents(&conn, msg.attribute.as_ref(), quote.as_ref())?;

        let row = PrivateMessageRow {
            envelope: EnvelopeRow {
                global_id: msg.global_id,
                id: msg.id,
                sub_type: msg.sub_type.clone(),
                attribute_id,
                quoted_info_id,
                content,
            },
            session_uin: msg.session_uin,
            target_uin: msg.target_uin,
        };
        self.evict_expired(&conn, "private_message", msg.global_id)?;
        conn.execute(
            r#"
            INSERT INTO private_message (global_id, id, sub_type, session_uin, target_uin, attribute_id, quoted_info_id, content, inserted_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                row.envelope.global_id,
                row.envelope.id,
                row.envelope.sub_type,
                row.session_uin,
                row.target_uin,
                row.envelope.attribute_id,
                row.envelope.quoted_info_id,
                row.envelope.content,
                (self.clock)(),
            ],
        )
        .context("insert private message error")?;
        tracing::debug!("Stored private message {} with {}", msg.global_id, msg.session_uin);

        self.maybe_sweep(&mut conn);
        Ok(())
    }

    /// Write the attribute and quote rows an envelope will reference.
    ///
    /// Returns the keys to store; a key falls back to [`NO_REFERENCE`] when
    /// its row could not be written and linkage is best-effort.
    fn link_parents(
        &self,
        conn: &Connection,
        attribute: Option<&StoredMessageAttribute>,
        quote: Option<&QuoteRow>,
    ) -> Result<(SurrogateKey, SurrogateKey)> {
        let attribute_id = match attribute {
            Some(attr) => match insert_attribute(conn, attr) {
                Ok(id) => id,
                Err(e) if self.linkage == LinkageMode::BestEffort => {
                    tracing::warn!("Dropping attribute of sender {}: {}", attr.sender_uin, e);
                    NO_REFERENCE
                }
                Err(e) => return Err(e).context("insert attribute error"),
            },
            None => NO_REFERENCE,
        };

        let quoted_info_id = match quote {
            Some(row) => match insert_quote(conn, row) {
                Ok(()) => row.id,
                Err(e) if self.linkage == LinkageMode::BestEffort => {
                    tracing::warn!("Dropping quote of {}: {}", row.prev_global_id, e);
                    NO_REFERENCE
                }
                Err(e) => return Err(e).context("insert quoted info error"),
            },
            None => NO_REFERENCE,
        };

        Ok((attribute_id, quoted_info_id))
    }

    /// Drop an expired envelope holding `global_id` so the id can be reused.
    /// Live envelopes stay and still reject a duplicate insert.
    fn evict_expired(&self, conn: &Connection, table: &str, global_id: i32) -> Result<()> {
        let Some(cutoff) = self.expiry.cutoff((self.clock)()) else {
            return Ok(());
        };
        let evicted = conn
            .execute(
                &format!("DELETE FROM {} WHERE global_id = ?1 AND inserted_at < ?2", table),
                params![global_id, cutoff],
            )
            .context("evict expired message error")?;
        if evicted > 0 {
            tracing::debug!("Evicted expired {} row for global id {}", table, global_id);
        }
        Ok(())
    }

    fn maybe_sweep(&self, conn: &mut Connection) {
        let n = self.inserts.fetch_add(1, Ordering::Relaxed) + 1;
        if !self.expiry.is_enabled() || n % SWEEP_INTERVAL != 0 {
            return;
        }
        match self.expiry.sweep(conn, (self.clock)()) {
            Ok(stats) => tracing::debug!("Expiry sweep removed {} rows", stats.total()),
            Err(e) => tracing::warn!("Expiry sweep failed: {}", e),
        }
    }

    #[cfg(test)]
    fn sweep_now(&self) -> Result<super::expiry::SweepStats> {
        let _guard = self.write()?;
        let mut conn = self.conn()?;
        self.expiry
            .sweep(&mut conn, (self.clock)())
            .context("sweep expired rows error")
    }

    // ========== Lookup Operations ==========

    /// Find a message of either kind, trying groups first
    pub fn get_message_by_global_id(&self, global_id: i32) -> Result<StoredMessage> {
        match self.get_group_message_by_global_id(global_id) {
            Ok(msg) => Ok(msg.into()),
            Err(e) => {
                tracing::debug!("Group lookup of {} missed ({}), trying private", global_id, e);
                self.get_private_message_by_global_id(global_id).map(Into::into)
            }
        }
    }

    /// Find a group message by its global id
    pub fn get_group_message_by_global_id(&self, global_id: i32) -> Result<StoredGroupMessage> {
        let _guard = self.read()?;
        let conn = self.conn()?;
        let row = conn
            .query_row(
                r#"
                SELECT global_id, id, sub_type, attribute_id, quoted_info_id, content, group_code, anonymous_id
                FROM group_message WHERE global_id = ?1 AND inserted_at >= ?2
                "#,
                params![global_id, self.expiry.read_bound((self.clock)())],
                |row| {
                    Ok(GroupMessageRow {
                        envelope: row_to_envelope(row)?,
                        group_code: row.get(6)?,
                        anonymous_id: row.get(7)?,
                    })
                },
            )
            .optional()
            .context("query error")?
            .ok_or(Error::NotFound { kind: MessageKind::Group, global_id })?;

        let mut ret: StoredGroupMessage = decode_snapshot(&row.envelope.content);
        ret.id = row.envelope.id;
        ret.global_id = row.envelope.global_id;
        ret.sub_type = row.envelope.sub_type;
        ret.group_code = row.group_code;
        ret.anonymous_id = row.anonymous_id;
        ret.attribute = fetch_attribute(&conn, row.envelope.attribute_id);
        ret.quoted_info = fetch_quote(&conn, row.envelope.quoted_info_id);
        Ok(ret)
    }

    /// Find a private message by its global id
    pub fn get_private_message_by_global_id(&self, global_id: i32) -> Result<StoredPrivateMessage> {
        let _guard = self.read()?;
        let conn = self.conn()?;
        let row = conn
            .query_row(
                r#"
                SELECT global_id, id, sub_type, attribute_id, quoted_info_id, content, session_uin, target_uin
                FROM private_message WHERE global_id = ?1 AND inserted_at >= ?2
                "#,
                params![global_id, self.expiry.read_bound((self.clock)())],
                |row| {
                    Ok(PrivateMessageRow {
                        envelope: row_to_envelope(row)?,
                        session_uin: row.get(6)?,
                        target_uin: row.get(7)?,
                    })
                },
            )
            .optional()
            .context("query error")?
            .ok_or(Error::NotFound { kind: MessageKind::Private, global_id })?;

        let mut ret: StoredPrivateMessage = decode_snapshot(&row.envelope.content);
        ret.id = row.envelope.id;
        ret.global_id = row.envelope.global_id;
        ret.sub_type = row.envelope.sub_type;
        ret.session_uin = row.session_uin;
        ret.target_uin = row.target_uin;
        ret.attribute = fetch_attribute(&conn, row.envelope.attribute_id);
        ret.quoted_info = fetch_quote(&conn, row.envelope.quoted_info_id);
        Ok(ret)
    }

    // ========== Statistics ==========

    /// Get database statistics (sentinel rows excluded)
    pub fn stats(&self) -> Result<DbStats> {
        let _guard = self.read()?;
        let conn = self.conn()?;
        let count = |sql: &str| -> Result<usize> {
            let n: i64 = conn.query_row(sql, [], |row| row.get(0)).context("query error")?;
            Ok(n as usize)
        };
        Ok(DbStats {
            senders: count("SELECT COUNT(*) FROM uin_info WHERE uin != 0")?,
            attributes: count("SELECT COUNT(*) FROM message_attribute WHERE id != 0")?,
            quotes: count("SELECT COUNT(*) FROM quoted_info WHERE id != 0")?,
            group_messages: count("SELECT COUNT(*) FROM group_message")?,
            private_messages: count("SELECT COUNT(*) FROM private_message")?,
        })
    }
}

fn quote_row(quote: &QuotedInfo) -> Result<QuoteRow> {
    let quoted_content =
        serde_json::to_string(quote).context("insert marshal quoted content error")?;
    Ok(QuoteRow {
        id: hash::quote_key(&quote.prev_id, quote.prev_global_id, &quoted_content),
        prev_id: quote.prev_id.clone(),
        prev_global_id: quote.prev_global_id,
        quoted_content,
    })
}

/// Upsert the sender, then the content-addressed attribute row
fn insert_attribute(conn: &Connection, attr: &StoredMessageAttribute) -> rusqlite::Result<i64> {
    let sender = UinInfo { uin: attr.sender_uin, name: attr.sender_name.clone() };
    conn.execute(
        r#"
        INSERT INTO uin_info (uin, name) VALUES (?1, ?2)
        ON CONFLICT(uin) DO UPDATE SET name = excluded.name WHERE uin != 0
        "#,
        params![sender.uin, sender.name],
    )?;

    let row = AttributeRow {
        id: hash::attribute_key(attr),
        message_seq: attr.message_seq,
        internal_id: attr.internal_id,
        sender_uin: attr.sender_uin,
        timestamp: attr.timestamp,
    };
    conn.execute(
        r#"
        INSERT OR IGNORE INTO message_attribute (id, message_seq, internal_id, sender_uin, timestamp)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
        params![row.id, row.message_seq, row.internal_id, row.sender_uin, row.timestamp],
    )?;
    Ok(row.id)
}

fn insert_quote(conn: &Connection, row: &QuoteRow) -> rusqlite::Result<()> {
    conn.execute(
        r#"
        INSERT OR IGNORE INTO quoted_info (id, prev_id, prev_global_id, quoted_content)
        VALUES (?1, ?2, ?3, ?4)
        "#,
        params![row.id, row.prev_id, row.prev_global_id, row.quoted_content],
    )?;
    Ok(())
}

/// Helper to convert the shared leading columns to an EnvelopeRow
fn row_to_envelope(row: &rusqlite::Row) -> rusqlite::Result<EnvelopeRow> {
    Ok(EnvelopeRow {
        global_id: row.get(0)?,
        id: row.get(1)?,
        sub_type: row.get(2)?,
        attribute_id: row.get(3)?,
        quoted_info_id: row.get(4)?,
        content: row.get(5)?,
    })
}

/// Restore the full snapshot; normalized columns and joins override it
fn decode_snapshot<T>(content: &str) -> T
where
    T: serde::de::DeserializeOwned + Default,
{
    match serde_json::from_str(content) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!("Unreadable message snapshot: {}", e);
            T::default()
        }
    }
}

/// Join the attribute and its sender. Any miss drops the attribute.
fn fetch_attribute(conn: &Connection, id: SurrogateKey) -> Option<StoredMessageAttribute> {
    if id == NO_REFERENCE {
        return None;
    }
    let joined = conn
        .query_row(
            r#"
            SELECT a.id, a.message_seq, a.internal_id, a.sender_uin, a.timestamp, u.name
            FROM message_attribute a JOIN uin_info u ON u.uin = a.sender_uin
            WHERE a.id = ?1
            "#,
            params![id],
            |row| {
                let attr = AttributeRow {
                    id: row.get(0)?,
                    message_seq: row.get(1)?,
                    internal_id: row.get(2)?,
                    sender_uin: row.get(3)?,
                    timestamp: row.get(4)?,
                };
                Ok((attr, row.get::<_, String>(5)?))
            },
        )
        .optional();

    match joined {
        Ok(Some((attr, sender_name))) => Some(StoredMessageAttribute {
            message_seq: attr.message_seq,
            internal_id: attr.internal_id,
            sender_uin: attr.sender_uin,
            sender_name,
            timestamp: attr.timestamp,
        }),
        Ok(None) => {
            tracing::debug!("Attribute {} has no row", id);
            None
        }
        Err(e) => {
            tracing::warn!("Attribute {} join failed: {}", id, e);
            None
        }
    }
}

/// Join the quote row; columns win over its serialized snapshot
fn fetch_quote(conn: &Connection, id: SurrogateKey) -> Option<QuotedInfo> {
    if id == NO_REFERENCE {
        return None;
    }
    let row = conn
        .query_row(
            "SELECT id, prev_id, prev_global_id, quoted_content FROM quoted_info WHERE id = ?1",
            params![id],
            |row| {
                Ok(QuoteRow {
                    id: row.get(0)?,
                    prev_id: row.get(1)?,
                    prev_global_id: row.get(2)?,
                    quoted_content: row.get(3)?,
                })
            },
        )
        .optional();

    match row {
        Ok(Some(row)) => {
            let mut quote: QuotedInfo = decode_snapshot(&row.quoted_content);
            quote.prev_id = row.prev_id;
            quote.prev_global_id = row.prev_global_id;
            Some(quote)
        }
        Ok(None) => {
            tracing::debug!("Quote {} has no row", id);
            None
        }
        Err(e) => {
            tracing::warn!("Quote {} join failed: {}", id, e);
            None
        }
    }
}

/// Database statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbStats {
    pub senders: usize,
    pub attributes: usize,
    pub quotes: usize,
    pub group_messages: usize,
    pub private_messages: usize,
}

impl DbStats {
    /// Rows as (table, count) pairs
    pub fn rows(&self) -> [(&'static str, usize); 5] {
        [
            (schema::UIN_INFO_TABLE, self.senders),
            (schema::MESSAGE_ATTRIBUTE_TABLE, self.attributes),
            (schema::QUOTED_INFO_TABLE, self.quotes),
            (schema::GROUP_MESSAGE_TABLE, self.group_messages),
            (schema::PRIVATE_MESSAGE_TABLE, self.private_messages),
        ]
    }
}

impl std::fmt::Display for DbStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Database Statistics:")?;
        writeln!(f, "  Senders: {}", self.senders)?;
        writeln!(f, "  Attributes: {}", self.attributes)?;
        writeln!(f, "  Quotes: {}", self.quotes)?;
        writeln!(f, "  Group messages: {}", self.group_messages)?;
        writeln!(f, "  Private messages: {}", self.private_messages)
    }
}
