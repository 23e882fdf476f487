//! Storage Layer - SQLite-backed message persistence
//!
//! System of record is SQLite with tables:
//! - uin_info(uin, name)
//! - message_attribute(id, message_seq, internal_id, sender_uin, timestamp)
//! - quoted_info(id, prev_id, prev_global_id, quoted_content)
//! - group_message(global_id, id, sub_type, group_code, anonymous_id, attribute_id, quoted_info_id, content, inserted_at)
//! - private_message(global_id, id, sub_type, session_uin, target_uin, attribute_id, quoted_info_id, content, inserted_at)

pub mod expiry;
pub mod schema;
pub mod sqlite;

pub use expiry::{ExpiryPolicy, SweepStats};
pub use sqlite::{DATABASE_FILE_NAME, DbStats, LinkageMode, SqliteStore};
