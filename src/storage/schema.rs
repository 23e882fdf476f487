//! Database schema definitions
//!
//! Parents are created before children so the foreign keys resolve:
//! uin_info <- message_attribute <- {group_message, private_message} -> quoted_info

pub const UIN_INFO_TABLE: &str = "uin_info";
pub const MESSAGE_ATTRIBUTE_TABLE: &str = "message_attribute";
pub const QUOTED_INFO_TABLE: &str = "quoted_info";
pub const GROUP_MESSAGE_TABLE: &str = "group_message";
pub const PRIVATE_MESSAGE_TABLE: &str = "private_message";

/// SQL to create the uin_info table
///
/// `uin` must be unique to serve as a foreign key parent, so a re-inserted
/// sender updates its display name snapshot.
pub const CREATE_UIN_INFO_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS uin_info (
    uin INTEGER PRIMARY KEY,
    name TEXT NOT NULL
)
"#;

/// SQL to create the message_attribute table (id is content-derived)
pub const CREATE_MESSAGE_ATTRIBUTE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS message_attribute (
    id INTEGER PRIMARY KEY,
    message_seq INTEGER NOT NULL,
    internal_id INTEGER NOT NULL,
    sender_uin INTEGER NOT NULL,
    timestamp INTEGER NOT NULL,
    FOREIGN KEY(sender_uin) REFERENCES uin_info(uin)
)
"#;

/// SQL to create the quoted_info table (id is content-derived)
pub const CREATE_QUOTED_INFO_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS quoted_info (
    id INTEGER PRIMARY KEY,
    prev_id TEXT NOT NULL,
    prev_global_id INTEGER NOT NULL,
    quoted_content TEXT NOT NULL
)
"#;

/// SQL to create the group_message envelope table
pub const CREATE_GROUP_MESSAGE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS group_message (
    global_id INTEGER PRIMARY KEY,
    id INTEGER NOT NULL,
    sub_type TEXT NOT NULL,
    group_code INTEGER NOT NULL,
    anonymous_id TEXT NOT NULL,
    attribute_id INTEGER NOT NULL DEFAULT 0,
    quoted_info_id INTEGER NOT NULL DEFAULT 0,
    content TEXT NOT NULL,
    inserted_at INTEGER NOT NULL,
    FOREIGN KEY(attribute_id) REFERENCES message_attribute(id),
    FOREIGN KEY(quoted_info_id) REFERENCES quoted_info(id)
)
"#;

/// SQL to create the private_message envelope table
pub const CREATE_PRIVATE_MESSAGE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS private_message (
    global_id INTEGER PRIMARY KEY,
    id INTEGER NOT NULL,
    sub_type TEXT NOT NULL,
    session_uin INTEGER NOT NULL,
    target_uin INTEGER NOT NULL,
    attribute_id INTEGER NOT NULL DEFAULT 0,
    quoted_info_id INTEGER NOT NULL DEFAULT 0,
    content TEXT NOT NULL,
    inserted_at INTEGER NOT NULL,
    FOREIGN KEY(attribute_id) REFERENCES message_attribute(id),
    FOREIGN KEY(quoted_info_id) REFERENCES quoted_info(id)
)
"#;

/// SQL to create indexes
pub const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_attribute_sender ON message_attribute(sender_uin)",
    "CREATE INDEX IF NOT EXISTS idx_group_attribute ON group_message(attribute_id)",
    "CREATE INDEX IF NOT EXISTS idx_group_quoted ON group_message(quoted_info_id)",
    "CREATE INDEX IF NOT EXISTS idx_group_inserted_at ON group_message(inserted_at)",
    "CREATE INDEX IF NOT EXISTS idx_private_attribute ON private_message(attribute_id)",
    "CREATE INDEX IF NOT EXISTS idx_private_quoted ON private_message(quoted_info_id)",
    "CREATE INDEX IF NOT EXISTS idx_private_inserted_at ON private_message(inserted_at)",
];

/// Sentinel "null" rows. Key 0 is the target of every envelope without an
/// attribute or quote, so these double as the "no reference" parents.
pub const INSERT_SENTINEL_ROWS: &[&str] = &[
    "INSERT OR IGNORE INTO uin_info (uin, name) VALUES (0, 'null')",
    "INSERT OR IGNORE INTO message_attribute (id, message_seq, internal_id, sender_uin, timestamp) VALUES (0, 0, 0, 0, 0)",
    "INSERT OR IGNORE INTO quoted_info (id, prev_id, prev_global_id, quoted_content) VALUES (0, '', 0, 'null')",
];

/// All schema creation statements, parents first
pub fn all_schema_statements() -> Vec<&'static str> {
    let mut stmts = vec![
        CREATE_UIN_INFO_TABLE,
        CREATE_MESSAGE_ATTRIBUTE_TABLE,
        CREATE_QUOTED_INFO_TABLE,
        CREATE_GROUP_MESSAGE_TABLE,
        CREATE_PRIVATE_MESSAGE_TABLE,
    ];
    stmts.extend(CREATE_INDEXES.iter().copied());
    stmts
}

/// A sender's display name snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UinInfo {
    pub uin: i64,
    pub name: String,
}

/// Normalized attribute row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeRow {
    pub id: i64,
    pub message_seq: i32,
    pub internal_id: i32,
    pub sender_uin: i64,
    pub timestamp: i64,
}

/// Normalized quote row; `quoted_content` is the serialized full quote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteRow {
    pub id: i64,
    pub prev_id: String,
    pub prev_global_id: i32,
    pub quoted_content: String,
}

/// Columns shared by both envelope tables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvelopeRow {
    pub global_id: i32,
    pub id: i64,
    pub sub_type: String,
    pub attribute_id: i64,
    pub quoted_info_id: i64,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupMessageRow {
    pub envelope: EnvelopeRow,
    pub group_code: i64,
    pub anonymous_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivateMessageRow {
    pub envelope: EnvelopeRow,
    pub session_uin: i64,
    pub target_uin: i64,
}
