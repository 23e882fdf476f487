//! # msgdb - Embedded message persistence for chat relays
//!
//! Durably stores inbound/outbound chat messages so they can be fetched
//! again by their global id, e.g. to resolve a reply/quote reference.
//!
//! msgdb provides:
//! - Content-addressed surrogate keys for shared sub-records
//! - A normalized SQLite schema (senders, attributes, quotes, envelopes)
//! - A lock-guarded storage gateway with time-to-live expiry
//! - A backend registry driven by TOML configuration

pub mod message;
pub mod hash;
pub mod storage;
pub mod backend;
pub mod config;
pub mod ui;

// Re-exports for convenient access
pub use message::{
    MessageKind, Msg, QuotedInfo, StoredGroupMessage, StoredMessage, StoredMessageAttribute,
    StoredPrivateMessage,
};
pub use hash::SurrogateKey;
pub use storage::{LinkageMode, SqliteStore};
pub use backend::{Database, MultiDatabase, Registry};

/// Result type alias for msgdb operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for msgdb operations
///
/// `context` is a short static string naming the failing operation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{context}: {source}")]
    Storage {
        context: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    #[error("{context}: {source}")]
    Serialize {
        context: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("{kind} message with global id {global_id} not found")]
    NotFound { kind: MessageKind, global_id: i32 },

    #[error("Config error: {0}")]
    Config(String),

    #[error("database disabled: no backend enabled")]
    Disabled,

    #[error("storage lock poisoned")]
    LockPoisoned,
}

impl Error {
    /// Whether this error is a lookup miss rather than a failure
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}

/// Attach a static operation context to a foreign error
pub(crate) trait Context<T> {
    fn context(self, context: &'static str) -> Result<T>;
}

impl<T> Context<T> for std::result::Result<T, rusqlite::Error> {
    fn context(self, context: &'static str) -> Result<T> {
        self.map_err(|source| Error::Storage { context, source })
    }
}

impl<T> Context<T> for std::result::Result<T, std::io::Error> {
    fn context(self, context: &'static str) -> Result<T> {
        self.map_err(|source| Error::Io { context, source })
    }
}

impl<T> Context<T> for std::result::Result<T, serde_json::Error> {
    fn context(self, context: &'static str) -> Result<T> {
        self.map_err(|source| Error::Serialize { context, source })
    }
}
