//! Backend abstraction and registry
//!
//! Backends register a constructor under a name. Each constructor decodes
//! its own `[database.<name>]` section and returns `None` when disabled.

use std::collections::BTreeMap;

use crate::config::{MsgdbConfig, SqliteConfig};
use crate::message::{StoredGroupMessage, StoredMessage, StoredPrivateMessage};
use crate::storage::SqliteStore;
use crate::{Error, Result};

/// A message store that can be written to and looked up by global id
pub trait Database: Send + Sync {
    fn get_message_by_global_id(&self, global_id: i32) -> Result<StoredMessage>;
    fn get_group_message_by_global_id(&self, global_id: i32) -> Result<StoredGroupMessage>;
    fn get_private_message_by_global_id(&self, global_id: i32) -> Result<StoredPrivateMessage>;
    fn insert_group_message(&self, msg: &StoredGroupMessage) -> Result<()>;
    fn insert_private_message(&self, msg: &StoredPrivateMessage) -> Result<()>;
}

impl Database for SqliteStore {
    fn get_message_by_global_id(&self, global_id: i32) -> Result<StoredMessage> {
        SqliteStore::get_message_by_global_id(self, global_id)
    }

    fn get_group_message_by_global_id(&self, global_id: i32) -> Result<StoredGroupMessage> {
        SqliteStore::get_group_message_by_global_id(self, global_id)
    }

    fn get_private_message_by_global_id(&self, global_id: i32) -> Result<StoredPrivateMessage> {
        SqliteStore::get_private_message_by_global_id(self, global_id)
    }

    fn insert_group_message(&self, msg: &StoredGroupMessage) -> Result<()> {
        SqliteStore::insert_group_message(self, msg)
    }

    fn insert_private_message(&self, msg: &StoredPrivateMessage) -> Result<()> {
        SqliteStore::insert_private_message(self, msg)
    }
}

/// Builds and opens a backend from its config section
pub type Constructor = fn(&toml::Value) -> Result<Option<Box<dyn Database>>>;

/// Name to constructor mapping
pub struct Registry {
    constructors: BTreeMap<String, Constructor>,
}

impl Registry {
    pub fn new() -> Self {
        Self { constructors: BTreeMap::new() }
    }

    /// Registry with every built-in backend
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("sqlite3", open_sqlite);
        registry
    }

    pub fn register(&mut self, name: &str, constructor: Constructor) {
        self.constructors.insert(name.to_string(), constructor);
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }

    /// Open every configured and enabled backend; the first failure aborts
    pub fn open_all(&self, config: &MsgdbConfig) -> Result<MultiDatabase> {
        let mut backends = Vec::new();
        for (name, section) in &config.database {
            let Some(constructor) = self.constructors.get(name) else {
                tracing::warn!("Unknown database backend {}, ignoring", name);
                continue;
            };
            if let Some(backend) = constructor(section)? {
                tracing::info!("Enabled database backend {}", name);
                backends.push(backend);
            }
        }
        Ok(MultiDatabase::new(backends))
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn open_sqlite(section: &toml::Value) -> Result<Option<Box<dyn Database>>> {
    let config = SqliteConfig::from_value(section)?
        .with_path_override(std::env::var(crate::config::DATABASE_PATH_ENV).ok());
    if !config.enable {
        return Ok(None);
    }
    let store = SqliteStore::open(&config.database_file(), config.ttl()?)?
        .with_linkage(config.linkage());
    Ok(Some(Box::new(store)))
}

/// Fans writes out to every backend and reads from the first that answers
pub struct MultiDatabase {
    backends: Vec<Box<dyn Database>>,
}

impl MultiDatabase {
    pub fn new(backends: Vec<Box<dyn Database>>) -> Self {
        Self { backends }
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    fn first_hit<T>(&self, lookup: impl Fn(&dyn Database) -> Result<T>) -> Result<T> {
        let mut last_err = Error::Disabled;
        for backend in &self.backends {
            match lookup(backend.as_ref()) {
                Ok(found) => return Ok(found),
                Err(e) => last_err = e,
            }
        }
        Err(last_err)
    }

    fn each(&self, write: impl Fn(&dyn Database) -> Result<()>) -> Result<()> {
        for backend in &self.backends {
            write(backend.as_ref())?;
        }
        Ok(())
    }
}

impl Database for MultiDatabase {
    fn get_message_by_global_id(&self, global_id: i32) -> Result<StoredMessage> {
        self.first_hit(|db| db.get_message_by_global_id(global_id))
    }

    fn get_group_message_by_global_id(&self, global_id: i32) -> Result<StoredGroupMessage> {
        self.first_hit(|db| db.get_group_message_by_global_id(global_id))
    }

    fn get_private_message_by_global_id(&self, global_id: i32) -> Result<StoredPrivateMessage> {
        self.first_hit(|db| db.get_private_message_by_global_id(global_id))
    }

    fn insert_group_message(&self, msg: &StoredGroupMessage) -> Result<()> {
        self.each(|db| db.insert_group_message(msg))
    }

    fn insert_private_message(&self, msg: &StoredPrivateMessage) -> Result<()> {
        self.each(|db| db.insert_private_message(msg))
    }
}
