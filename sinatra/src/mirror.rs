//! Best-effort local persistence so a reload can paint the last known
//! values while fresh fetches are in flight.
//!
//! Entries never expire; they are stale until overwritten. Every key
//! belongs to a [`Scope`] and logout only clears the identity scope, so
//! preferences such as the theme survive it.
use crate::Error;
use serde::{de::DeserializeOwned, Serialize};
use std::{cell::RefCell, collections::BTreeMap, fmt, rc::Rc};
use tracing::{debug, warn};

/// Synchronous string key-value storage provided by the platform.
pub trait Store {
    fn get(&self, key: &str) -> Result<Option<String>, Error>;
    fn set(&self, key: &str, value: &str) -> Result<(), Error>;
    fn remove(&self, key: &str) -> Result<(), Error>;
    fn keys(&self) -> Result<Vec<String>, Error>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RefCell<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Rc<MemoryStore> {
        Rc::new(MemoryStore::default())
    }
}

impl Store for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, Error> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), Error> {
        self.entries
            .borrow_mut()
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), Error> {
        self.entries.borrow_mut().remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, Error> {
        Ok(self.entries.borrow().keys().cloned().collect())
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Scope {
    /// Tied to the signed-in user; cleared on logout
    Identity,
    /// Device preferences that outlive a session
    Preference,
}

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum Key {
    Theme,
    Session,
    GenreData(String),
    PublicProfile(String),
    LastPlayedTrack,
    LastPlayedUpdatedAt,
}

impl Key {
    pub fn parse(key: &str) -> Option<Key> {
        match key {
            "theme" => Some(Key::Theme),
            "session" => Some(Key::Session),
            "last_played_track" => Some(Key::LastPlayedTrack),
            "last_played_updated_at" => Some(Key::LastPlayedUpdatedAt),
            _ => match key.split_once(':')? {
                ("genreData", user_id) => Some(Key::GenreData(user_id.to_owned())),
                ("publicProfile", user_id) => Some(Key::PublicProfile(user_id.to_owned())),
                _ => None,
            },
        }
    }

    pub fn scope(&self) -> Scope {
        match self {
            Key::Theme => Scope::Preference,
            Key::Session
            | Key::GenreData(_)
            | Key::PublicProfile(_)
            | Key::LastPlayedTrack
            | Key::LastPlayedUpdatedAt => Scope::Identity,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Theme => write!(f, "theme"),
            Key::Session => write!(f, "session"),
            Key::GenreData(user_id) => write!(f, "genreData:{user_id}"),
            Key::PublicProfile(user_id) => write!(f, "publicProfile:{user_id}"),
            Key::LastPlayedTrack => write!(f, "last_played_track"),
            Key::LastPlayedUpdatedAt => write!(f, "last_played_updated_at"),
        }
    }
}

pub struct Mirror {
    store: Rc<dyn Store>,
}

impl Mirror {
    pub fn new(store: Rc<dyn Store>) -> Mirror {
        Mirror { store }
    }

    /// Absent entries, unreadable storage and malformed JSON are all a miss.
    pub fn read<T: DeserializeOwned>(&self, key: &Key) -> Option<T> {
        let raw = self.read_raw(key)?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!(%key, error = %e, "discarding malformed mirror entry");
                None
            }
        }
    }

    /// Plain string entries (`theme`, `last_played_updated_at`).
    pub fn read_raw(&self, key: &Key) -> Option<String> {
        match self.store.get(&key.to_string()) {
            Ok(value) => value,
            Err(e) => {
                warn!(%key, error = %e, "mirror read failed");
                None
            }
        }
    }

    pub fn write<T: Serialize + ?Sized>(&self, key: &Key, value: &T) {
        match serde_json::to_string(value) {
            Ok(raw) => self.write_raw(key, &raw),
            Err(e) => warn!(%key, error = %e, "mirror entry not serializable"),
        }
    }

    pub fn write_raw(&self, key: &Key, value: &str) {
        if let Err(e) = self.store.set(&key.to_string(), value) {
            warn!(%key, error = %e, "mirror write failed");
        }
    }

    pub fn remove(&self, key: &Key) {
        if let Err(e) = self.store.remove(&key.to_string()) {
            warn!(%key, error = %e, "mirror remove failed");
        }
    }

    /// Removes every recognised key in `scope` and returns how many went.
    /// Keys this layer does not own are left alone.
    pub fn clear(&self, scope: Scope) -> usize {
        let keys = match self.store.keys() {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "mirror keys unavailable");
                return 0;
            }
        };
        let mut removed = 0;
        for key in keys.iter().filter_map(|k| Key::parse(k)) {
            if key.scope() == scope {
                self.remove(&key);
                removed += 1;
            }
        }
        debug!(?scope, removed, "cleared mirror scope");
        removed
    }
}
