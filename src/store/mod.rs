//! Persistence and identity seams.
//!
//! The coordinators snapshot their whole state maps through
//! [`SnapshotStore`] after every successful mutation; the rating
//! calculator reads and writes player rows through [`RatingStore`]; queue
//! entries resolve display names and ranked eligibility through
//! [`IdentityProvider`]. JSON-on-disk implementations live here alongside
//! in-memory ones for tests.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StorageError;
use crate::rating::{PlayerRating, RankedGameRecord};

/// Whole-value snapshot storage keyed by name.
pub trait SnapshotStore: Send + Sync {
    fn put(&self, key: &str, json: &str) -> Result<(), StorageError>;
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
}

/// Serialize and store a snapshot under `key`.
pub fn save_snapshot<T: Serialize>(
    store: &dyn SnapshotStore,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let json = serde_json::to_string(value)?;
    store.put(key, &json)
}

/// Load and deserialize the snapshot under `key`, if any.
pub fn load_snapshot<T: DeserializeOwned>(
    store: &dyn SnapshotStore,
    key: &str,
) -> Result<Option<T>, StorageError> {
    match store.get(key)? {
        Some(json) => Ok(Some(serde_json::from_str(&json)?)),
        None => Ok(None),
    }
}

/// The `~/.goban/` data directory, created on first use.
pub fn data_dir() -> io::Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, "could not determine home directory")
    })?;
    let dir = home.join(".goban");
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Snapshot store writing one JSON file per key under a directory.
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: PathBuf) -> io::Result<Self> {
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Store rooted at the default data directory.
    pub fn open_default() -> io::Result<Self> {
        Ok(Self { dir: data_dir()? })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl SnapshotStore for JsonFileStore {
    fn put(&self, key: &str, json: &str) -> Result<(), StorageError> {
        let path = self.path_for(key);
        fs::write(&path, json)?;
        tracing::debug!(key, bytes = json.len(), "snapshot written");
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(json) => Ok(Some(json)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory snapshot store for tests and the demo binary.
#[derive(Default)]
pub struct MemorySnapshotStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn put(&self, key: &str, json: &str) -> Result<(), StorageError> {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), json.to_string());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }
}

/// Tabular storage for player ratings and ranked game history.
pub trait RatingStore: Send + Sync {
    /// The player's row, or a fresh 1200 row if they have no history.
    fn rating(&self, user_id: &str) -> Result<PlayerRating, StorageError>;
    fn put_rating(&self, row: &PlayerRating) -> Result<(), StorageError>;
    fn append_history(&self, record: &RankedGameRecord) -> Result<(), StorageError>;
    fn history_for(&self, user_id: &str) -> Result<Vec<RankedGameRecord>, StorageError>;
}

/// Rating store layered on a [`SnapshotStore`]: one document for the
/// rating table, one for the history log.
pub struct SnapshotRatingStore<S> {
    store: S,
    lock: Mutex<()>,
}

const RATINGS_KEY: &str = "ratings";
const HISTORY_KEY: &str = "ranked_history";

impl<S: SnapshotStore> SnapshotRatingStore<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            lock: Mutex::new(()),
        }
    }

    fn table(&self) -> Result<HashMap<String, PlayerRating>, StorageError> {
        Ok(load_snapshot(&self.store, RATINGS_KEY)?.unwrap_or_default())
    }

    fn log(&self) -> Result<Vec<RankedGameRecord>, StorageError> {
        Ok(load_snapshot(&self.store, HISTORY_KEY)?.unwrap_or_default())
    }
}

impl<S: SnapshotStore> RatingStore for SnapshotRatingStore<S> {
    fn rating(&self, user_id: &str) -> Result<PlayerRating, StorageError> {
        let _guard = self.lock.lock().unwrap();
        Ok(self
            .table()?
            .remove(user_id)
            .unwrap_or_else(|| PlayerRating::new(user_id)))
    }

    fn put_rating(&self, row: &PlayerRating) -> Result<(), StorageError> {
        let _guard = self.lock.lock().unwrap();
        let mut table = self.table()?;
        table.insert(row.user_id.clone(), row.clone());
        save_snapshot(&self.store, RATINGS_KEY, &table)
    }

    fn append_history(&self, record: &RankedGameRecord) -> Result<(), StorageError> {
        let _guard = self.lock.lock().unwrap();
        let mut log = self.log()?;
        log.push(record.clone());
        save_snapshot(&self.store, HISTORY_KEY, &log)
    }

    fn history_for(&self, user_id: &str) -> Result<Vec<RankedGameRecord>, StorageError> {
        let _guard = self.lock.lock().unwrap();
        Ok(self
            .log()?
            .into_iter()
            .filter(|r| r.black_user == user_id || r.white_user == user_id)
            .collect())
    }
}

/// Read-only source of display names and ranked eligibility. The core
/// treats user ids as opaque; this is the only place they are resolved.
pub trait IdentityProvider: Send + Sync {
    fn display_name(&self, user_id: &str) -> String;
    fn ranked_eligible(&self, user_id: &str) -> bool;
}

/// Permissive identity source: the id is the name, everyone may play
/// ranked. Useful for tests and local runs.
pub struct OpenIdentity;

impl IdentityProvider for OpenIdentity {
    fn display_name(&self, user_id: &str) -> String {
        user_id.to_string()
    }

    fn ranked_eligible(&self, _user_id: &str) -> bool {
        true
    }
}
