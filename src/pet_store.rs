//! Store boundary and the LMDB-backed pet store.
//!
//! [`RecordStore`] is the contract the editor core consumes: CRUD plus a
//! change-notification channel keyed by locator or collection. [`PetStore`]
//! is the production implementation on top of LMDB, storing each pet as a
//! JSON document under a big-endian `u64` key. Store handles are cheap to
//! clone and safe to share across threads, which is what lets a loader worker
//! query while the foreground keeps writing.

use std::fmt::{Display, Formatter};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use lmdb::{Database, DatabaseFlags, Environment, Transaction, WriteFlags};
use log::{info, warn};

use crate::pet_model::{Locator, Pet, PetRecord};

/// Name of the single collection this store manages.
pub const PETS_COLLECTION: &str = "pets";

const META_DB: &str = "meta";
const NEXT_ID_KEY: &[u8] = b"next_id";
const MAP_SIZE: usize = 16 * 1024 * 1024;

/// Errors surfaced by the store layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    Database(String),
    Serialization(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Database(msg) => write!(f, "Database error: {}", msg),
            StoreError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

impl From<lmdb::Error> for StoreError {
    fn from(err: lmdb::Error) -> Self {
        match err {
            lmdb::Error::Corrupted => {
                StoreError::Database("Database is corrupted".to_string())
            }
            lmdb::Error::MapFull => {
                StoreError::Database("Database map is full".to_string())
            }
            _ => StoreError::Database(format!("LMDB error: {err}")),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(format!("JSON serialization error: {err}"))
    }
}

/// What a change-notification subscription listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeScope {
    /// Every successful write to the collection.
    Collection,
    /// Writes touching one specific row.
    Record(Locator),
}

impl ChangeScope {
    fn matches(self, changed: Locator) -> bool {
        match self {
            ChangeScope::Collection => true,
            ChangeScope::Record(locator) => locator == changed,
        }
    }
}

/// Handle for removing a change-notification subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchToken(u64);

/// The store contract the editor core consumes.
///
/// `query` is synchronous from the store's point of view; making it
/// non-blocking to the session owner is the loader's job. Change
/// notifications fire after every successful insert or update, including
/// writes issued by other sessions on the same store.
///
/// Subscription callbacks run on the writing thread while the watcher
/// registry is held; they must be cheap (a channel send) and must not call
/// back into `subscribe` or `unsubscribe`.
pub trait RecordStore: Send + Sync {
    /// Creates a new row and returns the locator the store assigned to it.
    fn insert(&self, fields: &PetRecord) -> Result<Locator, StoreError>;

    /// Overwrites the row named by `locator`. Returns the affected row
    /// count: 1 when the row existed, 0 when the locator resolves to
    /// nothing.
    fn update(&self, locator: Locator, fields: &PetRecord) -> Result<usize, StoreError>;

    /// Fetches zero or one row.
    fn query(&self, locator: Locator) -> Result<Option<Pet>, StoreError>;

    /// Registers a change-notification callback and returns its token.
    fn subscribe(
        &self,
        scope: ChangeScope,
        callback: Box<dyn Fn(Locator) + Send + Sync>,
    ) -> WatchToken;

    /// Removes a subscription. Unknown tokens are ignored.
    fn unsubscribe(&self, token: WatchToken);
}

struct Watcher {
    token: WatchToken,
    scope: ChangeScope,
    callback: Box<dyn Fn(Locator) + Send + Sync>,
}

struct StoreInner {
    env: Environment,
    pets: Database,
    meta: Database,
    watchers: Mutex<Vec<Watcher>>,
    next_token: AtomicU64,
}

/// LMDB-backed implementation of [`RecordStore`].
///
/// The store lives in a `<name>.lmdb` directory with two named databases:
/// `pets` holds the rows, `meta` holds the locator counter. Cloning a
/// `PetStore` clones a handle to the same environment.
///
/// # Examples
///
/// ```no_run
/// use pet_editor_core::pet_store::{PetStore, RecordStore};
/// use pet_editor_core::pet_model::PetRecord;
///
/// let store = PetStore::open("pet_catalog").unwrap();
/// let fields = PetRecord {
///     name: "Max".to_string(),
///     breed: "Labrador".to_string(),
///     gender: 1,
///     weight: 22,
/// };
/// let locator = store.insert(&fields).unwrap();
/// let loaded = store.query(locator).unwrap();
/// assert!(loaded.is_some());
/// ```
#[derive(Clone)]
pub struct PetStore {
    inner: Arc<StoreInner>,
}

impl PetStore {
    /// Opens (or creates) the store directory `<name>.lmdb`.
    ///
    /// # Errors
    ///
    /// Fails when the directory cannot be created or the LMDB environment
    /// cannot be initialized, typically because the location is not
    /// writable.
    pub fn open(name: &str) -> Result<PetStore, StoreError> {
        let dir = format!("{name}.lmdb");

        fs::create_dir_all(&dir).map_err(|e| {
            StoreError::Database(format!("Cannot create store directory {dir}: {e}"))
        })?;

        info!("Opening pet store at: {dir}");

        let env = Environment::new()
            .set_max_dbs(2)
            .set_map_size(MAP_SIZE)
            .open(Path::new(&dir))?;
        let pets = env.create_db(Some(PETS_COLLECTION), DatabaseFlags::empty())?;
        let meta = env.create_db(Some(META_DB), DatabaseFlags::empty())?;

        Ok(PetStore {
            inner: Arc::new(StoreInner {
                env,
                pets,
                meta,
                watchers: Mutex::new(Vec::new()),
                next_token: AtomicU64::new(1),
            }),
        })
    }

    /// Returns every stored pet in locator order.
    ///
    /// This is what the catalog list screen renders. Locators are assigned
    /// monotonically and never reused, so a scan from 1 up to the current
    /// counter covers every row that ever existed.
    pub fn query_all(&self) -> Result<Vec<Pet>, StoreError> {
        let txn = self.inner.env.begin_ro_txn()?;

        let next_id = match txn.get(self.inner.meta, &NEXT_ID_KEY) {
            Ok(bytes) => decode_counter(bytes)?,
            Err(lmdb::Error::NotFound) => 1,
            Err(e) => return Err(e.into()),
        };

        let mut pets = Vec::new();
        for id in 1..next_id {
            let locator = Locator::new(id);
            match txn.get(self.inner.pets, &locator.to_key()) {
                Ok(bytes) => {
                    let record: PetRecord = serde_json::from_slice(bytes)?;
                    pets.push(Pet::from_record(locator, record));
                }
                Err(lmdb::Error::NotFound) => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Ok(pets)
    }

    /// Marks this handle as done: drops every subscription. The LMDB
    /// environment itself closes once the last clone of the handle is
    /// dropped.
    pub fn close(&self) {
        let mut watchers = match self.inner.watchers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        watchers.clear();
        info!("Pet store closed; subscriptions dropped");
    }

    fn notify_change(&self, changed: Locator) {
        let watchers = match self.inner.watchers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        for watcher in watchers.iter().filter(|w| w.scope.matches(changed)) {
            (watcher.callback)(changed);
        }
    }
}

impl RecordStore for PetStore {
    fn insert(&self, fields: &PetRecord) -> Result<Locator, StoreError> {
        let payload = serde_json::to_vec(fields)?;

        let mut txn = self.inner.env.begin_rw_txn()?;
        let id = match txn.get(self.inner.meta, &NEXT_ID_KEY) {
            Ok(bytes) => decode_counter(bytes)?,
            Err(lmdb::Error::NotFound) => 1,
            Err(e) => return Err(e.into()),
        };
        let locator = Locator::new(id);
        txn.put(
            self.inner.pets,
            &locator.to_key(),
            &payload,
            WriteFlags::empty(),
        )?;
        txn.put(
            self.inner.meta,
            &NEXT_ID_KEY,
            &(id + 1).to_be_bytes(),
            WriteFlags::empty(),
        )?;
        txn.commit()?;

        info!("Inserted pet row {locator}");
        self.notify_change(locator);
        Ok(locator)
    }

    fn update(&self, locator: Locator, fields: &PetRecord) -> Result<usize, StoreError> {
        let payload = serde_json::to_vec(fields)?;

        let mut txn = self.inner.env.begin_rw_txn()?;
        let exists = match txn.get(self.inner.pets, &locator.to_key()) {
            Ok(_) => true,
            Err(lmdb::Error::NotFound) => false,
            Err(e) => return Err(e.into()),
        };
        if !exists {
            txn.abort();
            return Ok(0);
        }
        txn.put(
            self.inner.pets,
            &locator.to_key(),
            &payload,
            WriteFlags::empty(),
        )?;
        txn.commit()?;

        info!("Updated pet row {locator}");
        self.notify_change(locator);
        Ok(1)
    }

    fn query(&self, locator: Locator) -> Result<Option<Pet>, StoreError> {
        let txn = self.inner.env.begin_ro_txn()?;
        match txn.get(self.inner.pets, &locator.to_key()) {
            Ok(bytes) => {
                let record: PetRecord = serde_json::from_slice(bytes)?;
                Ok(Some(Pet::from_record(locator, record)))
            }
            Err(lmdb::Error::NotFound) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn subscribe(
        &self,
        scope: ChangeScope,
        callback: Box<dyn Fn(Locator) + Send + Sync>,
    ) -> WatchToken {
        let token = WatchToken(self.inner.next_token.fetch_add(1, Ordering::Relaxed));
        let mut watchers = match self.inner.watchers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        watchers.push(Watcher {
            token,
            scope,
            callback,
        });
        token
    }

    fn unsubscribe(&self, token: WatchToken) {
        let mut watchers = match self.inner.watchers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let before = watchers.len();
        watchers.retain(|w| w.token != token);
        if watchers.len() == before {
            warn!("Unsubscribe for unknown watch token");
        }
    }
}

fn decode_counter(bytes: &[u8]) -> Result<u64, StoreError> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| StoreError::Database("Locator counter is corrupted".to_string()))?;
    Ok(u64::from_be_bytes(raw))
}
