//! One edit session end-to-end.
//!
//! [`EditorController`] owns the lifecycle of a single create-or-edit
//! session: it decides the mode from the caller's locator, drives an
//! [`AsyncRecordLoader`] in edit mode, applies loaded values into the
//! session [`FieldSet`], and issues the single insert or update against the
//! store on save.

use std::fmt::{Display, Formatter};
use std::sync::Arc;

use log::info;

use crate::pet_model::{parse_weight, FieldSet, Locator, Pet, PetRecord};
use crate::pet_store::{RecordStore, StoreError};
use crate::record_loader::{AsyncRecordLoader, LoaderState};

/// Whether this session creates a new row or edits an existing one.
/// Decided once at open time and fixed for the session's duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorMode {
    Create,
    Edit(Locator),
}

/// Why a save attempt failed. Every variant is non-fatal to the session;
/// the caller may retry, correct the input, or close.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveError {
    /// The store rejected the write or could not be reached.
    StoreUnreachable(String),
    /// An edit-mode update matched no row, typically because the record was
    /// deleted by another session.
    NoRowsAffected,
    /// Weight text that is non-empty but not a valid non-negative integer.
    /// Only empty text defaults to zero; anything else fails the attempt
    /// rather than being silently coerced.
    InvalidNumericInput(String),
}

impl Display for SaveError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SaveError::StoreUnreachable(msg) => write!(f, "Store unreachable: {}", msg),
            SaveError::NoRowsAffected => write!(f, "No rows affected"),
            SaveError::InvalidNumericInput(text) => {
                write!(f, "'{}' is not a valid weight", text)
            }
        }
    }
}

impl From<StoreError> for SaveError {
    fn from(err: StoreError) -> Self {
        SaveError::StoreUnreachable(err.to_string())
    }
}

/// Result of a successful save call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveStatus {
    /// The row was written; in create mode the locator is the one the store
    /// just assigned.
    Saved(Locator),
    /// Nothing was written: an untouched create-mode form is a successful
    /// no-op, not an empty row.
    Unchanged,
}

/// Presentation-layer hook for load deliveries.
///
/// Invoked on the session owner's thread from [`EditorController::pump`],
/// once per delivery. `None` means the record is gone from the store; the
/// form keeps its current contents and the UI decides how to surface that.
pub trait LoadObserver {
    fn on_loaded(&mut self, row: Option<&Pet>);
}

/// Orchestrates one edit session.
///
/// ```no_run
/// use std::sync::Arc;
/// use pet_editor_core::editor_session::EditorController;
/// use pet_editor_core::pet_store::PetStore;
///
/// let store = PetStore::open("pet_catalog").unwrap();
/// // No locator: a blank new-pet form.
/// let mut session = EditorController::open(Arc::new(store), None);
/// let fields = session.field_set().clone();
/// let outcome = session.save(&fields);
/// session.close();
/// ```
pub struct EditorController {
    store: Arc<dyn RecordStore>,
    mode: EditorMode,
    field_set: FieldSet,
    loader: Option<AsyncRecordLoader>,
    observer: Option<Box<dyn LoadObserver>>,
    record_missing: bool,
    closed: bool,
}

impl EditorController {
    /// Opens a session. An absent locator means create mode: the field set
    /// stays at defaults and no loader ever runs. A present locator means
    /// edit mode: a fresh loader is constructed for this session and
    /// started immediately.
    pub fn open(store: Arc<dyn RecordStore>, locator: Option<Locator>) -> EditorController {
        let (mode, loader) = match locator {
            Some(locator) => {
                let mut loader = AsyncRecordLoader::new(Arc::clone(&store));
                loader.start(Some(locator));
                (EditorMode::Edit(locator), Some(loader))
            }
            None => (EditorMode::Create, None),
        };
        info!("Editor session opened in {mode:?} mode");

        EditorController {
            store,
            mode,
            field_set: FieldSet::default(),
            loader,
            observer: None,
            record_missing: false,
            closed: false,
        }
    }

    pub fn mode(&self) -> EditorMode {
        self.mode
    }

    /// The session's staging area, as last populated by the loader (edit
    /// mode) or left at defaults (create mode).
    pub fn field_set(&self) -> &FieldSet {
        &self.field_set
    }

    /// True once an edit-mode load came back empty: the record no longer
    /// exists in the store. The session stays open; the caller decides
    /// whether to retry or bail.
    pub fn record_missing(&self) -> bool {
        self.record_missing
    }

    /// State of the session's loader, if one was started.
    pub fn loader_state(&self) -> Option<LoaderState> {
        self.loader.as_ref().map(AsyncRecordLoader::state)
    }

    /// Registers a presentation-layer observer for load deliveries.
    pub fn set_observer(&mut self, observer: Box<dyn LoadObserver>) {
        self.observer = Some(observer);
    }

    /// Drains pending loader deliveries and applies each one.
    ///
    /// Call this from the session owner's thread; it is the marshaling
    /// point that keeps the field set single-writer. A no-op in create mode
    /// and after close.
    pub fn pump(&mut self) {
        let deliveries = match &mut self.loader {
            Some(loader) => loader.poll(),
            None => return,
        };
        for row in deliveries {
            self.on_loaded(row);
        }
    }

    fn on_loaded(&mut self, row: Option<Pet>) {
        match &row {
            Some(pet) => {
                self.field_set.apply(pet);
                self.record_missing = false;
            }
            None => {
                // The record vanished underneath the session. Keep whatever
                // the form holds; never fabricate values.
                self.record_missing = true;
                info!("Loaded row is gone from the store; session stays open");
            }
        }
        if let Some(observer) = &mut self.observer {
            observer.on_loaded(row.as_ref());
        }
    }

    /// Persists the given field values: the transient snapshot read back
    /// from the presentation layer at save time.
    ///
    /// An untouched create-mode form performs no store call and reports
    /// [`SaveStatus::Unchanged`]. Otherwise the weight text is parsed
    /// (empty means 0), the field map is built, and exactly one insert or
    /// update is issued. Single attempt; there is no automatic retry.
    ///
    /// # Errors
    ///
    /// [`SaveError::InvalidNumericInput`] rejects the attempt before any
    /// store call. [`SaveError::NoRowsAffected`] means an edit-mode update
    /// matched nothing. [`SaveError::StoreUnreachable`] wraps store-layer
    /// failures; they never propagate as faults.
    pub fn save(&mut self, fields: &FieldSet) -> Result<SaveStatus, SaveError> {
        if self.mode == EditorMode::Create && fields.is_untouched() {
            return Ok(SaveStatus::Unchanged);
        }

        let weight = parse_weight(&fields.weight)
            .ok_or_else(|| SaveError::InvalidNumericInput(fields.weight.trim().to_string()))?;
        let record = PetRecord {
            name: fields.name.trim().to_string(),
            breed: fields.breed.trim().to_string(),
            gender: fields.gender.as_stored(),
            weight,
        };

        match self.mode {
            EditorMode::Create => {
                let locator = self.store.insert(&record)?;
                info!("Saved new pet as row {locator}");
                Ok(SaveStatus::Saved(locator))
            }
            EditorMode::Edit(locator) => {
                let affected = self.store.update(locator, &record)?;
                if affected == 0 {
                    return Err(SaveError::NoRowsAffected);
                }
                info!("Updated pet row {locator}");
                Ok(SaveStatus::Saved(locator))
            }
        }
    }

    /// Ends the session: tears down the loader and its subscription. Safe
    /// to call when the session never started a loader. Called by `Drop` if
    /// the owner forgot.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Some(loader) = &mut self.loader {
            loader.reset();
        }
        info!("Editor session closed");
    }
}

impl Drop for EditorController {
    fn drop(&mut self) {
        self.close();
    }
}
