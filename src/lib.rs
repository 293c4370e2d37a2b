//! # Pet Editor Core
//!
//! The record-editing core of the pet catalog mobile app, designed for FFI
//! (Foreign Function Interface) integration with Flutter and other
//! cross-platform shells. Built on LMDB (Lightning Memory-Mapped Database)
//! for stability and hot restart support.
//!
//! ## Features
//!
//! - **LMDB-based storage**: Battle-tested database engine used by OpenLDAP and Bitcoin Core
//! - **Asynchronous record loading**: a cancellable, restartable loader keeps the
//!   editor form off the UI thread's critical path and re-queries automatically
//!   when the underlying row changes
//! - **Lifecycle-bound sessions**: one controller per edit session, with
//!   well-defined open, pump, save, and close points
//! - **FFI-optimized**: Designed specifically for Flutter integration with hot restart support
//! - **Safe error handling**: No `unwrap()` calls in production code
//!
//! ## Quick Start
//!
//! ```no_run
//! use pet_editor_core::{create_store, open_editor, editor_save, editor_close};
//! use std::ffi::CString;
//!
//! // Open the catalog store
//! let store_name = CString::new("pet_catalog").unwrap();
//! let store = create_store(store_name.as_ptr());
//!
//! // A new-pet form: locator 0 means "no existing record"
//! let editor = open_editor(store, 0);
//!
//! // Persist what the user typed
//! let fields = CString::new(r#"{"name":"Bella","breed":"","gender":0,"weight":""}"#).unwrap();
//! let result = editor_save(editor, fields.as_ptr());
//! let _ = editor_close(editor);
//! ```
//!
//! ## FFI Functions
//!
//! This library exposes C-compatible functions for cross-language integration:
//!
//! - [`create_store`] - Open (or create) the catalog store
//! - [`get_all_pets`] - Retrieve every pet for the list screen
//! - [`open_editor`] - Start an edit session for one pet, or a blank new-pet form
//! - [`editor_pump`] - Drain pending load results and read the session snapshot
//! - [`editor_save`] - Persist the form's field values
//! - [`editor_close`] - End the edit session
//! - [`close_store`] - Explicit store shutdown
//!
//! All editor functions must be called from the thread that owns the session
//! (the UI thread); the loader's own work happens on a background worker and
//! is marshaled back through [`editor_pump`].

pub mod editor_session;
pub mod pet_model;
pub mod pet_store;
pub mod record_loader;
mod app_response;

use crate::app_response::AppResponse;
use crate::editor_session::{EditorController, SaveStatus};
use crate::pet_model::{FieldSet, Locator};
use crate::pet_store::PetStore;

use log::{info, warn};
use serde::Serialize;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::sync::Arc;

/// Opens (or creates) the pet catalog store with the specified name.
///
/// This function initializes an LMDB environment under `<name>.lmdb` with
/// the pets collection and its locator counter.
///
/// # Parameters
///
/// * `name` - A null-terminated C string containing the store name
///
/// # Returns
///
/// Returns a pointer to the [`PetStore`] instance on success, or a null
/// pointer on failure. The caller is responsible for managing the returned
/// pointer's lifetime.
///
/// # Safety
///
/// This function is unsafe because it:
/// - Dereferences a raw pointer without validation
/// - Returns a raw pointer that must be properly managed
/// - Requires the input string to be valid UTF-8
///
/// # Errors
///
/// Returns null pointer if:
/// - Input name pointer is null
/// - Input string contains invalid UTF-8
/// - Store initialization fails (typically an unwritable location)
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn create_store(name: *const c_char) -> *mut PetStore {
    if name.is_null() {
        warn!("Null name pointer passed to create_store");
        return std::ptr::null_mut();
    }

    let name_str = match unsafe { CStr::from_ptr(name).to_str() } {
        Ok(s) => s,
        Err(e) => {
            warn!("Invalid UTF-8 in name parameter: {e}");
            return std::ptr::null_mut();
        }
    };

    match PetStore::open(name_str) {
        Ok(store) => {
            info!("Pet store initialized successfully");
            Box::into_raw(Box::new(store))
        }
        Err(e) => {
            warn!("Failed to initialize pet store: {e}");
            warn!("Attempted path: {name_str}.lmdb");
            std::ptr::null_mut()
        }
    }
}

/// Retrieves every pet in the catalog, in locator order.
///
/// This is the list screen's data source. Each element carries the locator
/// the caller passes back to [`open_editor`] to edit that pet.
///
/// # Parameters
///
/// * `store` - Pointer to the store instance
///
/// # Returns
///
/// Returns a JSON-formatted C string containing an array of pets, or an
/// error response on failure. The returned string must be freed by the
/// caller.
///
/// # Safety
///
/// The store parameter must be a valid pointer to a [`PetStore`] instance.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn get_all_pets(store: *mut PetStore) -> *const c_char {
    if store.is_null() {
        let error = AppResponse::BadRequest("Null store pointer passed to get_all_pets".to_string());
        return response_to_c_string(&error);
    }

    let store = unsafe { &*store };

    match store.query_all() {
        Ok(pets) => match serde_json::to_string(&pets) {
            Ok(json) => {
                let success = AppResponse::Ok(json);
                response_to_c_string(&success)
            }
            Err(e) => {
                let error = AppResponse::SerializationError(format!("Error serializing pets: {e:?}"));
                response_to_c_string(&error)
            }
        },
        Err(e) => {
            let error = AppResponse::from(e);
            response_to_c_string(&error)
        }
    }
}

/// Opens an edit session for one pet, or a blank new-pet form.
///
/// With `locator_id` 0 the session starts in create mode: the form is blank
/// and nothing is loaded. With a real locator the session starts in edit
/// mode and a background loader begins fetching the row; its result arrives
/// through [`editor_pump`].
///
/// # Parameters
///
/// * `store` - Pointer to the store instance
/// * `locator_id` - Raw locator of the pet to edit, or 0 for a new pet
///
/// # Returns
///
/// Returns a pointer to the [`EditorController`] for this session, or a
/// null pointer if the store pointer is null. The caller must end the
/// session with [`editor_close`].
///
/// # Safety
///
/// The store parameter must be a valid pointer. The returned session must
/// only be used from the thread that drives the UI.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn open_editor(store: *mut PetStore, locator_id: u64) -> *mut EditorController {
    if store.is_null() {
        warn!("Null store pointer passed to open_editor");
        return std::ptr::null_mut();
    }

    let store = unsafe { &*store };
    let controller = EditorController::open(Arc::new(store.clone()), Locator::from_raw(locator_id));
    Box::into_raw(Box::new(controller))
}

#[derive(Serialize)]
struct SessionSnapshot {
    mode: &'static str,
    locator: u64,
    record_missing: bool,
    fields: FieldSet,
}

/// Drains pending load results and returns the session snapshot.
///
/// The UI calls this from its own thread, typically once per frame or on a
/// notification tick. Any rows the loader finished since the last call are
/// applied to the session's field set here, which is what keeps form state
/// single-writer.
///
/// # Parameters
///
/// * `editor` - Pointer to the edit session
///
/// # Returns
///
/// Returns a JSON-formatted C string of the shape
/// `{"mode":"edit","locator":3,"record_missing":false,"fields":{...}}`.
/// `record_missing` turns true when an edit-mode load found no row.
///
/// # Safety
///
/// The editor parameter must be a valid pointer, called from the owning
/// thread.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn editor_pump(editor: *mut EditorController) -> *const c_char {
    if editor.is_null() {
        let error = AppResponse::BadRequest("Null editor pointer passed to editor_pump".to_string());
        return response_to_c_string(&error);
    }

    let editor = unsafe { &mut *editor };
    editor.pump();

    let (mode, locator) = match editor.mode() {
        editor_session::EditorMode::Create => ("create", 0),
        editor_session::EditorMode::Edit(locator) => ("edit", locator.raw()),
    };
    let snapshot = SessionSnapshot {
        mode,
        locator,
        record_missing: editor.record_missing(),
        fields: editor.field_set().clone(),
    };

    match serde_json::to_string(&snapshot) {
        Ok(json) => {
            let success = AppResponse::Ok(json);
            response_to_c_string(&success)
        }
        Err(e) => {
            let error = AppResponse::from(e);
            response_to_c_string(&error)
        }
    }
}

/// Persists the form's current field values.
///
/// The payload is the transient field snapshot read back from the widgets at
/// save time. Weight travels as text; empty text means 0, any other
/// non-numeric text rejects the attempt with a `ValidationError` and no
/// store call.
///
/// # Parameters
///
/// * `editor` - Pointer to the edit session
/// * `json_ptr` - Null-terminated C string with the field values
///
/// # Returns
///
/// Returns a JSON-formatted C string: `Ok` with the saved row's locator,
/// `Ok` with a notice when an untouched new-pet form had nothing to save,
/// `ValidationError` for bad weight text, `NotFound` when an edit-mode
/// update matched no row, or `DatabaseError` when the store rejected the
/// write.
///
/// # Safety
///
/// Both parameters must be valid pointers.
///
/// # JSON Format
///
/// Expected JSON structure (all fields optional, defaults apply):
/// ```json
/// {
///   "name": "Bella",
///   "breed": "Collie",
///   "gender": 2,
///   "weight": "15"
/// }
/// ```
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn editor_save(editor: *mut EditorController, json_ptr: *const c_char) -> *const c_char {
    if editor.is_null() {
        let error = AppResponse::BadRequest("Null editor pointer passed to editor_save".to_string());
        return response_to_c_string(&error);
    }

    let json_str = match c_ptr_to_string(json_ptr, "JSON") {
        Ok(json) => json,
        Err(error_ptr) => return error_ptr,
    };

    let fields: FieldSet = match serde_json::from_str(&json_str) {
        Ok(f) => f,
        Err(e) => {
            let error = AppResponse::SerializationError(format!("Invalid JSON: {e}"));
            return response_to_c_string(&error);
        }
    };

    let editor = unsafe { &mut *editor };

    match editor.save(&fields) {
        Ok(SaveStatus::Saved(locator)) => {
            let success = AppResponse::Ok(locator.raw().to_string());
            response_to_c_string(&success)
        }
        Ok(SaveStatus::Unchanged) => {
            let success = AppResponse::success("Nothing to save");
            response_to_c_string(&success)
        }
        Err(e) => {
            let error = AppResponse::from(e);
            response_to_c_string(&error)
        }
    }
}

/// Ends an edit session.
///
/// Stops the session's loader, if one was started, and deregisters its
/// change subscription. Must be called exactly once when the editor screen
/// goes away, regardless of whether the save succeeded.
///
/// # Parameters
///
/// * `editor` - Pointer to the edit session
///
/// # Returns
///
/// Returns a JSON-formatted C string indicating success or failure.
///
/// # Safety
///
/// The editor parameter must be a valid pointer. After this call the
/// session performs no further loading; the pointer itself is reclaimed by
/// the caller.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn editor_close(editor: *mut EditorController) -> *const c_char {
    if editor.is_null() {
        let error = AppResponse::BadRequest("Null editor pointer passed to editor_close".to_string());
        return response_to_c_string(&error);
    }

    let editor = unsafe { &mut *editor };
    editor.close();

    let success = AppResponse::success("Editor session closed");
    response_to_c_string(&success)
}

/// Explicitly closes the store.
///
/// This function provides explicit connection management, which is
/// particularly useful for Flutter hot restart scenarios where resources
/// need to be cleaned up before reconnecting.
///
/// # Parameters
///
/// * `store` - Pointer to the store instance
///
/// # Returns
///
/// Returns a JSON-formatted C string indicating success or failure.
///
/// # Safety
///
/// The store parameter must be a valid pointer.
///
/// # Notes
///
/// In LMDB, the environment is closed when the last handle is dropped. This
/// function drops the store's change subscriptions and serves as an
/// explicit indicator that the handle should no longer be used.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn close_store(store: *mut PetStore) -> *const c_char {
    if store.is_null() {
        let error = AppResponse::BadRequest("Null store pointer passed to close_store".to_string());
        return response_to_c_string(&error);
    }

    let store = unsafe { &*store };
    store.close();

    let success = AppResponse::success("Store connection closed successfully");
    response_to_c_string(&success)
}

/// Converts an [`AppResponse`] to a C-compatible string.
///
/// This internal helper function serializes the response to JSON format
/// and converts it to a C string that can be returned to FFI callers.
///
/// # Parameters
///
/// * `response` - Reference to the response to convert
///
/// # Returns
///
/// Returns a pointer to a null-terminated C string containing the JSON
/// response. The caller is responsible for freeing this memory.
///
/// # Safety
///
/// Returns a null pointer if serialization or C string creation fails.
fn response_to_c_string(response: &AppResponse) -> *const c_char {
    let json = match serde_json::to_string(response) {
        Ok(j) => j,
        Err(e) => {
            warn!("Error serializing response: {e}");
            return std::ptr::null();
        }
    };

    match CString::new(json) {
        Ok(c_str) => c_str.into_raw(),
        Err(e) => {
            warn!("Error creating CString: {e}");
            std::ptr::null()
        }
    }
}

/// Converts a C string pointer to a Rust String with comprehensive error
/// handling.
///
/// This internal helper function safely converts C string pointers to Rust
/// strings, handling all possible error conditions including null pointers
/// and invalid UTF-8.
///
/// # Parameters
///
/// * `ptr` - Pointer to the C string
/// * `field_name` - Name of the field for descriptive error messages
///
/// # Returns
///
/// * `Ok(String)` - If conversion was successful
/// * `Err(*const c_char)` - Pointer to error message in C format if conversion failed
///
/// # Safety
///
/// This function safely handles null pointers and invalid UTF-8 sequences.
fn c_ptr_to_string(ptr: *const c_char, field_name: &str) -> Result<String, *const c_char> {
    if ptr.is_null() {
        let error = AppResponse::BadRequest(format!("Null {field_name} pointer"));
        return Err(response_to_c_string(&error));
    }

    match unsafe { CStr::from_ptr(ptr).to_str() } {
        Ok(s) => Ok(s.to_string()),
        Err(e) => {
            let error = AppResponse::BadRequest(format!("Invalid UTF-8 in {field_name}: {e}"));
            Err(response_to_c_string(&error))
        }
    }
}
