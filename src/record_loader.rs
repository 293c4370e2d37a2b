//! Asynchronous, restartable record loading.
//!
//! [`AsyncRecordLoader`] wraps one logical query in a cancellable worker so
//! the session owner never blocks on the store. Each loader owns a dedicated
//! worker thread fed by a control channel; query results come back through a
//! delivery channel that the foreground drains with [`AsyncRecordLoader::poll`].
//! A store subscription posts a re-run request whenever the watched row
//! changes, which keeps an open editor consistent if the record is modified
//! elsewhere.
//!
//! Guarantees per loader instance:
//!
//! - at most one query in flight; change notifications arriving mid-run are
//!   coalesced into a single re-run that fires after the current run,
//! - deliveries arrive strictly in execution order,
//! - once [`AsyncRecordLoader::stop`] returns, nothing is ever delivered
//!   again; a result that was in flight is discarded, not surfaced.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use log::{info, warn};

use crate::pet_model::{Locator, Pet};
use crate::pet_store::{ChangeScope, RecordStore, WatchToken};

/// Lifecycle of one loader instance.
///
/// `Idle → Starting → Running → Delivered → (… → Running) → Stopped`.
/// A stopped loader is terminal; sessions construct a fresh loader instead
/// of restarting an old one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderState {
    Idle,
    Starting,
    Running,
    Delivered,
    Stopped,
}

enum WorkerMsg {
    Run,
    Stop,
}

/// Executes one logical query off the caller's thread and re-executes it
/// whenever the store reports a matching change.
///
/// The foreground owns the loader and periodically calls [`poll`] to take
/// delivered results; that is the marshaling point back onto the session
/// owner's execution context.
///
/// [`poll`]: AsyncRecordLoader::poll
pub struct AsyncRecordLoader {
    store: Arc<dyn RecordStore>,
    state: Arc<Mutex<LoaderState>>,
    stopped: Arc<AtomicBool>,
    control_tx: Option<Sender<WorkerMsg>>,
    delivery_rx: Option<Receiver<Option<Pet>>>,
    watch_token: Option<WatchToken>,
    worker: Option<JoinHandle<()>>,
}

impl AsyncRecordLoader {
    pub fn new(store: Arc<dyn RecordStore>) -> AsyncRecordLoader {
        AsyncRecordLoader {
            store,
            state: Arc::new(Mutex::new(LoaderState::Idle)),
            stopped: Arc::new(AtomicBool::new(false)),
            control_tx: None,
            delivery_rx: None,
            watch_token: None,
            worker: None,
        }
    }

    /// Current lifecycle state, updated by both the foreground and the
    /// worker.
    pub fn state(&self) -> LoaderState {
        match self.state.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Registers for change notifications on `locator`'s row and schedules
    /// the first query.
    ///
    /// With no locator there is nothing to load and the call is a no-op: a
    /// create-mode session never runs a loader. Calling `start` on a loader
    /// that already left `Idle` is invalid and is ignored with a warning;
    /// one loader instance serves one session.
    pub fn start(&mut self, locator: Option<Locator>) {
        let Some(locator) = locator else {
            return;
        };
        if self.state() != LoaderState::Idle {
            warn!("start called on a loader in state {:?}", self.state());
            return;
        }
        set_state(&self.state, &self.stopped, LoaderState::Starting);

        let (control_tx, control_rx) = mpsc::channel();
        let (delivery_tx, delivery_rx) = mpsc::channel();

        let store = Arc::clone(&self.store);
        let state = Arc::clone(&self.state);
        let stopped = Arc::clone(&self.stopped);
        self.worker = Some(thread::spawn(move || {
            run_worker(store, locator, control_rx, delivery_tx, state, stopped)
        }));

        // Subscribe before the first run so no store change can slip
        // between the initial query and the notification registration.
        let notify_tx = control_tx.clone();
        let token = self.store.subscribe(
            ChangeScope::Record(locator),
            Box::new(move |_| {
                let _ = notify_tx.send(WorkerMsg::Run);
            }),
        );
        self.watch_token = Some(token);

        if control_tx.send(WorkerMsg::Run).is_err() {
            warn!("Loader worker exited before the first run was scheduled");
        }
        self.control_tx = Some(control_tx);
        self.delivery_rx = Some(delivery_rx);
        info!("Record loader started for row {locator}");
    }

    /// Drains delivered results in execution order.
    ///
    /// Must be called from the session owner's thread; the results are
    /// applied there, which keeps form state single-writer. Returns nothing
    /// once the loader is stopped: a result that raced teardown is dropped
    /// here silently, because delivering to a torn-down observer is the bug
    /// this loader exists to prevent.
    pub fn poll(&mut self) -> Vec<Option<Pet>> {
        if self.stopped.load(Ordering::Acquire) {
            return Vec::new();
        }
        let Some(rx) = &self.delivery_rx else {
            return Vec::new();
        };
        let mut deliveries = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(row) => deliveries.push(row),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        deliveries
    }

    /// Cancels any in-flight query and deregisters the change subscription.
    /// Idempotent. The observer counts as detached the instant this
    /// returns.
    pub fn stop(&mut self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(token) = self.watch_token.take() {
            self.store.unsubscribe(token);
        }
        if let Some(tx) = &self.control_tx {
            let _ = tx.send(WorkerMsg::Stop);
        }
        if let Ok(mut guard) = self.state.lock() {
            *guard = LoaderState::Stopped;
        }
        info!("Record loader stopped");
    }

    /// Terminal teardown: `stop` plus releasing the worker and channels.
    /// No further `start` is valid afterwards.
    pub fn reset(&mut self) {
        self.stop();
        // Dropping the control sender unblocks the worker even if the Stop
        // message was never consumed.
        self.control_tx = None;
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
        self.delivery_rx = None;
    }
}

impl Drop for AsyncRecordLoader {
    fn drop(&mut self) {
        self.reset();
    }
}

fn set_state(state: &Mutex<LoaderState>, stopped: &AtomicBool, next: LoaderState) {
    // After stop() the state is Stopped and stays Stopped.
    if stopped.load(Ordering::Acquire) {
        return;
    }
    if let Ok(mut guard) = state.lock() {
        *guard = next;
    }
}

fn run_worker(
    store: Arc<dyn RecordStore>,
    locator: Locator,
    control_rx: Receiver<WorkerMsg>,
    delivery_tx: Sender<Option<Pet>>,
    state: Arc<Mutex<LoaderState>>,
    stopped: Arc<AtomicBool>,
) {
    while let Ok(msg) = control_rx.recv() {
        if matches!(msg, WorkerMsg::Stop) {
            break;
        }
        // Collapse queued wake-ups: notifications that piled up while the
        // previous query ran trigger exactly one re-run.
        loop {
            match control_rx.try_recv() {
                Ok(WorkerMsg::Run) => continue,
                Ok(WorkerMsg::Stop) | Err(TryRecvError::Disconnected) => return,
                Err(TryRecvError::Empty) => break,
            }
        }
        if stopped.load(Ordering::Acquire) {
            break;
        }

        set_state(&state, &stopped, LoaderState::Running);
        let row = match store.query(locator) {
            Ok(row) => row,
            Err(e) => {
                // A failed query delivers an empty result, not a fault.
                warn!("Query for row {locator} failed: {e}");
                None
            }
        };

        if stopped.load(Ordering::Acquire) {
            // Stopped while the query was in flight; the result is stale
            // by definition and nobody is listening. Expected, not an
            // error.
            break;
        }
        if delivery_tx.send(row).is_err() {
            break;
        }
        set_state(&state, &stopped, LoaderState::Delivered);
    }
}
