//! Operation and state tracking
//!
//! The [`OperationTracker`] is the single source of truth for "what is
//! happening" and "what went wrong". Every component that talks to the secret
//! store registers its in-flight requests here, records the outcome here, and
//! reads the status from here.
//!
//! A tracker is created once by the application and shared through an
//! [`Arc`](std::sync::Arc). Observers subscribe to [`TrackerEvent`]s; an event
//! is only emitted when the observable value actually changes.

mod flags;

pub use flags::{Operations, Status};

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;
use tracing::debug;

/// Capacity of the tracker event channel
const EVENT_CAPACITY: usize = 256;

/// Category of the most recent failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ErrorKind {
    /// No error is recorded
    #[default]
    NoError,
    /// Connecting to the Secret Service failed or the provider went away
    ServiceConnectionError,
    /// Reloading the collection list failed
    ServiceLoadCollectionsError,
    /// Reading the `default` alias failed
    ServiceReadDefaultCollectionError,
    /// Writing the `default` alias failed
    ServiceSetDefaultCollectionError,
    /// Creating an item failed
    ItemCreationError,
    /// Loading an item's metadata failed
    ItemLoadError,
    /// Loading an item's secret value failed
    ItemLoadSecretError,
    /// Unlocking an item failed
    ItemUnlockError,
    /// Saving one or more parts of an item failed
    ItemSaveError,
    /// Deleting an item failed
    ItemDeleteError,
    /// Creating a collection failed
    CollectionCreationError,
    /// Loading the items of a collection failed
    CollectionLoadError,
    /// Unlocking a collection failed
    CollectionUnlockError,
    /// Locking a collection failed
    CollectionLockError,
    /// Deleting a collection failed
    CollectionDeleteError,
}

impl ErrorKind {
    /// Returns true for every kind except [`ErrorKind::NoError`]
    #[must_use]
    pub const fn is_error(self) -> bool {
        !matches!(self, Self::NoError)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Change notification emitted by the tracker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerEvent {
    /// The status set changed
    StatusChanged(Status),
    /// `SERVICE_CONNECTED` was set or cleared
    ServiceConnectedChanged(bool),
    /// The visible operation set changed
    OperationsChanged(Operations),
    /// The error kind changed
    ErrorChanged(ErrorKind),
    /// The error message changed
    ErrorMessageChanged(String),
}

#[derive(Debug, Default)]
struct TrackerState {
    status: Status,
    /// Flags exactly as requested by callers, composites not derived
    requested: Operations,
    /// `requested` with composites derived, as observed from outside
    operations: Operations,
    error: ErrorKind,
    error_message: String,
}

/// Shared tracker of status bits, in-flight operations and the current error
#[derive(Debug)]
pub struct OperationTracker {
    state: Mutex<TrackerState>,
    events: broadcast::Sender<TrackerEvent>,
}

impl OperationTracker {
    /// Creates a tracker in the disconnected, idle, error-free state
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Mutex::new(TrackerState::default()),
            events,
        }
    }

    /// Subscribes to change notifications
    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.events.subscribe()
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, events: Vec<TrackerEvent>) {
        for event in events {
            // No receivers is not an error for a tracker
            let _ = self.events.send(event);
        }
    }

    // ========== Status ==========

    /// Current status set
    pub fn status(&self) -> Status {
        self.lock().status
    }

    /// Returns true if the service is connected
    pub fn is_service_connected(&self) -> bool {
        self.status().contains(Status::SERVICE_CONNECTED)
    }

    /// Replaces the whole status set
    ///
    /// Used to reset every axis at once, for example when the service goes
    /// away.
    pub fn set_status(&self, status: Status) {
        let events = {
            let mut state = self.lock();
            Self::apply_status(&mut state, status)
        };
        self.emit(events);
    }

    /// Sets the given status flags
    pub fn set_state(&self, flags: Status) {
        let events = {
            let mut state = self.lock();
            let status = state.status | flags;
            Self::apply_status(&mut state, status)
        };
        self.emit(events);
    }

    /// Clears the given status flags
    pub fn clear_state(&self, flags: Status) {
        let events = {
            let mut state = self.lock();
            let status = state.status.difference(flags);
            Self::apply_status(&mut state, status)
        };
        self.emit(events);
    }

    fn apply_status(state: &mut TrackerState, status: Status) -> Vec<TrackerEvent> {
        let status = status.normalized();
        if status == state.status {
            return Vec::new();
        }

        debug!(from = %state.status, to = %status, "Tracker status changed");

        let was_connected = state.status.contains(Status::SERVICE_CONNECTED);
        let connected = status.contains(Status::SERVICE_CONNECTED);
        state.status = status;

        let mut events = vec![TrackerEvent::StatusChanged(status)];
        if was_connected != connected {
            events.push(TrackerEvent::ServiceConnectedChanged(connected));
        }
        events
    }

    // ========== Operations ==========

    /// Currently visible operation set, composites included
    pub fn operations(&self) -> Operations {
        self.lock().operations
    }

    /// Returns true if every flag of `operation` is in flight
    pub fn is_busy(&self, operation: Operations) -> bool {
        self.operations().contains(operation)
    }

    /// Marks an operation as in flight
    pub fn set_operation(&self, operation: Operations) {
        let events = {
            let mut state = self.lock();
            let requested = state.requested | operation;
            Self::apply_operations(&mut state, requested)
        };
        self.emit(events);
    }

    /// Marks an operation as in flight unless it overlaps one already running
    ///
    /// The request overlaps when any of its flags, or a composite one of them
    /// belongs to, is already visible. Returns false and changes nothing in
    /// that case.
    pub fn try_set_operation(&self, operation: Operations) -> bool {
        let events = {
            let mut state = self.lock();
            if state.operations.intersects(operation.with_composites()) {
                return false;
            }
            let requested = state.requested | operation;
            Self::apply_operations(&mut state, requested)
        };
        self.emit(events);
        true
    }

    /// Marks an operation as finished
    ///
    /// Composite flags stay asserted while any of their parts is still in
    /// flight. When the last save part finishes, `ITEM_NEEDS_SAVE` is cleared
    /// from the status.
    pub fn clear_operation(&self, operation: Operations) {
        let events = {
            let mut state = self.lock();
            let requested = state.requested.difference(operation);
            Self::apply_operations(&mut state, requested)
        };
        self.emit(events);
    }

    fn apply_operations(state: &mut TrackerState, requested: Operations) -> Vec<TrackerEvent> {
        state.requested = requested;
        let operations = requested.with_composites();
        if operations == state.operations {
            return Vec::new();
        }

        debug!(from = %state.operations, to = %operations, "Tracker operations changed");

        let save_finished = state.operations.contains(Operations::ITEM_SAVING)
            && !operations.contains(Operations::ITEM_SAVING);
        state.operations = operations;

        let mut events = vec![TrackerEvent::OperationsChanged(operations)];
        if save_finished {
            let status = state.status.difference(Status::ITEM_NEEDS_SAVE);
            events.extend(Self::apply_status(state, status));
        }
        events
    }

    // ========== Error ==========

    /// Kind of the current error
    pub fn error(&self) -> ErrorKind {
        self.lock().error
    }

    /// Message of the current error, empty when there is none
    pub fn error_message(&self) -> String {
        self.lock().error_message.clone()
    }

    /// Records an error, replacing the previous one
    pub fn set_error(&self, error: ErrorKind, message: impl Into<String>) {
        let message = message.into();
        let events = {
            let mut state = self.lock();
            let mut events = Vec::new();
            if error != state.error {
                state.error = error;
                events.push(TrackerEvent::ErrorChanged(error));
            }
            if message != state.error_message {
                state.error_message.clone_from(&message);
                events.push(TrackerEvent::ErrorMessageChanged(message));
            }
            events
        };
        if error.is_error() && !events.is_empty() {
            debug!(kind = %error, "Tracker error recorded");
        }
        self.emit(events);
    }

    /// Clears the current error
    pub fn clear_error(&self) {
        self.set_error(ErrorKind::NoError, String::new());
    }
}

impl Default for OperationTracker {
    fn default() -> Self {
        Self::new()
    }
}
