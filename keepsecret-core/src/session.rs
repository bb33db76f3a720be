//! Connection session
//!
//! The [`ConnectionSession`] owns the single connection handle to the secret
//! store. It connects, follows the service owner across restarts, and keeps a
//! cached copy of the collection behind the `default` alias. Controllers
//! borrow the session read-only to reach the store.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::config::ServiceSettings;
use crate::models::ObjectPath;
use crate::store::{ConnectionHandle, SecretStore, StoreEvent, DEFAULT_ALIAS, SECRET_SERVICE_BUS_NAME};
use crate::tracker::{ErrorKind, OperationTracker, Operations, Status};

const EVENT_CAPACITY: usize = 16;

/// Message recorded when the service owner disappears
pub const SERVICE_UNAVAILABLE_MESSAGE: &str = "Secret Service provider unavailable.";

/// Change notification emitted by a [`ConnectionSession`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The cached default collection changed
    DefaultCollectionChanged(ObjectPath),
}

/// Owner of the secret store connection
pub struct ConnectionSession {
    store: Arc<dyn SecretStore>,
    tracker: Arc<OperationTracker>,
    handle: Option<ConnectionHandle>,
    bus_name: String,
    default_alias: String,
    default_collection: ObjectPath,
    events: broadcast::Sender<SessionEvent>,
}

impl ConnectionSession {
    /// Creates a disconnected session on the well-known bus name, resolving
    /// the `default` alias
    #[must_use]
    pub fn new(store: Arc<dyn SecretStore>, tracker: Arc<OperationTracker>) -> Self {
        Self::with_names(store, tracker, SECRET_SERVICE_BUS_NAME, DEFAULT_ALIAS)
    }

    /// Creates a disconnected session configured from settings
    #[must_use]
    pub fn with_settings(
        store: Arc<dyn SecretStore>,
        tracker: Arc<OperationTracker>,
        settings: &ServiceSettings,
    ) -> Self {
        Self::with_names(store, tracker, &settings.bus_name, &settings.default_alias)
    }

    fn with_names(
        store: Arc<dyn SecretStore>,
        tracker: Arc<OperationTracker>,
        bus_name: &str,
        alias: &str,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            store,
            tracker,
            handle: None,
            bus_name: bus_name.to_string(),
            default_alias: alias.to_string(),
            default_collection: ObjectPath::empty(),
            events,
        }
    }

    /// Subscribes to session notifications
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// The store this session talks to
    #[must_use]
    pub fn store(&self) -> &dyn SecretStore {
        self.store.as_ref()
    }

    /// The shared operation tracker
    #[must_use]
    pub fn tracker(&self) -> &Arc<OperationTracker> {
        &self.tracker
    }

    /// The open connection, if any
    #[must_use]
    pub fn handle(&self) -> Option<&ConnectionHandle> {
        self.handle.as_ref()
    }

    /// Bus name whose owner changes are followed
    #[must_use]
    pub fn bus_name(&self) -> &str {
        &self.bus_name
    }

    /// Returns true while a connection handle is held
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.handle.is_some()
    }

    /// Last known path of the default collection, empty if unknown
    #[must_use]
    pub fn default_collection(&self) -> &ObjectPath {
        &self.default_collection
    }

    /// Opens the connection
    ///
    /// Does nothing while connected. Failures are recorded in the tracker as
    /// `ServiceConnectionError`.
    pub async fn connect(&mut self) {
        if self.handle.is_some() || !self.tracker.try_set_operation(Operations::SERVICE_CONNECTING)
        {
            return;
        }

        let result = self.store.connect().await;

        match result {
            Ok(handle) => {
                info!(backend = self.store.backend_id(), session = %handle.session(), "Connected to Secret Service");
                self.handle = Some(handle);
                self.tracker.set_state(Status::SERVICE_CONNECTED);
                self.tracker.clear_error();
                self.tracker.clear_operation(Operations::SERVICE_CONNECTING);
                self.read_default_collection().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to connect to Secret Service");
                self.tracker.set_status(Status::empty());
                self.tracker
                    .set_error(ErrorKind::ServiceConnectionError, e.to_string());
                self.tracker.clear_operation(Operations::SERVICE_CONNECTING);
            }
        }
    }

    /// Handles a service owner change
    ///
    /// Any owner change invalidates the handle, so the status is reset and a
    /// new connection is attempted whether or not an owner is present.
    pub async fn handle_owner_changed(&mut self, new_owner: Option<&str>) {
        info!(owner = new_owner.unwrap_or(""), "Secret Service owner changed");
        self.tracker.set_status(Status::empty());
        self.handle = None;
        if new_owner.is_none_or(str::is_empty) {
            self.tracker
                .set_error(ErrorKind::ServiceConnectionError, SERVICE_UNAVAILABLE_MESSAGE);
        }
        self.connect().await;
    }

    /// Routes a store notification
    pub async fn handle_store_event(&mut self, event: &StoreEvent) {
        match event {
            StoreEvent::ServiceOwnerChanged { name, new_owner } => {
                if name == &self.bus_name {
                    self.handle_owner_changed(new_owner.as_deref()).await;
                } else {
                    debug!(name = %name, "Ignoring owner change of another bus name");
                }
            }
            StoreEvent::ServicePropertiesChanged => self.read_default_collection().await,
            _ => {}
        }
    }

    /// Re-reads the default collection alias
    ///
    /// On failure the previous value is kept.
    pub async fn read_default_collection(&mut self) {
        let Some(handle) = self.handle.clone() else {
            return;
        };

        self.tracker
            .set_operation(Operations::SERVICE_READING_DEFAULT_COLLECTION);
        let result = self.store.read_alias(&handle, &self.default_alias).await;
        self.tracker
            .clear_operation(Operations::SERVICE_READING_DEFAULT_COLLECTION);

        match result {
            Ok(path) => {
                let path = path.unwrap_or_default();
                if path != self.default_collection {
                    debug!(alias = %self.default_alias, path = %path, "Default collection changed");
                    self.default_collection = path.clone();
                    let _ = self.events.send(SessionEvent::DefaultCollectionChanged(path));
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to read default collection");
                self.tracker
                    .set_error(ErrorKind::ServiceReadDefaultCollectionError, e.to_string());
            }
        }
    }

    /// Points the default alias at `collection`, then re-reads it
    pub async fn set_default_collection(&mut self, collection: &ObjectPath) {
        let Some(handle) = self.handle.clone() else {
            return;
        };

        self.tracker
            .set_operation(Operations::SERVICE_WRITING_DEFAULT_COLLECTION);
        let result = self
            .store
            .set_alias(&handle, &self.default_alias, collection)
            .await;
        self.tracker
            .clear_operation(Operations::SERVICE_WRITING_DEFAULT_COLLECTION);

        if let Err(e) = result {
            warn!(error = %e, path = %collection, "Failed to set default collection");
            self.tracker
                .set_error(ErrorKind::ServiceSetDefaultCollectionError, e.to_string());
        }

        self.read_default_collection().await;
    }
}
