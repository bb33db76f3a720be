//! Collection controller
//!
//! The [`CollectionController`] keeps the list of user-visible collections,
//! the current collection selection, and the item list of the current
//! collection. It also drives locking, unlocking, creation and deletion of
//! collections.
//!
//! Every store call registers its operation flag in the shared tracker and
//! clears it when the call completes, before any error is recorded. A request
//! whose operation is already in flight is logged and dropped.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::config::ConfigManager;
use crate::list_model::ListModel;
use crate::models::{CollectionEntry, ItemEntry, ObjectPath};
use crate::session::ConnectionSession;
use crate::store::StoreEvent;
use crate::tracker::{ErrorKind, OperationTracker, Operations, Status};

const EVENT_CAPACITY: usize = 16;

const COLLECTION_STATE: Status = Status::COLLECTION_READY.union(Status::COLLECTION_LOCKED);

/// Change notification emitted by a [`CollectionController`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionEvent {
    /// The current collection selection changed
    CurrentCollectionChanged(ObjectPath),
    /// A collection was locked through this controller
    CollectionLocked(ObjectPath),
    /// A collection was unlocked through this controller
    CollectionUnlocked(ObjectPath),
}

/// Collections, current selection, and the items of the current collection
pub struct CollectionController {
    tracker: Arc<OperationTracker>,
    config: Option<ConfigManager>,
    collections: ListModel<CollectionEntry>,
    items: ListModel<ItemEntry>,
    collection_path: ObjectPath,
    /// Collection whose item notifications trigger a refresh
    watched: Option<ObjectPath>,
    events: broadcast::Sender<CollectionEvent>,
}

impl CollectionController {
    /// Creates a controller that does not persist its selection
    #[must_use]
    pub fn new(tracker: Arc<OperationTracker>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            tracker,
            config: None,
            collections: ListModel::new(),
            items: ListModel::new(),
            collection_path: ObjectPath::empty(),
            watched: None,
            events,
        }
    }

    /// Creates a controller that persists its selection through `config`
    #[must_use]
    pub fn with_config(tracker: Arc<OperationTracker>, config: ConfigManager) -> Self {
        Self {
            config: Some(config),
            ..Self::new(tracker)
        }
    }

    /// Subscribes to controller notifications
    pub fn subscribe(&self) -> broadcast::Receiver<CollectionEvent> {
        self.events.subscribe()
    }

    /// User-visible collections
    #[must_use]
    pub fn collections(&self) -> &ListModel<CollectionEntry> {
        &self.collections
    }

    /// Items of the current collection
    #[must_use]
    pub fn items(&self) -> &ListModel<ItemEntry> {
        &self.items
    }

    /// Path of the current collection, empty if none is selected
    #[must_use]
    pub fn collection_path(&self) -> &ObjectPath {
        &self.collection_path
    }

    /// Label of the current collection as last listed
    #[must_use]
    pub fn collection_name(&self) -> Option<&str> {
        self.collections
            .iter()
            .find(|c| c.dbus_path == self.collection_path)
            .map(|c| c.name.as_str())
    }

    /// Index of the current collection in [`collections`](Self::collections)
    #[must_use]
    pub fn current_index(&self) -> Option<usize> {
        if self.collection_path.is_empty() {
            return None;
        }
        self.collections
            .position(|c| c.dbus_path == self.collection_path)
    }

    fn notify(&self, event: CollectionEvent) {
        let _ = self.events.send(event);
    }

    fn unload(&mut self) {
        self.watched = None;
        self.items.clear();
        self.tracker.clear_state(COLLECTION_STATE);
    }

    /// Reloads the list of user-visible collections
    ///
    /// Unlabelled collections are internal to the provider and skipped.
    pub async fn load_collections(&mut self, session: &ConnectionSession) {
        let Some(handle) = session.handle() else {
            self.collections.clear();
            return;
        };
        if !self
            .tracker
            .try_set_operation(Operations::SERVICE_LOADING_COLLECTIONS)
        {
            warn!("Collection list is already loading");
            return;
        }

        let result = session.store().list_collections(handle).await;
        self.tracker
            .clear_operation(Operations::SERVICE_LOADING_COLLECTIONS);

        match result {
            Ok(collections) => {
                let visible: Vec<_> = collections
                    .into_iter()
                    .filter(|c| !c.is_private())
                    .collect();
                debug!(count = visible.len(), "Collections loaded");
                self.collections.reset(visible);
            }
            Err(e) => {
                warn!(error = %e, "Failed to load collections");
                self.tracker
                    .set_error(ErrorKind::ServiceLoadCollectionsError, e.to_string());
            }
        }
    }

    /// Selects the current collection
    ///
    /// The selection is persisted. An empty path unloads the item list; any
    /// other path is refreshed when connected.
    pub async fn set_collection_path(&mut self, session: &ConnectionSession, path: ObjectPath) {
        if path == self.collection_path {
            return;
        }

        debug!(from = %self.collection_path, to = %path, "Current collection changed");
        self.watched = None;
        self.collection_path = path.clone();
        if let Some(config) = &self.config {
            config.store_current_collection_path(&path);
        }
        self.notify(CollectionEvent::CurrentCollectionChanged(path));

        if self.collection_path.is_empty() {
            self.unload();
        } else if session.is_connected() {
            self.refresh(session).await;
        }
    }

    /// Reloads the item list of the current collection
    ///
    /// A locked collection yields an empty list and `COLLECTION_LOCKED`
    /// without listing its items. The lock state is always asked from the
    /// store.
    pub async fn refresh(&mut self, session: &ConnectionSession) {
        let Some(handle) = session.handle() else {
            self.unload();
            return;
        };
        if self.collection_path.is_empty() {
            self.unload();
            return;
        }
        if !self.tracker.try_set_operation(Operations::COLLECTION_LOADING) {
            warn!(path = %self.collection_path, "Collection is already loading");
            return;
        }

        self.tracker.clear_error();
        let path = self.collection_path.clone();
        let store = session.store();

        let locked = match store.collection_locked(handle, &path).await {
            Ok(locked) => locked,
            Err(e) => {
                self.tracker.clear_operation(Operations::COLLECTION_LOADING);
                warn!(error = %e, path = %path, "Failed to query collection lock state");
                self.unload();
                self.tracker
                    .set_error(ErrorKind::CollectionLoadError, e.to_string());
                return;
            }
        };

        if locked {
            self.tracker.clear_operation(Operations::COLLECTION_LOADING);
            debug!(path = %path, "Collection is locked");
            self.items.clear();
            self.tracker.clear_state(Status::COLLECTION_READY);
            self.tracker.set_state(Status::COLLECTION_LOCKED);
            // Unlocking elsewhere arrives as a collection change
            self.watched = Some(path);
            return;
        }

        let result = store.load_items(handle, &path).await;
        self.tracker.clear_operation(Operations::COLLECTION_LOADING);

        match result {
            Ok(summaries) => {
                debug!(path = %path, count = summaries.len(), "Collection items loaded");
                self.items
                    .reset(summaries.into_iter().map(ItemEntry::from).collect());
                self.tracker.clear_state(Status::COLLECTION_LOCKED);
                self.tracker.set_state(Status::COLLECTION_READY);
                self.watched = Some(path);
            }
            Err(e) => {
                warn!(error = %e, path = %path, "Failed to load collection items");
                self.unload();
                self.tracker
                    .set_error(ErrorKind::CollectionLoadError, e.to_string());
            }
        }
    }

    /// Locks a collection
    pub async fn lock(&mut self, session: &ConnectionSession, path: &ObjectPath) {
        let Some(handle) = session.handle() else {
            return;
        };
        if !self.tracker.try_set_operation(Operations::COLLECTION_LOCKING) {
            warn!(path = %path, "Collection is already being locked");
            return;
        }

        let result = session.store().lock_collection(handle, path).await;
        self.tracker.clear_operation(Operations::COLLECTION_LOCKING);

        match result {
            Ok(()) => {
                self.load_collections(session).await;
                self.notify(CollectionEvent::CollectionLocked(path.clone()));
                if path == &self.collection_path {
                    self.refresh(session).await;
                }
            }
            Err(e) => {
                warn!(error = %e, path = %path, "Failed to lock collection");
                self.tracker
                    .set_error(ErrorKind::CollectionLockError, e.to_string());
            }
        }
    }

    /// Unlocks a collection
    pub async fn unlock(&mut self, session: &ConnectionSession, path: &ObjectPath) {
        let Some(handle) = session.handle() else {
            return;
        };
        if !self.tracker.try_set_operation(Operations::COLLECTION_UNLOCKING) {
            warn!(path = %path, "Collection is already being unlocked");
            return;
        }

        let result = session.store().unlock_collection(handle, path).await;
        self.tracker
            .clear_operation(Operations::COLLECTION_UNLOCKING);

        match result {
            Ok(()) => {
                self.load_collections(session).await;
                self.notify(CollectionEvent::CollectionUnlocked(path.clone()));
                if path == &self.collection_path {
                    self.refresh(session).await;
                }
            }
            Err(e) => {
                warn!(error = %e, path = %path, "Failed to unlock collection");
                self.tracker
                    .set_error(ErrorKind::CollectionUnlockError, e.to_string());
            }
        }
    }

    /// Creates a collection and returns its path
    ///
    /// The default collection and the collection list are re-read afterwards
    /// whatever the outcome.
    pub async fn create_collection(
        &mut self,
        session: &mut ConnectionSession,
        name: &str,
    ) -> Option<ObjectPath> {
        let handle = session.handle()?.clone();
        if !self
            .tracker
            .try_set_operation(Operations::COLLECTION_CREATING)
        {
            warn!(name, "A collection is already being created");
            return None;
        }

        let result = session.store().create_collection(&handle, name).await;
        self.tracker
            .clear_operation(Operations::COLLECTION_CREATING);

        let created = match result {
            Ok(path) => {
                debug!(name, path = %path, "Collection created");
                Some(path)
            }
            Err(e) => {
                warn!(error = %e, name, "Failed to create collection");
                self.tracker
                    .set_error(ErrorKind::CollectionCreationError, e.to_string());
                None
            }
        };

        session.read_default_collection().await;
        self.load_collections(session).await;
        created
    }

    /// Deletes a collection
    ///
    /// Deleting the current collection clears the selection.
    pub async fn delete_collection(&mut self, session: &mut ConnectionSession, path: &ObjectPath) {
        let Some(handle) = session.handle().cloned() else {
            return;
        };
        if !self
            .tracker
            .try_set_operation(Operations::COLLECTION_DELETING)
        {
            warn!(path = %path, "A collection is already being deleted");
            return;
        }

        let result = session.store().delete_collection(&handle, path).await;
        self.tracker
            .clear_operation(Operations::COLLECTION_DELETING);

        match result {
            Ok(()) => {
                debug!(path = %path, "Collection deleted");
                if path == &self.collection_path {
                    self.set_collection_path(session, ObjectPath::empty()).await;
                }
            }
            Err(e) => {
                warn!(error = %e, path = %path, "Failed to delete collection");
                self.tracker
                    .set_error(ErrorKind::CollectionDeleteError, e.to_string());
            }
        }

        session.read_default_collection().await;
        self.load_collections(session).await;
    }

    /// Reacts to the service connecting or disconnecting
    ///
    /// On connect the collection list is loaded and, if nothing is selected,
    /// the persisted selection is restored or the first collection chosen.
    pub async fn handle_connectivity(&mut self, session: &ConnectionSession, connected: bool) {
        if !connected {
            self.collections.clear();
            self.unload();
            return;
        }

        self.load_collections(session).await;

        if self.collection_path.is_empty() {
            let mut path = self
                .config
                .as_ref()
                .map(ConfigManager::current_collection_path)
                .unwrap_or_default();
            if path.is_empty() {
                path = self
                    .collections
                    .get(0)
                    .map(|c| c.dbus_path.clone())
                    .unwrap_or_default();
            }
            self.set_collection_path(session, path).await;
        } else {
            self.refresh(session).await;
        }
    }

    /// Routes a store notification
    pub async fn handle_store_event(&mut self, session: &ConnectionSession, event: &StoreEvent) {
        match event {
            StoreEvent::CollectionCreated(_) => self.load_collections(session).await,
            StoreEvent::CollectionDeleted(path) => {
                self.load_collections(session).await;
                if path == &self.collection_path {
                    self.set_collection_path(session, ObjectPath::empty()).await;
                }
            }
            StoreEvent::CollectionChanged(path) => {
                self.load_collections(session).await;
                if path == &self.collection_path {
                    self.refresh(session).await;
                }
            }
            StoreEvent::ItemsChanged(path) => {
                if self.watched.as_ref() == Some(path) {
                    self.refresh(session).await;
                }
            }
            StoreEvent::ServiceOwnerChanged { .. } | StoreEvent::ServicePropertiesChanged => {}
        }
    }
}
