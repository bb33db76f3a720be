//! In-memory secret store
//!
//! `MemoryStore` behaves like a small Secret Service provider: collections and
//! items can be locked, aliases resolve to collections, every mutation emits
//! the matching [`StoreEvent`], and the service can disappear and come back.
//! Failures can be injected per operation, which makes it the collaborator of
//! choice for tests and demos.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretSlice};
use tokio::sync::broadcast;
use tracing::trace;

use crate::error::{StoreError, StoreResult};
use crate::models::{Attributes, CollectionEntry, ItemSnapshot, ItemSummary, ObjectPath};

use super::{ConnectionHandle, NewItem, SecretStore, StoreEvent, SECRET_SERVICE_BUS_NAME};

const COLLECTION_PREFIX: &str = "/org/freedesktop/secrets/collection/";
const SESSION_PREFIX: &str = "/org/freedesktop/secrets/session/";
const EVENT_CAPACITY: usize = 256;

/// Store calls, used for failure injection and call accounting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Connect,
    ListCollections,
    CollectionLocked,
    LockCollection,
    UnlockCollection,
    CreateCollection,
    DeleteCollection,
    LoadItems,
    GetItem,
    GetSecret,
    UnlockItem,
    SetLabel,
    SetAttributes,
    SetSecret,
    DeleteItem,
    CreateItem,
    ReadAlias,
    SetAlias,
}

struct MemoryCollection {
    label: String,
    locked: bool,
    items: Vec<ObjectPath>,
}

struct MemoryItem {
    collection: ObjectPath,
    label: String,
    attributes: Attributes,
    secret: SecretSlice<u8>,
    content_type: String,
    created: DateTime<Utc>,
    modified: DateTime<Utc>,
    locked: bool,
}

struct MemoryState {
    available: bool,
    generation: u64,
    next_id: u64,
    /// Collections in creation order
    collection_order: Vec<ObjectPath>,
    collections: HashMap<ObjectPath, MemoryCollection>,
    items: BTreeMap<ObjectPath, MemoryItem>,
    aliases: HashMap<String, ObjectPath>,
    failures: HashMap<StoreOp, StoreError>,
    calls: HashMap<StoreOp, usize>,
}

impl MemoryState {
    fn check(&self, handle: &ConnectionHandle) -> StoreResult<()> {
        if !self.available {
            return Err(StoreError::ServiceUnavailable(
                "org.freedesktop.secrets has no owner".to_string(),
            ));
        }
        if handle.generation() != self.generation {
            return Err(StoreError::InvalidHandle);
        }
        Ok(())
    }

    fn collection(&self, path: &ObjectPath) -> StoreResult<&MemoryCollection> {
        self.collections
            .get(path)
            .ok_or_else(|| StoreError::NoSuchObject(path.to_string()))
    }

    fn collection_mut(&mut self, path: &ObjectPath) -> StoreResult<&mut MemoryCollection> {
        self.collections
            .get_mut(path)
            .ok_or_else(|| StoreError::NoSuchObject(path.to_string()))
    }

    fn item(&self, path: &ObjectPath) -> StoreResult<&MemoryItem> {
        self.items
            .get(path)
            .ok_or_else(|| StoreError::NoSuchObject(path.to_string()))
    }

    fn item_locked(&self, item: &MemoryItem) -> bool {
        item.locked
            || self
                .collections
                .get(&item.collection)
                .is_some_and(|c| c.locked)
    }

    /// Returns the item for writing, refusing locked ones
    fn unlocked_item_mut(&mut self, path: &ObjectPath) -> StoreResult<&mut MemoryItem> {
        let item = self.item(path)?;
        if self.item_locked(item) {
            return Err(StoreError::Locked(path.to_string()));
        }
        self.items
            .get_mut(path)
            .ok_or_else(|| StoreError::NoSuchObject(path.to_string()))
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn new_collection_path(&mut self, label: &str) -> ObjectPath {
        let slug: String = label
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
            .collect();
        let base = if slug.is_empty() {
            format!("{COLLECTION_PREFIX}session")
        } else {
            format!("{COLLECTION_PREFIX}{slug}")
        };
        let mut path = ObjectPath::new(base.clone());
        while self.collections.contains_key(&path) {
            path = ObjectPath::new(format!("{base}{}", self.next_id()));
        }
        path
    }

    fn insert_collection(&mut self, label: &str, locked: bool) -> ObjectPath {
        let path = self.new_collection_path(label);
        self.collections.insert(
            path.clone(),
            MemoryCollection {
                label: label.to_string(),
                locked,
                items: Vec::new(),
            },
        );
        self.collection_order.push(path.clone());
        path
    }

    fn insert_item(
        &mut self,
        collection: &ObjectPath,
        label: &str,
        attributes: Attributes,
        secret: &[u8],
        content_type: &str,
    ) -> StoreResult<ObjectPath> {
        let id = self.next_id();
        let path = ObjectPath::new(format!("{collection}/{id}"));
        self.collection_mut(collection)?.items.push(path.clone());
        let now = Utc::now();
        self.items.insert(
            path.clone(),
            MemoryItem {
                collection: collection.clone(),
                label: label.to_string(),
                attributes,
                secret: SecretSlice::from(secret.to_vec()),
                content_type: content_type.to_string(),
                created: now,
                modified: now,
                locked: false,
            },
        );
        Ok(path)
    }
}

/// Secret store kept entirely in process memory
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    events: broadcast::Sender<StoreEvent>,
}

impl MemoryStore {
    /// Creates an available store with no collections
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Mutex::new(MemoryState {
                available: true,
                generation: 1,
                next_id: 0,
                collection_order: Vec::new(),
                collections: HashMap::new(),
                items: BTreeMap::new(),
                aliases: HashMap::new(),
                failures: HashMap::new(),
                calls: HashMap::new(),
            }),
            events,
        }
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Delivers a notification to subscribers as the service would
    pub fn emit(&self, event: StoreEvent) {
        trace!(?event, "Memory store event");
        let _ = self.events.send(event);
    }

    /// Records the call, yields once, and returns an injected failure if any
    async fn begin(&self, op: StoreOp) -> StoreResult<()> {
        *self.state().calls.entry(op).or_default() += 1;
        tokio::task::yield_now().await;
        match self.state().failures.remove(&op) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    // ========== Fixture setup ==========

    /// Adds a collection without emitting events
    pub fn add_collection(&self, label: &str, locked: bool) -> ObjectPath {
        self.state().insert_collection(label, locked)
    }

    /// Adds a plain-text item without emitting events
    ///
    /// # Errors
    /// Returns `NoSuchObject` if the collection does not exist
    pub fn add_item(
        &self,
        collection: &ObjectPath,
        label: &str,
        attributes: Attributes,
        secret: &[u8],
    ) -> StoreResult<ObjectPath> {
        self.state()
            .insert_item(collection, label, attributes, secret, "text/plain")
    }

    /// Points an alias at a collection without emitting events
    pub fn add_alias(&self, alias: &str, collection: &ObjectPath) {
        self.state()
            .aliases
            .insert(alias.to_string(), collection.clone());
    }

    /// Changes the lock flag of an item without emitting events
    pub fn set_item_locked(&self, item: &ObjectPath, locked: bool) {
        if let Some(item) = self.state().items.get_mut(item) {
            item.locked = locked;
        }
    }

    /// Overrides the modification time of an item
    pub fn set_item_modified(&self, item: &ObjectPath, modified: DateTime<Utc>) {
        if let Some(item) = self.state().items.get_mut(item) {
            item.modified = modified;
        }
    }

    /// Locks or unlocks a collection as another client would, emitting
    /// `CollectionChanged`
    pub fn set_collection_locked_externally(&self, collection: &ObjectPath, locked: bool) {
        let changed = match self.state().collections.get_mut(collection) {
            Some(c) if c.locked != locked => {
                c.locked = locked;
                true
            }
            _ => false,
        };
        if changed {
            self.emit(StoreEvent::CollectionChanged(collection.clone()));
        }
    }

    /// Adds an item as another client would, emitting `ItemsChanged`
    ///
    /// # Errors
    /// Returns `NoSuchObject` if the collection does not exist
    pub fn add_item_externally(
        &self,
        collection: &ObjectPath,
        label: &str,
        attributes: Attributes,
        secret: &[u8],
    ) -> StoreResult<ObjectPath> {
        let path = self.add_item(collection, label, attributes, secret)?;
        self.emit(StoreEvent::ItemsChanged(collection.clone()));
        Ok(path)
    }

    /// Makes the service appear or disappear
    ///
    /// Every owner change invalidates outstanding handles and emits
    /// `ServiceOwnerChanged`.
    pub fn set_available(&self, available: bool) {
        let owner = {
            let mut state = self.state();
            if state.available == available {
                return;
            }
            state.available = available;
            state.generation += 1;
            available.then(|| format!(":1.{}", state.generation))
        };
        self.emit(StoreEvent::ServiceOwnerChanged {
            name: SECRET_SERVICE_BUS_NAME.to_string(),
            new_owner: owner,
        });
    }

    /// Makes the next call of `op` fail with `error`
    pub fn fail_next(&self, op: StoreOp, error: StoreError) {
        self.state().failures.insert(op, error);
    }

    /// Number of times `op` was called
    pub fn call_count(&self, op: StoreOp) -> usize {
        self.state().calls.get(&op).copied().unwrap_or(0)
    }

    // ========== Inspection ==========

    /// Current label of an item
    pub fn item_label(&self, item: &ObjectPath) -> Option<String> {
        self.state().items.get(item).map(|i| i.label.clone())
    }

    /// Current attributes of an item
    pub fn item_attributes(&self, item: &ObjectPath) -> Option<Attributes> {
        self.state().items.get(item).map(|i| i.attributes.clone())
    }

    /// Current secret of an item
    pub fn item_secret(&self, item: &ObjectPath) -> Option<Vec<u8>> {
        self.state()
            .items
            .get(item)
            .map(|i| i.secret.expose_secret().to_vec())
    }

    /// Content type of an item's secret
    pub fn item_content_type(&self, item: &ObjectPath) -> Option<String> {
        self.state().items.get(item).map(|i| i.content_type.clone())
    }

    /// Paths of the items of a collection
    pub fn item_paths(&self, collection: &ObjectPath) -> Vec<ObjectPath> {
        self.state()
            .collections
            .get(collection)
            .map(|c| c.items.clone())
            .unwrap_or_default()
    }

    /// Whether a collection exists
    pub fn has_collection(&self, collection: &ObjectPath) -> bool {
        self.state().collections.contains_key(collection)
    }

    /// Current lock flag of a collection
    pub fn is_collection_locked(&self, collection: &ObjectPath) -> Option<bool> {
        self.state().collections.get(collection).map(|c| c.locked)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SecretStore for MemoryStore {
    async fn connect(&self) -> StoreResult<ConnectionHandle> {
        self.begin(StoreOp::Connect).await?;
        let mut state = self.state();
        if !state.available {
            return Err(StoreError::ServiceUnavailable(
                "The name org.freedesktop.secrets was not provided by any .service files"
                    .to_string(),
            ));
        }
        let session = ObjectPath::new(format!("{SESSION_PREFIX}{}", state.next_id()));
        Ok(ConnectionHandle::new(state.generation, session))
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    async fn list_collections(
        &self,
        handle: &ConnectionHandle,
    ) -> StoreResult<Vec<CollectionEntry>> {
        self.begin(StoreOp::ListCollections).await?;
        let state = self.state();
        state.check(handle)?;
        Ok(state
            .collection_order
            .iter()
            .filter_map(|path| {
                state
                    .collections
                    .get(path)
                    .map(|c| CollectionEntry::new(c.label.clone(), path.clone(), c.locked))
            })
            .collect())
    }

    async fn collection_locked(
        &self,
        handle: &ConnectionHandle,
        collection: &ObjectPath,
    ) -> StoreResult<bool> {
        self.begin(StoreOp::CollectionLocked).await?;
        let state = self.state();
        state.check(handle)?;
        Ok(state.collection(collection)?.locked)
    }

    async fn lock_collection(
        &self,
        handle: &ConnectionHandle,
        collection: &ObjectPath,
    ) -> StoreResult<()> {
        self.begin(StoreOp::LockCollection).await?;
        {
            let mut state = self.state();
            state.check(handle)?;
            state.collection_mut(collection)?.locked = true;
        }
        self.emit(StoreEvent::CollectionChanged(collection.clone()));
        Ok(())
    }

    async fn unlock_collection(
        &self,
        handle: &ConnectionHandle,
        collection: &ObjectPath,
    ) -> StoreResult<()> {
        self.begin(StoreOp::UnlockCollection).await?;
        {
            let mut state = self.state();
            state.check(handle)?;
            state.collection_mut(collection)?.locked = false;
        }
        self.emit(StoreEvent::CollectionChanged(collection.clone()));
        Ok(())
    }

    async fn create_collection(
        &self,
        handle: &ConnectionHandle,
        label: &str,
    ) -> StoreResult<ObjectPath> {
        self.begin(StoreOp::CreateCollection).await?;
        let path = {
            let mut state = self.state();
            state.check(handle)?;
            state.insert_collection(label, false)
        };
        self.emit(StoreEvent::CollectionCreated(path.clone()));
        Ok(path)
    }

    async fn delete_collection(
        &self,
        handle: &ConnectionHandle,
        collection: &ObjectPath,
    ) -> StoreResult<()> {
        self.begin(StoreOp::DeleteCollection).await?;
        let aliases_changed = {
            let mut state = self.state();
            state.check(handle)?;
            let removed = state
                .collections
                .remove(collection)
                .ok_or_else(|| StoreError::NoSuchObject(collection.to_string()))?;
            state.collection_order.retain(|p| p != collection);
            for item in &removed.items {
                state.items.remove(item);
            }
            let before = state.aliases.len();
            state.aliases.retain(|_, target| target != collection);
            before != state.aliases.len()
        };
        self.emit(StoreEvent::CollectionDeleted(collection.clone()));
        if aliases_changed {
            self.emit(StoreEvent::ServicePropertiesChanged);
        }
        Ok(())
    }

    async fn load_items(
        &self,
        handle: &ConnectionHandle,
        collection: &ObjectPath,
    ) -> StoreResult<Vec<ItemSummary>> {
        self.begin(StoreOp::LoadItems).await?;
        let state = self.state();
        state.check(handle)?;
        let coll = state.collection(collection)?;
        if coll.locked {
            return Err(StoreError::Locked(collection.to_string()));
        }
        Ok(coll
            .items
            .iter()
            .filter_map(|path| {
                state.items.get(path).map(|item| ItemSummary {
                    label: item.label.clone(),
                    dbus_path: path.clone(),
                    attributes: item.attributes.clone(),
                })
            })
            .collect())
    }

    async fn get_item(
        &self,
        handle: &ConnectionHandle,
        collection: &ObjectPath,
        item: &ObjectPath,
    ) -> StoreResult<ItemSnapshot> {
        self.begin(StoreOp::GetItem).await?;
        let state = self.state();
        state.check(handle)?;
        let found = state.item(item)?;
        if &found.collection != collection {
            return Err(StoreError::NoSuchObject(item.to_string()));
        }
        Ok(ItemSnapshot {
            label: found.label.clone(),
            attributes: found.attributes.clone(),
            created: found.created,
            modified: found.modified,
            locked: state.item_locked(found),
        })
    }

    async fn get_secret(
        &self,
        handle: &ConnectionHandle,
        item: &ObjectPath,
    ) -> StoreResult<SecretSlice<u8>> {
        self.begin(StoreOp::GetSecret).await?;
        let state = self.state();
        state.check(handle)?;
        let found = state.item(item)?;
        if state.item_locked(found) {
            return Err(StoreError::Locked(item.to_string()));
        }
        Ok(SecretSlice::from(found.secret.expose_secret().to_vec()))
    }

    async fn unlock_item(&self, handle: &ConnectionHandle, item: &ObjectPath) -> StoreResult<()> {
        self.begin(StoreOp::UnlockItem).await?;
        let unlocked_collection = {
            let mut state = self.state();
            state.check(handle)?;
            let collection = state.item(item)?.collection.clone();
            if let Some(found) = state.items.get_mut(item) {
                found.locked = false;
            }
            // Unlocking an item unlocks the collection holding it
            let coll = state.collection_mut(&collection)?;
            let was_locked = coll.locked;
            coll.locked = false;
            was_locked.then_some(collection)
        };
        if let Some(collection) = unlocked_collection {
            self.emit(StoreEvent::CollectionChanged(collection));
        }
        Ok(())
    }

    async fn set_label(
        &self,
        handle: &ConnectionHandle,
        item: &ObjectPath,
        label: &str,
    ) -> StoreResult<()> {
        self.begin(StoreOp::SetLabel).await?;
        let collection = {
            let mut state = self.state();
            state.check(handle)?;
            let found = state.unlocked_item_mut(item)?;
            found.label = label.to_string();
            found.modified = Utc::now();
            found.collection.clone()
        };
        self.emit(StoreEvent::ItemsChanged(collection));
        Ok(())
    }

    async fn set_attributes(
        &self,
        handle: &ConnectionHandle,
        item: &ObjectPath,
        attributes: &Attributes,
    ) -> StoreResult<()> {
        self.begin(StoreOp::SetAttributes).await?;
        let collection = {
            let mut state = self.state();
            state.check(handle)?;
            let found = state.unlocked_item_mut(item)?;
            found.attributes.clone_from(attributes);
            found.modified = Utc::now();
            found.collection.clone()
        };
        self.emit(StoreEvent::ItemsChanged(collection));
        Ok(())
    }

    async fn set_secret(
        &self,
        handle: &ConnectionHandle,
        item: &ObjectPath,
        secret: &[u8],
        content_type: &str,
    ) -> StoreResult<()> {
        self.begin(StoreOp::SetSecret).await?;
        let collection = {
            let mut state = self.state();
            state.check(handle)?;
            let found = state.unlocked_item_mut(item)?;
            found.secret = SecretSlice::from(secret.to_vec());
            content_type.clone_into(&mut found.content_type);
            found.modified = Utc::now();
            found.collection.clone()
        };
        self.emit(StoreEvent::ItemsChanged(collection));
        Ok(())
    }

    async fn delete_item(&self, handle: &ConnectionHandle, item: &ObjectPath) -> StoreResult<()> {
        self.begin(StoreOp::DeleteItem).await?;
        let collection = {
            let mut state = self.state();
            state.check(handle)?;
            let collection = state.unlocked_item_mut(item)?.collection.clone();
            state.items.remove(item);
            state.collection_mut(&collection)?.items.retain(|p| p != item);
            collection
        };
        self.emit(StoreEvent::ItemsChanged(collection));
        Ok(())
    }

    async fn create_item(
        &self,
        handle: &ConnectionHandle,
        collection: &ObjectPath,
        item: &NewItem,
    ) -> StoreResult<ObjectPath> {
        self.begin(StoreOp::CreateItem).await?;
        let path = {
            let mut state = self.state();
            state.check(handle)?;
            if state.collection(collection)?.locked {
                return Err(StoreError::Locked(collection.to_string()));
            }
            let existing = if item.replace {
                state.collection(collection)?.items.iter().find(|path| {
                    state
                        .items
                        .get(*path)
                        .is_some_and(|i| i.attributes == item.attributes)
                })
                .cloned()
            } else {
                None
            };
            match existing {
                Some(path) => {
                    if let Some(found) = state.items.get_mut(&path) {
                        found.label.clone_from(&item.label);
                        found.secret = SecretSlice::from(item.secret.expose_secret().to_vec());
                        found.content_type.clone_from(&item.content_type);
                        found.modified = Utc::now();
                    }
                    path
                }
                None => state.insert_item(
                    collection,
                    &item.label,
                    item.attributes.clone(),
                    item.secret.expose_secret(),
                    &item.content_type,
                )?,
            }
        };
        self.emit(StoreEvent::ItemsChanged(collection.clone()));
        Ok(path)
    }

    async fn read_alias(
        &self,
        handle: &ConnectionHandle,
        alias: &str,
    ) -> StoreResult<Option<ObjectPath>> {
        self.begin(StoreOp::ReadAlias).await?;
        let state = self.state();
        state.check(handle)?;
        Ok(state.aliases.get(alias).cloned())
    }

    async fn set_alias(
        &self,
        handle: &ConnectionHandle,
        alias: &str,
        collection: &ObjectPath,
    ) -> StoreResult<()> {
        self.begin(StoreOp::SetAlias).await?;
        {
            let mut state = self.state();
            state.check(handle)?;
            state.collection(collection)?;
            state.aliases.insert(alias.to_string(), collection.clone());
        }
        self.emit(StoreEvent::ServicePropertiesChanged);
        Ok(())
    }

    fn backend_id(&self) -> &'static str {
        "memory"
    }
}
