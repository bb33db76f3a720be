//! Secret store collaborator
//!
//! This module defines the [`SecretStore`] trait through which the session
//! and the controllers reach the freedesktop Secret Service. The trait is the
//! whole contract: an implementation may talk to D-Bus, wrap libsecret, or
//! keep everything in memory like [`MemoryStore`].
//!
//! Every call except [`SecretStore::connect`] and [`SecretStore::subscribe`]
//! takes the [`ConnectionHandle`] issued by `connect`. Implementations reject
//! handles issued before the service owner changed.

mod memory;

pub use memory::{MemoryStore, StoreOp};

use async_trait::async_trait;
use secrecy::SecretSlice;
use tokio::sync::broadcast;

use crate::error::StoreResult;
use crate::models::{Attributes, CollectionEntry, ItemSnapshot, ItemSummary, ObjectPath};

/// Well-known bus name of the Secret Service
pub const SECRET_SERVICE_BUS_NAME: &str = "org.freedesktop.secrets";

/// Alias naming the default collection
pub const DEFAULT_ALIAS: &str = "default";

/// Handle to an open Secret Service connection
///
/// Opaque to callers. The generation identifies the service owner the handle
/// was issued for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionHandle {
    generation: u64,
    session: ObjectPath,
}

impl ConnectionHandle {
    /// Creates a handle; only store implementations call this
    #[must_use]
    pub const fn new(generation: u64, session: ObjectPath) -> Self {
        Self {
            generation,
            session,
        }
    }

    /// Service owner generation the handle belongs to
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Object path of the open session
    #[must_use]
    pub const fn session(&self) -> &ObjectPath {
        &self.session
    }
}

/// Notification delivered by the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// A bus name owner changed; `None` means the service went away
    ServiceOwnerChanged {
        /// Well-known bus name whose owner changed
        name: String,
        /// Unique name of the new owner
        new_owner: Option<String>,
    },
    /// A collection was created
    CollectionCreated(ObjectPath),
    /// A collection was deleted
    CollectionDeleted(ObjectPath),
    /// A collection's properties (label, lock state) changed
    CollectionChanged(ObjectPath),
    /// Items were added to, removed from, or changed in a collection
    ItemsChanged(ObjectPath),
    /// A property of the service itself changed, such as an alias
    ServicePropertiesChanged,
}

/// Parameters of a new item
#[derive(Debug)]
pub struct NewItem {
    /// Item label
    pub label: String,
    /// Item attributes, schema included
    pub attributes: Attributes,
    /// Secret value
    pub secret: SecretSlice<u8>,
    /// Content type of the secret
    pub content_type: String,
    /// Replace an item with identical attributes instead of adding another
    pub replace: bool,
}

/// Asynchronous access to a Secret Service provider
///
/// All methods complete with success or a typed [`StoreError`](crate::StoreError).
/// Callers translate failures into tracker errors; implementations only
/// report them.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Opens a session with the service, activating it if needed
    async fn connect(&self) -> StoreResult<ConnectionHandle>;

    /// Subscribes to service and collection notifications
    fn subscribe(&self) -> broadcast::Receiver<StoreEvent>;

    /// Lists every collection, private ones included
    async fn list_collections(&self, handle: &ConnectionHandle)
        -> StoreResult<Vec<CollectionEntry>>;

    /// Queries the current lock state of a collection
    async fn collection_locked(
        &self,
        handle: &ConnectionHandle,
        collection: &ObjectPath,
    ) -> StoreResult<bool>;

    /// Locks a collection
    async fn lock_collection(
        &self,
        handle: &ConnectionHandle,
        collection: &ObjectPath,
    ) -> StoreResult<()>;

    /// Unlocks a collection, prompting the user if the provider needs to
    async fn unlock_collection(
        &self,
        handle: &ConnectionHandle,
        collection: &ObjectPath,
    ) -> StoreResult<()>;

    /// Creates a collection with the given label
    async fn create_collection(
        &self,
        handle: &ConnectionHandle,
        label: &str,
    ) -> StoreResult<ObjectPath>;

    /// Deletes a collection and its items
    async fn delete_collection(
        &self,
        handle: &ConnectionHandle,
        collection: &ObjectPath,
    ) -> StoreResult<()>;

    /// Lists the items of an unlocked collection
    async fn load_items(
        &self,
        handle: &ConnectionHandle,
        collection: &ObjectPath,
    ) -> StoreResult<Vec<ItemSummary>>;

    /// Reads an item's metadata
    async fn get_item(
        &self,
        handle: &ConnectionHandle,
        collection: &ObjectPath,
        item: &ObjectPath,
    ) -> StoreResult<ItemSnapshot>;

    /// Reads an item's secret value
    async fn get_secret(
        &self,
        handle: &ConnectionHandle,
        item: &ObjectPath,
    ) -> StoreResult<SecretSlice<u8>>;

    /// Unlocks an item
    async fn unlock_item(&self, handle: &ConnectionHandle, item: &ObjectPath) -> StoreResult<()>;

    /// Replaces an item's label
    async fn set_label(
        &self,
        handle: &ConnectionHandle,
        item: &ObjectPath,
        label: &str,
    ) -> StoreResult<()>;

    /// Replaces an item's attributes
    async fn set_attributes(
        &self,
        handle: &ConnectionHandle,
        item: &ObjectPath,
        attributes: &Attributes,
    ) -> StoreResult<()>;

    /// Replaces an item's secret value
    async fn set_secret(
        &self,
        handle: &ConnectionHandle,
        item: &ObjectPath,
        secret: &[u8],
        content_type: &str,
    ) -> StoreResult<()>;

    /// Deletes an item
    async fn delete_item(&self, handle: &ConnectionHandle, item: &ObjectPath) -> StoreResult<()>;

    /// Creates an item in a collection
    async fn create_item(
        &self,
        handle: &ConnectionHandle,
        collection: &ObjectPath,
        item: &NewItem,
    ) -> StoreResult<ObjectPath>;

    /// Resolves an alias; `None` if the alias is not set
    async fn read_alias(
        &self,
        handle: &ConnectionHandle,
        alias: &str,
    ) -> StoreResult<Option<ObjectPath>>;

    /// Points an alias at a collection
    async fn set_alias(
        &self,
        handle: &ConnectionHandle,
        alias: &str,
        collection: &ObjectPath,
    ) -> StoreResult<()>;

    /// Returns the backend identifier
    fn backend_id(&self) -> &'static str;
}
