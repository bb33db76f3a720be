//! Item controller
//!
//! The [`ItemController`] loads, edits and persists one item at a time.
//! Loading reads the metadata first, unlocks the item if needed, then reads
//! the secret. Edits are local until [`ItemController::save`], which writes
//! the label, attributes and secret as three concurrent calls tracked under
//! the composite `ITEM_SAVING` operation.
//!
//! A save is not atomic. If one part fails the others are not rolled back,
//! so the store may hold a mix of old and new values; the local fields keep
//! the edited values and the tracker reports `ItemSaveError`.

use std::borrow::Cow;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretSlice};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::models::{
    folder_for_attributes, Attributes, ObjectPath, SecretType, QT_KEYCHAIN_SCHEMA,
    SCHEMA_ATTRIBUTE, TYPE_ATTRIBUTE,
};
use crate::session::ConnectionSession;
use crate::store::{NewItem, StoreEvent};
use crate::tracker::{ErrorKind, OperationTracker, Operations, Status};

const EVENT_CAPACITY: usize = 32;

const ITEM_STATE: Status = Status::ITEM_READY
    .union(Status::ITEM_LOCKED)
    .union(Status::ITEM_NEEDS_SAVE);

/// Change notification emitted by an [`ItemController`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemEvent {
    /// The collection or item path changed
    PathChanged,
    /// The label changed
    LabelChanged,
    /// The secret value changed
    SecretValueChanged,
    /// The attributes, and with them the secret type, changed
    AttributesChanged,
    /// The creation or modification time changed
    TimestampsChanged,
}

/// Loads, edits and saves a single item
pub struct ItemController {
    tracker: Arc<OperationTracker>,
    collection_path: ObjectPath,
    item_path: ObjectPath,
    loaded: bool,
    secret_loaded: bool,
    label: String,
    secret: SecretSlice<u8>,
    attributes: Attributes,
    secret_type: SecretType,
    created: Option<DateTime<Utc>>,
    modified: Option<DateTime<Utc>>,
    locked: bool,
    events: broadcast::Sender<ItemEvent>,
}

impl ItemController {
    /// Creates an empty controller
    #[must_use]
    pub fn new(tracker: Arc<OperationTracker>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            tracker,
            collection_path: ObjectPath::empty(),
            item_path: ObjectPath::empty(),
            loaded: false,
            secret_loaded: false,
            label: String::new(),
            secret: SecretSlice::from(Vec::new()),
            attributes: Attributes::new(),
            secret_type: SecretType::default(),
            created: None,
            modified: None,
            locked: false,
            events,
        }
    }

    /// Subscribes to field change notifications
    pub fn subscribe(&self) -> broadcast::Receiver<ItemEvent> {
        self.events.subscribe()
    }

    fn notify(&self, event: ItemEvent) {
        let _ = self.events.send(event);
    }

    // ========== Accessors ==========

    /// Path of the collection holding the item
    #[must_use]
    pub fn collection_path(&self) -> &ObjectPath {
        &self.collection_path
    }

    /// Path of the item
    #[must_use]
    pub fn item_path(&self) -> &ObjectPath {
        &self.item_path
    }

    /// Returns true once the item's metadata has been loaded
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.loaded
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Decoded secret value
    #[must_use]
    pub fn secret_value(&self) -> &[u8] {
        self.secret.expose_secret()
    }

    /// Secret value as text, with invalid UTF-8 replaced
    #[must_use]
    pub fn secret_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.secret.expose_secret())
    }

    #[must_use]
    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    #[must_use]
    pub fn secret_type(&self) -> SecretType {
        self.secret_type
    }

    #[must_use]
    pub fn creation_time(&self) -> Option<DateTime<Utc>> {
        self.created
    }

    #[must_use]
    pub fn modification_time(&self) -> Option<DateTime<Utc>> {
        self.modified
    }

    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Returns true for items stored with the QtKeychain schema
    #[must_use]
    pub fn is_qt_keychain(&self) -> bool {
        self.attributes
            .get(SCHEMA_ATTRIBUTE)
            .is_some_and(|schema| schema == QT_KEYCHAIN_SCHEMA)
    }

    /// Account name of a QtKeychain item
    #[must_use]
    pub fn item_name(&self) -> Option<&str> {
        if !self.is_qt_keychain() {
            return None;
        }
        self.attributes.get("user").map(String::as_str)
    }

    /// Grouping folder, derived like the collection item list does
    #[must_use]
    pub fn folder(&self) -> String {
        folder_for_attributes(&self.attributes)
    }

    // ========== Loading ==========

    fn reset_fields(&mut self) {
        self.loaded = false;
        self.secret_loaded = false;
        if !self.label.is_empty() {
            self.label.clear();
            self.notify(ItemEvent::LabelChanged);
        }
        if !self.secret.expose_secret().is_empty() {
            self.secret = SecretSlice::from(Vec::new());
            self.notify(ItemEvent::SecretValueChanged);
        }
        if !self.attributes.is_empty() {
            self.attributes.clear();
            self.secret_type = SecretType::default();
            self.notify(ItemEvent::AttributesChanged);
        }
        if self.created.is_some() || self.modified.is_some() {
            self.created = None;
            self.modified = None;
            self.notify(ItemEvent::TimestampsChanged);
        }
        self.locked = false;
        self.tracker.clear_state(ITEM_STATE);
    }

    /// Loads an item
    ///
    /// Fields are reset first. Without a connection the call stops there and
    /// records no error. A locked item is unlocked before its secret is read.
    pub async fn load_item(
        &mut self,
        session: &ConnectionSession,
        collection_path: ObjectPath,
        item_path: ObjectPath,
    ) {
        self.reset_fields();
        if collection_path != self.collection_path || item_path != self.item_path {
            self.collection_path = collection_path;
            self.item_path = item_path;
            self.notify(ItemEvent::PathChanged);
        }

        let Some(handle) = session.handle() else {
            return;
        };
        if self.item_path.is_empty() {
            return;
        }
        if !self.tracker.try_set_operation(Operations::ITEM_LOADING) {
            warn!(path = %self.item_path, "Item is already loading");
            return;
        }

        self.tracker.clear_error();
        let result = session
            .store()
            .get_item(handle, &self.collection_path, &self.item_path)
            .await;

        let snapshot = match result {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.tracker.clear_operation(Operations::ITEM_LOADING);
                warn!(error = %e, path = %self.item_path, "Failed to load item");
                self.tracker.set_error(ErrorKind::ItemLoadError, e.to_string());
                return;
            }
        };

        self.loaded = true;
        self.label = snapshot.label;
        self.secret_type = SecretType::from_attributes(&snapshot.attributes);
        self.attributes = snapshot.attributes;
        self.created = Some(snapshot.created);
        self.modified = Some(snapshot.modified);
        self.locked = snapshot.locked;
        self.notify(ItemEvent::LabelChanged);
        self.notify(ItemEvent::AttributesChanged);
        self.notify(ItemEvent::TimestampsChanged);
        debug!(path = %self.item_path, locked = self.locked, "Item metadata loaded");

        if self.locked {
            self.tracker.set_state(Status::ITEM_LOCKED);
            self.tracker.set_operation(Operations::ITEM_UNLOCKING);
            self.unlock_and_load_secret(session).await;
        } else {
            self.load_secret(session).await;
        }
        self.tracker.clear_operation(Operations::ITEM_LOADING);
    }

    /// Unlocks the loaded item and reads its secret
    pub async fn unlock(&mut self, session: &ConnectionSession) {
        if session.handle().is_none() || self.item_path.is_empty() {
            return;
        }
        if !self.tracker.try_set_operation(Operations::ITEM_UNLOCKING) {
            warn!(path = %self.item_path, "Item is already being unlocked");
            return;
        }
        self.unlock_and_load_secret(session).await;
    }

    /// Expects `ITEM_UNLOCKING` to be set; clears it
    async fn unlock_and_load_secret(&mut self, session: &ConnectionSession) {
        let Some(handle) = session.handle() else {
            self.tracker.clear_operation(Operations::ITEM_UNLOCKING);
            return;
        };

        let result = session.store().unlock_item(handle, &self.item_path).await;
        self.tracker.clear_operation(Operations::ITEM_UNLOCKING);

        match result {
            Ok(()) => {
                self.locked = false;
                self.tracker.clear_state(Status::ITEM_LOCKED);
                self.load_secret(session).await;
            }
            Err(e) => {
                warn!(error = %e, path = %self.item_path, "Failed to unlock item");
                self.tracker
                    .set_error(ErrorKind::ItemUnlockError, e.to_string());
            }
        }
    }

    async fn load_secret(&mut self, session: &ConnectionSession) {
        let Some(handle) = session.handle() else {
            return;
        };

        self.tracker.set_operation(Operations::ITEM_LOADING_SECRET);
        let result = session.store().get_secret(handle, &self.item_path).await;
        self.tracker
            .clear_operation(Operations::ITEM_LOADING_SECRET);

        match result {
            Ok(raw) => {
                self.secret = decode_secret(self.secret_type, raw);
                self.secret_loaded = true;
                self.notify(ItemEvent::SecretValueChanged);
                self.tracker.set_state(Status::ITEM_READY);
                debug!(path = %self.item_path, "Item secret loaded");
            }
            Err(e) => {
                warn!(error = %e, path = %self.item_path, "Failed to load item secret");
                self.tracker
                    .set_error(ErrorKind::ItemLoadSecretError, e.to_string());
            }
        }
    }

    // ========== Editing ==========

    fn mark_dirty(&self) {
        self.tracker.set_state(Status::ITEM_NEEDS_SAVE);
    }

    /// Changes the label locally
    pub fn set_label(&mut self, label: &str) {
        if self.label == label {
            return;
        }
        label.clone_into(&mut self.label);
        self.notify(ItemEvent::LabelChanged);
        self.mark_dirty();
    }

    /// Changes the secret value locally
    pub fn set_secret_value(&mut self, value: &[u8]) {
        if self.secret.expose_secret() == value {
            return;
        }
        self.secret = SecretSlice::from(value.to_vec());
        self.notify(ItemEvent::SecretValueChanged);
        self.mark_dirty();
    }

    /// Changes one attribute locally
    ///
    /// Changing `type` changes how the secret is encoded on save.
    pub fn set_attribute(&mut self, key: &str, value: &str) {
        if self.attributes.get(key).is_some_and(|v| v == value) {
            return;
        }
        self.attributes.insert(key.to_string(), value.to_string());
        if key == TYPE_ATTRIBUTE {
            self.secret_type = SecretType::from_name(value);
        }
        self.notify(ItemEvent::AttributesChanged);
        self.mark_dirty();
    }

    // ========== Persistence ==========

    /// Writes the local fields back to the store
    ///
    /// The label is always written. Attributes and secret are only written for
    /// QtKeychain items, and binary secrets are never written. On full success
    /// the modification time is updated; any failing part records
    /// `ItemSaveError` without undoing the parts that succeeded.
    ///
    /// Only a fully loaded item is saved. After a failed load the local
    /// fields are empty and must not overwrite the stored ones.
    pub async fn save(&mut self, session: &ConnectionSession) {
        let Some(handle) = session.handle() else {
            return;
        };
        if self.item_path.is_empty() {
            return;
        }
        if !self.secret_loaded {
            warn!(path = %self.item_path, "Refusing to save an item that did not load");
            return;
        }

        let managed = self.is_qt_keychain();
        let write_secret = managed && self.secret_type != SecretType::Binary;
        if managed && !write_secret {
            debug!(path = %self.item_path, "Binary secrets are not saved");
        }

        let mut parts = Operations::ITEM_SAVING_LABEL;
        if managed {
            parts |= Operations::ITEM_SAVING_ATTRIBUTES;
        }
        if write_secret {
            parts |= Operations::ITEM_SAVING_SECRET;
        }
        if !self.tracker.try_set_operation(parts) {
            warn!(path = %self.item_path, "Item is already being saved");
            return;
        }

        self.tracker.clear_error();
        let store = session.store();
        let tracker = self.tracker.as_ref();
        let item = &self.item_path;
        let encoded = encode_secret(self.secret_type, self.secret.expose_secret());

        let label = async {
            let result = store.set_label(handle, item, &self.label).await;
            tracker.clear_operation(Operations::ITEM_SAVING_LABEL);
            result
        };
        let attributes = async {
            if !managed {
                return Ok(());
            }
            let result = store.set_attributes(handle, item, &self.attributes).await;
            tracker.clear_operation(Operations::ITEM_SAVING_ATTRIBUTES);
            result
        };
        let secret = async {
            if !write_secret {
                return Ok(());
            }
            let result = store
                .set_secret(
                    handle,
                    item,
                    encoded.expose_secret(),
                    self.secret_type.content_type(),
                )
                .await;
            tracker.clear_operation(Operations::ITEM_SAVING_SECRET);
            result
        };

        let (label, attributes, secret) = futures::join!(label, attributes, secret);

        let mut failed = false;
        for (part, result) in [("label", label), ("attributes", attributes), ("secret", secret)] {
            if let Err(e) = result {
                warn!(error = %e, path = %self.item_path, part, "Failed to save item");
                self.tracker.set_error(ErrorKind::ItemSaveError, e.to_string());
                failed = true;
            }
        }

        if !failed {
            self.modified = Some(Utc::now());
            self.notify(ItemEvent::TimestampsChanged);
            debug!(path = %self.item_path, "Item saved");
        }
    }

    /// Deletes the loaded item and closes the controller
    ///
    /// The controller is closed before the operation flag is cleared, so
    /// observers see empty fields before the busy state ends. Items that
    /// failed to load are never deleted.
    pub async fn delete_item(&mut self, session: &ConnectionSession) {
        let Some(handle) = session.handle() else {
            warn!("Refusing to delete an item while disconnected");
            return;
        };
        if self.item_path.is_empty() {
            return;
        }
        if !self.loaded {
            warn!(path = %self.item_path, "Refusing to delete an item that did not load");
            return;
        }
        if !self.tracker.try_set_operation(Operations::ITEM_DELETING) {
            warn!(path = %self.item_path, "Item is already being deleted");
            return;
        }

        let result = session.store().delete_item(handle, &self.item_path).await;
        self.close();
        self.tracker.clear_operation(Operations::ITEM_DELETING);

        if let Err(e) = result {
            warn!(error = %e, "Failed to delete item");
            self.tracker
                .set_error(ErrorKind::ItemDeleteError, e.to_string());
        }
    }

    /// Creates a QtKeychain item, replacing one with the same attributes
    ///
    /// Returns the path of the created or replaced item.
    pub async fn create_item(
        &mut self,
        session: &ConnectionSession,
        label: &str,
        secret: &[u8],
        user: &str,
        server: &str,
        collection_path: &ObjectPath,
    ) -> Option<ObjectPath> {
        let handle = session.handle()?;
        if !self.tracker.try_set_operation(Operations::ITEM_CREATING) {
            warn!("An item is already being created");
            return None;
        }

        let secret_type = SecretType::PlainText;
        let attributes: Attributes = [
            ("user", user),
            ("server", server),
            (TYPE_ATTRIBUTE, secret_type.as_str()),
            (SCHEMA_ATTRIBUTE, QT_KEYCHAIN_SCHEMA),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        let item = NewItem {
            label: label.to_string(),
            attributes,
            secret: SecretSlice::from(secret.to_vec()),
            content_type: secret_type.content_type().to_string(),
            replace: true,
        };

        let result = session
            .store()
            .create_item(handle, collection_path, &item)
            .await;
        self.tracker.clear_operation(Operations::ITEM_CREATING);

        match result {
            Ok(path) => {
                debug!(path = %path, "Item created");
                Some(path)
            }
            Err(e) => {
                warn!(error = %e, collection = %collection_path, "Failed to create item");
                self.tracker
                    .set_error(ErrorKind::ItemCreationError, e.to_string());
                None
            }
        }
    }

    /// Forgets the loaded item
    pub fn close(&mut self) {
        self.reset_fields();
        if !self.collection_path.is_empty() || !self.item_path.is_empty() {
            self.collection_path = ObjectPath::empty();
            self.item_path = ObjectPath::empty();
            self.notify(ItemEvent::PathChanged);
        }
    }

    // ========== Notifications ==========

    /// Reacts to the service connecting or disconnecting
    ///
    /// With an item selected the item is loaded again, which leaves the fields
    /// empty while disconnected. Without one the controller is closed.
    pub async fn handle_connectivity(&mut self, session: &ConnectionSession) {
        if self.item_path.is_empty() {
            self.close();
            return;
        }
        let collection = self.collection_path.clone();
        let item = self.item_path.clone();
        self.load_item(session, collection, item).await;
    }

    /// Routes a store notification
    pub fn handle_store_event(&mut self, event: &StoreEvent) {
        if let StoreEvent::CollectionDeleted(path) = event {
            if path == &self.collection_path {
                self.close();
            }
        }
    }
}

fn decode_secret(secret_type: SecretType, raw: SecretSlice<u8>) -> SecretSlice<u8> {
    if secret_type != SecretType::Base64 {
        return raw;
    }
    match STANDARD.decode(raw.expose_secret()) {
        Ok(decoded) => SecretSlice::from(decoded),
        Err(e) => {
            warn!(error = %e, "Secret is not valid base64, keeping raw value");
            raw
        }
    }
}

fn encode_secret(secret_type: SecretType, value: &[u8]) -> SecretSlice<u8> {
    match secret_type {
        SecretType::Base64 => SecretSlice::from(STANDARD.encode(value).into_bytes()),
        _ => SecretSlice::from(value.to_vec()),
    }
}
