//! Collection (wallet) listing entry

use super::ObjectPath;

/// A collection as returned by a listing
///
/// The lock flag is a snapshot; ask the store again before relying on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionEntry {
    /// User-visible label, not necessarily unique
    pub name: String,
    /// Object path of the collection
    pub dbus_path: ObjectPath,
    /// Whether the collection was locked when listed
    pub locked: bool,
}

impl CollectionEntry {
    /// Creates a new entry
    #[must_use]
    pub fn new(name: impl Into<String>, dbus_path: impl Into<ObjectPath>, locked: bool) -> Self {
        Self {
            name: name.into(),
            dbus_path: dbus_path.into(),
            locked,
        }
    }

    /// Returns true for internal collections that should never be shown
    ///
    /// gnome-keyring uses an unlabelled collection for session secrets.
    #[must_use]
    pub fn is_private(&self) -> bool {
        self.name.is_empty()
    }
}
