//! Item models and the attribute conventions shared with QtKeychain

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;

use super::ObjectPath;

/// Ordered attribute map of an item
pub type Attributes = BTreeMap<String, String>;

/// Attribute naming the schema an item was stored with
pub const SCHEMA_ATTRIBUTE: &str = "xdg:schema";

/// Attribute holding the encoding of the secret value
pub const TYPE_ATTRIBUTE: &str = "type";

/// Schema used by QtKeychain and by items created here
pub const QT_KEYCHAIN_SCHEMA: &str = "org.qt.keychain";

/// Folder used when an item has neither a `server` nor a `service` attribute
pub const FALLBACK_FOLDER: &str = "Other";

/// Derives the grouping folder of an item from its attributes
///
/// A present `server` attribute wins over `service`, even when empty. An item
/// whose chosen value is missing or empty goes to [`FALLBACK_FOLDER`].
#[must_use]
pub fn folder_for_attributes(attributes: &Attributes) -> String {
    attributes
        .get("server")
        .or_else(|| attributes.get("service"))
        .filter(|folder| !folder.is_empty())
        .cloned()
        .unwrap_or_else(|| FALLBACK_FOLDER.to_string())
}

/// Encoding of an item's secret value, read from the `type` attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SecretType {
    /// UTF-8 text stored as is
    #[default]
    PlainText,
    /// Arbitrary bytes stored as base64 text
    Base64,
    /// Arbitrary bytes stored as is
    Binary,
    /// A serialized key/value map stored as text
    Map,
}

impl SecretType {
    /// Parses a `type` attribute value; unknown names are plain text
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name {
            "base64" => Self::Base64,
            "binary" => Self::Binary,
            "map" => Self::Map,
            _ => Self::PlainText,
        }
    }

    /// Reads the type from an attribute map
    #[must_use]
    pub fn from_attributes(attributes: &Attributes) -> Self {
        attributes
            .get(TYPE_ATTRIBUTE)
            .map_or(Self::PlainText, |name| Self::from_name(name))
    }

    /// The `type` attribute value for this encoding
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PlainText => "plaintext",
            Self::Base64 => "base64",
            Self::Binary => "binary",
            Self::Map => "map",
        }
    }

    /// Content type passed to the store along with the secret
    #[must_use]
    pub const fn content_type(self) -> &'static str {
        match self {
            Self::Binary => "application/octet-stream",
            _ => "text/plain",
        }
    }
}

impl fmt::Display for SecretType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An item as listed by the store, before folder derivation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemSummary {
    /// Item label
    pub label: String,
    /// Object path of the item
    pub dbus_path: ObjectPath,
    /// Item attributes
    pub attributes: Attributes,
}

/// An entry of a collection's item list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemEntry {
    /// Item label
    pub label: String,
    /// Object path of the item
    pub dbus_path: ObjectPath,
    /// Grouping folder derived with [`folder_for_attributes`]
    pub folder: String,
}

impl From<ItemSummary> for ItemEntry {
    fn from(summary: ItemSummary) -> Self {
        let folder = folder_for_attributes(&summary.attributes);
        Self {
            label: summary.label,
            dbus_path: summary.dbus_path,
            folder,
        }
    }
}

/// Metadata of a single item, without its secret
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemSnapshot {
    /// Item label
    pub label: String,
    /// Item attributes
    pub attributes: Attributes,
    /// Creation time
    pub created: DateTime<Utc>,
    /// Last modification time
    pub modified: DateTime<Utc>,
    /// Whether the item is locked
    pub locked: bool,
}
