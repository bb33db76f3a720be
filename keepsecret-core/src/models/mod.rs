//! Data models for collections and items
//!
//! These are read-only snapshots produced by the secret store. The store
//! stays authoritative: lock state and item lists are re-fetched rather than
//! cached for long.

mod collection;
mod item;
mod path;

pub use collection::CollectionEntry;
pub use item::{
    folder_for_attributes, Attributes, ItemEntry, ItemSnapshot, ItemSummary, SecretType,
    FALLBACK_FOLDER, QT_KEYCHAIN_SCHEMA, SCHEMA_ATTRIBUTE, TYPE_ATTRIBUTE,
};
pub use path::ObjectPath;
