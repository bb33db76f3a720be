//! `KeepSecret` Core Library
//!
//! This crate provides the core of the `KeepSecret` secret manager: the
//! session with the freedesktop Secret Service, the shared operation tracker,
//! and the controllers for collections and items, plus configuration and
//! logging setup.

pub mod collection;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod item;
pub mod list_model;
pub mod logging;
pub mod models;
pub mod session;
pub mod store;
pub mod tracker;

pub use collection::{CollectionController, CollectionEvent};
pub use config::{AppSettings, ConfigManager, LoggingSettings, ServiceSettings, UiState};
pub use dispatcher::{Dispatched, Dispatcher};
pub use error::{
    ConfigError, ConfigResult, KeepSecretError, Result, StoreError, StoreResult,
};
pub use item::{ItemController, ItemEvent};
pub use list_model::{ListEvent, ListModel};
pub use models::{
    folder_for_attributes, Attributes, CollectionEntry, ItemEntry, ItemSnapshot, ItemSummary,
    ObjectPath, SecretType,
};
pub use session::{ConnectionSession, SessionEvent};
pub use store::{ConnectionHandle, MemoryStore, NewItem, SecretStore, StoreEvent, StoreOp};
pub use tracker::{ErrorKind, OperationTracker, Operations, Status, TrackerEvent};
