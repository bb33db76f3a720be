//! Shared setup for the integration tests

use std::sync::Arc;

use keepsecret_core::models::{QT_KEYCHAIN_SCHEMA, SCHEMA_ATTRIBUTE};
use keepsecret_core::{Attributes, ConnectionSession, MemoryStore, ObjectPath, OperationTracker};

/// Builds an attribute map from pairs
pub fn attrs(pairs: &[(&str, &str)]) -> Attributes {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

/// Attributes of a QtKeychain item
pub fn qt_attrs(user: &str, server: &str, ty: &str) -> Attributes {
    attrs(&[
        ("user", user),
        ("server", server),
        ("type", ty),
        (SCHEMA_ATTRIBUTE, QT_KEYCHAIN_SCHEMA),
    ])
}

/// A store with an unlocked "Login" collection holding two items
pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub tracker: Arc<OperationTracker>,
    pub login: ObjectPath,
    pub mail: ObjectPath,
    pub web: ObjectPath,
}

impl Fixture {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let login = store.add_collection("Login", false);
        let mail = store
            .add_item(
                &login,
                "Mail password",
                qt_attrs("alice", "imap.example.org", "plaintext"),
                b"hunter2",
            )
            .unwrap();
        let web = store
            .add_item(
                &login,
                "Web login",
                attrs(&[("service", "example.org"), ("username", "alice")]),
                b"correct horse",
            )
            .unwrap();
        Self {
            store,
            tracker: Arc::new(OperationTracker::new()),
            login,
            mail,
            web,
        }
    }

    /// A new session on this fixture's store, not yet connected
    pub fn session(&self) -> ConnectionSession {
        ConnectionSession::new(self.store.clone(), self.tracker.clone())
    }

    /// A connected session on this fixture's store
    pub async fn connected(&self) -> ConnectionSession {
        let mut session = self.session();
        session.connect().await;
        assert!(session.is_connected());
        session
    }
}
