//! Item controller integration tests

use chrono::{Duration, Utc};
use keepsecret_core::{
    ErrorKind, ItemController, ObjectPath, Operations, SecretType, Status, StoreError, StoreOp,
};

use super::fixtures::{attrs, qt_attrs, Fixture};

#[tokio::test]
async fn test_load_populates_fields() {
    let fx = Fixture::new();
    let session = fx.connected().await;
    let mut item = ItemController::new(fx.tracker.clone());

    item.load_item(&session, fx.login.clone(), fx.mail.clone())
        .await;

    assert!(item.is_valid());
    assert_eq!(item.label(), "Mail password");
    assert_eq!(item.secret_value(), b"hunter2");
    assert_eq!(item.secret_type(), SecretType::PlainText);
    assert_eq!(item.item_name(), Some("alice"));
    assert_eq!(item.folder(), "imap.example.org");
    assert!(item.creation_time().is_some());
    assert!(fx.tracker.status().contains(Status::ITEM_READY));
    assert!(!fx.tracker.is_busy(Operations::ITEM_LOADING));
}

#[tokio::test]
async fn test_load_while_disconnected_leaves_defaults() {
    let fx = Fixture::new();
    let session = fx.session();
    let mut item = ItemController::new(fx.tracker.clone());

    item.load_item(&session, fx.login.clone(), fx.mail.clone())
        .await;

    assert!(!item.is_valid());
    assert!(item.label().is_empty());
    assert!(item.secret_value().is_empty());
    assert_eq!(item.item_path(), &fx.mail);
    assert_eq!(fx.tracker.error(), ErrorKind::NoError);
    assert_eq!(fx.store.call_count(StoreOp::GetItem), 0);
}

#[tokio::test]
async fn test_locked_item_is_unlocked_before_secret() {
    let fx = Fixture::new();
    fx.store.set_item_locked(&fx.mail, true);
    let session = fx.connected().await;
    let mut item = ItemController::new(fx.tracker.clone());

    item.load_item(&session, fx.login.clone(), fx.mail.clone())
        .await;

    assert_eq!(fx.store.call_count(StoreOp::UnlockItem), 1);
    assert!(!item.is_locked());
    assert_eq!(item.secret_value(), b"hunter2");
    let status = fx.tracker.status();
    assert!(status.contains(Status::ITEM_READY));
    assert!(!status.contains(Status::ITEM_LOCKED));
    assert!(fx.tracker.operations().is_empty());
}

#[tokio::test]
async fn test_unlock_failure_is_not_retried() {
    let fx = Fixture::new();
    fx.store.set_item_locked(&fx.mail, true);
    let session = fx.connected().await;
    let mut item = ItemController::new(fx.tracker.clone());

    fx.store
        .fail_next(StoreOp::UnlockItem, StoreError::PromptDismissed);
    item.load_item(&session, fx.login.clone(), fx.mail.clone())
        .await;

    assert_eq!(fx.tracker.error(), ErrorKind::ItemUnlockError);
    assert_eq!(fx.store.call_count(StoreOp::UnlockItem), 1);
    assert_eq!(fx.store.call_count(StoreOp::GetSecret), 0);
    assert!(item.is_locked());
    assert!(fx.tracker.status().contains(Status::ITEM_LOCKED));
    assert!(!fx.tracker.status().contains(Status::ITEM_READY));
    assert!(fx.tracker.operations().is_empty());

    item.unlock(&session).await;
    assert_eq!(item.secret_value(), b"hunter2");
    assert!(fx.tracker.status().contains(Status::ITEM_READY));
}

#[tokio::test]
async fn test_load_failure_records_error() {
    let fx = Fixture::new();
    let session = fx.connected().await;
    let mut item = ItemController::new(fx.tracker.clone());
    let missing = ObjectPath::new(format!("{}/999", fx.login));

    item.load_item(&session, fx.login.clone(), missing).await;

    assert!(!item.is_valid());
    assert_eq!(fx.tracker.error(), ErrorKind::ItemLoadError);
    assert!(fx.tracker.operations().is_empty());
}

#[tokio::test]
async fn test_secret_failure_records_error() {
    let fx = Fixture::new();
    let session = fx.connected().await;
    let mut item = ItemController::new(fx.tracker.clone());

    fx.store.fail_next(
        StoreOp::GetSecret,
        StoreError::Transport("no reply".to_string()),
    );
    item.load_item(&session, fx.login.clone(), fx.mail.clone())
        .await;

    assert_eq!(fx.tracker.error(), ErrorKind::ItemLoadSecretError);
    assert!(!fx.tracker.status().contains(Status::ITEM_READY));
    assert_eq!(item.label(), "Mail password");
}

#[tokio::test]
async fn test_save_after_secret_failure_keeps_stored_secret() {
    let fx = Fixture::new();
    let session = fx.connected().await;
    let mut item = ItemController::new(fx.tracker.clone());

    fx.store.fail_next(
        StoreOp::GetSecret,
        StoreError::Transport("no reply".to_string()),
    );
    item.load_item(&session, fx.login.clone(), fx.mail.clone())
        .await;
    item.save(&session).await;

    assert_eq!(fx.store.item_secret(&fx.mail).as_deref(), Some(&b"hunter2"[..]));
    assert_eq!(fx.store.call_count(StoreOp::SetSecret), 0);
    assert_eq!(fx.store.call_count(StoreOp::SetLabel), 0);
    assert!(fx.tracker.operations().is_empty());
}

#[tokio::test]
async fn test_save_after_load_failure_keeps_stored_label() {
    let fx = Fixture::new();
    let session = fx.connected().await;
    let mut item = ItemController::new(fx.tracker.clone());

    fx.store.fail_next(
        StoreOp::GetItem,
        StoreError::Transport("no reply".to_string()),
    );
    item.load_item(&session, fx.login.clone(), fx.web.clone())
        .await;
    item.save(&session).await;

    assert_eq!(fx.store.item_label(&fx.web).as_deref(), Some("Web login"));
    assert_eq!(fx.store.call_count(StoreOp::SetLabel), 0);
}

#[tokio::test]
async fn test_load_mutate_save() {
    let fx = Fixture::new();
    let session = fx.connected().await;
    let earlier = Utc::now() - Duration::hours(1);
    fx.store.set_item_modified(&fx.mail, earlier);
    let mut item = ItemController::new(fx.tracker.clone());
    item.load_item(&session, fx.login.clone(), fx.mail.clone())
        .await;
    assert_eq!(item.modification_time(), Some(earlier));

    item.set_label("new");
    assert!(fx.tracker.status().contains(Status::ITEM_NEEDS_SAVE));

    item.save(&session).await;

    let status = fx.tracker.status();
    assert!(!status.contains(Status::ITEM_NEEDS_SAVE));
    assert!(status.contains(Status::ITEM_READY));
    assert!(item.modification_time().unwrap() > earlier);
    assert_eq!(fx.store.item_label(&fx.mail).as_deref(), Some("new"));
    assert_eq!(fx.store.call_count(StoreOp::SetLabel), 1);
    assert_eq!(fx.store.call_count(StoreOp::SetAttributes), 1);
    assert_eq!(fx.store.call_count(StoreOp::SetSecret), 1);
    assert!(fx.tracker.operations().is_empty());
}

#[tokio::test]
async fn test_partial_save_keeps_local_label() {
    let fx = Fixture::new();
    let session = fx.connected().await;
    let mut item = ItemController::new(fx.tracker.clone());
    item.load_item(&session, fx.login.clone(), fx.mail.clone())
        .await;
    let before = item.modification_time();

    item.set_label("renamed");
    item.set_attribute("server", "smtp.example.org");
    fx.store.fail_next(
        StoreOp::SetAttributes,
        StoreError::Transport("attribute write refused".to_string()),
    );
    item.save(&session).await;

    // No rollback: the label write went through and the local value stays
    assert_eq!(fx.tracker.error(), ErrorKind::ItemSaveError);
    assert_eq!(fx.tracker.error_message(), "attribute write refused");
    assert_eq!(item.label(), "renamed");
    assert_eq!(fx.store.item_label(&fx.mail).as_deref(), Some("renamed"));
    assert_eq!(
        fx.store.item_attributes(&fx.mail).unwrap().get("server").map(String::as_str),
        Some("imap.example.org")
    );
    assert_eq!(item.modification_time(), before);
    assert!(!fx.tracker.status().contains(Status::ITEM_NEEDS_SAVE));
    assert!(fx.tracker.operations().is_empty());
}

#[tokio::test]
async fn test_foreign_schema_saves_label_only() {
    let fx = Fixture::new();
    let session = fx.connected().await;
    let mut item = ItemController::new(fx.tracker.clone());
    item.load_item(&session, fx.login.clone(), fx.web.clone())
        .await;

    item.set_label("Web");
    item.set_secret_value(b"changed");
    item.save(&session).await;

    assert_eq!(fx.store.call_count(StoreOp::SetLabel), 1);
    assert_eq!(fx.store.call_count(StoreOp::SetAttributes), 0);
    assert_eq!(fx.store.call_count(StoreOp::SetSecret), 0);
    assert_eq!(fx.store.item_secret(&fx.web), Some(b"correct horse".to_vec()));
    assert_eq!(item.item_name(), None);
}

#[tokio::test]
async fn test_binary_secret_is_not_saved() {
    let fx = Fixture::new();
    let blob = fx
        .store
        .add_item(&fx.login, "Blob", qt_attrs("bob", "files.example.org", "binary"), &[0, 1, 2])
        .unwrap();
    let session = fx.connected().await;
    let mut item = ItemController::new(fx.tracker.clone());
    item.load_item(&session, fx.login.clone(), blob.clone())
        .await;
    assert_eq!(item.secret_value(), &[0, 1, 2]);

    item.set_secret_value(&[9, 9]);
    item.set_label("Blob v2");
    item.save(&session).await;

    assert_eq!(fx.store.call_count(StoreOp::SetSecret), 0);
    assert_eq!(fx.store.call_count(StoreOp::SetAttributes), 1);
    assert_eq!(fx.store.item_secret(&blob), Some(vec![0, 1, 2]));
    assert_eq!(fx.store.item_label(&blob).as_deref(), Some("Blob v2"));
}

#[tokio::test]
async fn test_base64_secret_round_trip() {
    let fx = Fixture::new();
    let key = fx
        .store
        .add_item(&fx.login, "Key", qt_attrs("carol", "vpn.example.org", "base64"), b"aGVsbG8=")
        .unwrap();
    let session = fx.connected().await;
    let mut item = ItemController::new(fx.tracker.clone());
    item.load_item(&session, fx.login.clone(), key.clone())
        .await;
    assert_eq!(item.secret_value(), b"hello");

    item.set_secret_value(b"world");
    item.save(&session).await;

    assert_eq!(fx.store.item_secret(&key), Some(b"d29ybGQ=".to_vec()));
}

#[tokio::test]
async fn test_unchanged_edit_does_not_mark_dirty() {
    let fx = Fixture::new();
    let session = fx.connected().await;
    let mut item = ItemController::new(fx.tracker.clone());
    item.load_item(&session, fx.login.clone(), fx.mail.clone())
        .await;

    item.set_label("Mail password");
    item.set_secret_value(b"hunter2");
    item.set_attribute("user", "alice");

    assert!(!fx.tracker.status().contains(Status::ITEM_NEEDS_SAVE));
}

#[tokio::test]
async fn test_delete_closes_item() {
    let fx = Fixture::new();
    let session = fx.connected().await;
    let mut item = ItemController::new(fx.tracker.clone());
    item.load_item(&session, fx.login.clone(), fx.mail.clone())
        .await;

    item.delete_item(&session).await;

    assert!(!item.is_valid());
    assert!(item.item_path().is_empty());
    assert!(item.label().is_empty());
    assert!(fx.store.item_label(&fx.mail).is_none());
    assert!(!fx.tracker.status().contains(Status::ITEM_READY));
    assert!(!fx.tracker.is_busy(Operations::ITEM_DELETING));
}

#[tokio::test]
async fn test_delete_failure_still_closes() {
    let fx = Fixture::new();
    let session = fx.connected().await;
    let mut item = ItemController::new(fx.tracker.clone());
    item.load_item(&session, fx.login.clone(), fx.mail.clone())
        .await;

    fx.store
        .fail_next(StoreOp::DeleteItem, StoreError::PromptDismissed);
    item.delete_item(&session).await;

    assert!(item.item_path().is_empty());
    assert_eq!(fx.tracker.error(), ErrorKind::ItemDeleteError);
    assert!(fx.store.item_label(&fx.mail).is_some());
}

#[tokio::test]
async fn test_delete_refused_after_load_failure() {
    let fx = Fixture::new();
    let session = fx.connected().await;
    let mut item = ItemController::new(fx.tracker.clone());

    fx.store.fail_next(
        StoreOp::GetItem,
        StoreError::Transport("no reply".to_string()),
    );
    item.load_item(&session, fx.login.clone(), fx.mail.clone())
        .await;
    item.delete_item(&session).await;

    assert_eq!(fx.store.call_count(StoreOp::DeleteItem), 0);
    assert!(fx.store.item_label(&fx.mail).is_some());
    assert_eq!(fx.tracker.error(), ErrorKind::ItemLoadError);
}

#[tokio::test]
async fn test_delete_refused_while_disconnected() {
    let fx = Fixture::new();
    let session = fx.session();
    let mut item = ItemController::new(fx.tracker.clone());
    item.load_item(&session, fx.login.clone(), fx.mail.clone())
        .await;

    item.delete_item(&session).await;

    assert_eq!(fx.store.call_count(StoreOp::DeleteItem), 0);
    assert_eq!(item.item_path(), &fx.mail);
}

#[tokio::test]
async fn test_create_item_uses_qt_keychain_schema() {
    let fx = Fixture::new();
    let session = fx.connected().await;
    let mut item = ItemController::new(fx.tracker.clone());

    let created = item
        .create_item(&session, "Chat", b"s3cret", "dave", "chat.example.org", &fx.login)
        .await
        .unwrap();

    assert_eq!(
        fx.store.item_attributes(&created),
        Some(attrs(&[
            ("server", "chat.example.org"),
            ("type", "plaintext"),
            ("user", "dave"),
            ("xdg:schema", "org.qt.keychain"),
        ]))
    );
    assert_eq!(fx.store.item_secret(&created), Some(b"s3cret".to_vec()));

    // Same attributes replace the existing item
    let again = item
        .create_item(&session, "Chat", b"other", "dave", "chat.example.org", &fx.login)
        .await
        .unwrap();
    assert_eq!(again, created);
    assert_eq!(fx.store.item_secret(&created), Some(b"other".to_vec()));
}

#[tokio::test]
async fn test_create_item_failure_records_error() {
    let fx = Fixture::new();
    fx.store.set_collection_locked_externally(&fx.login, true);
    let session = fx.connected().await;
    let mut item = ItemController::new(fx.tracker.clone());

    let created = item
        .create_item(&session, "Chat", b"s3cret", "dave", "chat.example.org", &fx.login)
        .await;

    assert!(created.is_none());
    assert_eq!(fx.tracker.error(), ErrorKind::ItemCreationError);
    assert!(!fx.tracker.is_busy(Operations::ITEM_CREATING));
}

#[tokio::test]
async fn test_connectivity_loss_resets_and_return_reloads() {
    let fx = Fixture::new();
    let mut session = fx.connected().await;
    let mut item = ItemController::new(fx.tracker.clone());
    item.load_item(&session, fx.login.clone(), fx.mail.clone())
        .await;

    fx.store.set_available(false);
    session.handle_owner_changed(None).await;
    item.handle_connectivity(&session).await;

    assert!(!item.is_valid());
    assert!(item.label().is_empty());
    assert!(item.secret_value().is_empty());
    assert!(!fx.tracker.status().contains(Status::ITEM_READY));

    fx.store.set_available(true);
    session.handle_owner_changed(Some(":1.7")).await;
    item.handle_connectivity(&session).await;

    assert!(item.is_valid());
    assert_eq!(item.label(), "Mail password");
    assert_eq!(item.secret_value(), b"hunter2");
}
