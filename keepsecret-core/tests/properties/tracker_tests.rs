//! Property-based tests for the operation tracker
//!
//! Flag set/clear is idempotent and notifies only on change, composite
//! operations are the OR of their parts, and the dirty flag follows saves.

use keepsecret_core::{ErrorKind, OperationTracker, Operations, Status, TrackerEvent};
use proptest::prelude::*;
use tokio::sync::broadcast;

fn drain(rx: &mut broadcast::Receiver<TrackerEvent>) -> Vec<TrackerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

// Strategy for a single operation flag
fn arb_operation() -> impl Strategy<Value = Operations> {
    (1u32..=18).prop_map(|bit| Operations::from_bits_truncate(1 << bit))
}

// Strategy for a single status flag
fn arb_status_flag() -> impl Strategy<Value = Status> {
    (1u32..=6).prop_map(|bit| Status::from_bits_truncate(1 << bit))
}

// Strategy for a part of a composite operation
fn arb_part() -> impl Strategy<Value = Operations> {
    prop_oneof![
        Just(Operations::ITEM_SAVING_LABEL),
        Just(Operations::ITEM_SAVING_SECRET),
        Just(Operations::ITEM_SAVING_ATTRIBUTES),
        Just(Operations::ITEM_LOADING_SECRET),
        Just(Operations::ITEM_UNLOCKING),
    ]
}

fn arb_error_kind() -> impl Strategy<Value = ErrorKind> {
    prop_oneof![
        Just(ErrorKind::NoError),
        Just(ErrorKind::ServiceConnectionError),
        Just(ErrorKind::ServiceLoadCollectionsError),
        Just(ErrorKind::ItemLoadError),
        Just(ErrorKind::ItemSaveError),
        Just(ErrorKind::CollectionLoadError),
        Just(ErrorKind::CollectionLockError),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Setting an operation twice emits exactly one notification
    #[test]
    fn set_operation_twice_notifies_once(op in arb_operation()) {
        let tracker = OperationTracker::new();
        let mut rx = tracker.subscribe();

        tracker.set_operation(op);
        tracker.set_operation(op);

        let changes = drain(&mut rx)
            .into_iter()
            .filter(|e| matches!(e, TrackerEvent::OperationsChanged(_)))
            .count();
        prop_assert_eq!(changes, 1);
    }

    /// Clearing an operation that is not set emits nothing
    #[test]
    fn clear_missing_operation_is_silent(op in arb_operation()) {
        let tracker = OperationTracker::new();
        let mut rx = tracker.subscribe();

        tracker.clear_operation(op);

        prop_assert!(drain(&mut rx).is_empty());
    }

    /// Status flags follow the same idempotent discipline
    #[test]
    fn status_changes_notify_only_on_change(
        steps in prop::collection::vec((any::<bool>(), arb_status_flag()), 0..40)
    ) {
        let tracker = OperationTracker::new();
        let mut rx = tracker.subscribe();
        let mut expected_changes = 0;

        for (set, flag) in steps {
            let before = tracker.status();
            if set {
                tracker.set_state(flag);
            } else {
                tracker.clear_state(flag);
            }
            if tracker.status() != before {
                expected_changes += 1;
            }
        }

        let changes = drain(&mut rx)
            .into_iter()
            .filter(|e| matches!(e, TrackerEvent::StatusChanged(_)))
            .count();
        prop_assert_eq!(changes, expected_changes);
    }

    /// A composite is visible exactly while one of its parts is in flight
    #[test]
    fn composites_are_or_of_parts(
        steps in prop::collection::vec((any::<bool>(), arb_part()), 0..40)
    ) {
        let tracker = OperationTracker::new();
        let mut requested = Operations::empty();

        for (set, part) in steps {
            if set {
                tracker.set_operation(part);
                requested.insert(part);
            } else {
                tracker.clear_operation(part);
                requested.remove(part);
            }

            let operations = tracker.operations();
            prop_assert_eq!(
                operations.contains(Operations::ITEM_SAVING),
                requested.intersects(Operations::ITEM_SAVE_PARTS)
            );
            prop_assert_eq!(
                operations.contains(Operations::ITEM_LOADING),
                requested.intersects(Operations::ITEM_LOAD_PARTS)
            );
        }
    }

    /// Once every save part is cleared the item no longer needs saving
    #[test]
    fn finished_save_clears_needs_save(
        parts in prop::collection::vec(
            prop_oneof![
                Just(Operations::ITEM_SAVING_LABEL),
                Just(Operations::ITEM_SAVING_SECRET),
                Just(Operations::ITEM_SAVING_ATTRIBUTES),
            ],
            1..6,
        )
    ) {
        let tracker = OperationTracker::new();
        tracker.set_state(Status::ITEM_READY | Status::ITEM_NEEDS_SAVE);

        for part in &parts {
            tracker.set_operation(*part);
        }
        for part in &parts {
            tracker.clear_operation(*part);
        }

        prop_assert!(!tracker.status().contains(Status::ITEM_NEEDS_SAVE));
        prop_assert!(tracker.status().contains(Status::ITEM_READY));
    }

    /// Only the most recent error is observable
    #[test]
    fn last_error_wins(
        first in arb_error_kind(),
        first_message in "[a-z ]{0,20}",
        second in arb_error_kind(),
        second_message in "[a-z ]{0,20}",
    ) {
        let tracker = OperationTracker::new();

        tracker.set_error(first, first_message);
        tracker.set_error(second, second_message.clone());

        prop_assert_eq!(tracker.error(), second);
        prop_assert_eq!(tracker.error_message(), second_message);
    }

    /// The item can never be dirty without being ready
    #[test]
    fn needs_save_implies_ready(
        steps in prop::collection::vec((any::<bool>(), arb_status_flag()), 0..40)
    ) {
        let tracker = OperationTracker::new();
        for (set, flag) in steps {
            if set {
                tracker.set_state(flag);
            } else {
                tracker.clear_state(flag);
            }
            let status = tracker.status();
            prop_assert!(
                !status.contains(Status::ITEM_NEEDS_SAVE) || status.contains(Status::ITEM_READY)
            );
        }
    }
}
