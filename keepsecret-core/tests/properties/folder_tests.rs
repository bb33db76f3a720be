//! Property-based tests for folder derivation and secret type names

use keepsecret_core::models::FALLBACK_FOLDER;
use keepsecret_core::{folder_for_attributes, Attributes, ItemEntry, ItemSummary, ObjectPath, SecretType};
use proptest::prelude::*;

// Attribute values that are never empty
fn arb_value() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9.-]{1,24}"
}

// Attribute maps without `server` or `service`
fn arb_unrelated_attributes() -> impl Strategy<Value = Attributes> {
    prop::collection::btree_map("[a-z:]{1,10}", "[a-z0-9]{0,10}", 0..6).prop_map(|mut map| {
        map.remove("server");
        map.remove("service");
        map
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// `server` wins over `service`
    #[test]
    fn server_wins(server in arb_value(), service in arb_value(), mut extra in arb_unrelated_attributes()) {
        extra.insert("server".to_string(), server.clone());
        extra.insert("service".to_string(), service);
        prop_assert_eq!(folder_for_attributes(&extra), server);
    }

    /// `service` is used when `server` is absent
    #[test]
    fn service_is_fallback(service in arb_value(), mut extra in arb_unrelated_attributes()) {
        extra.insert("service".to_string(), service.clone());
        prop_assert_eq!(folder_for_attributes(&extra), service);
    }

    /// Neither attribute gives the fixed fallback folder
    #[test]
    fn neither_gives_fallback(extra in arb_unrelated_attributes()) {
        prop_assert_eq!(folder_for_attributes(&extra), FALLBACK_FOLDER);
    }

    /// Listing entries derive their folder with the same rule
    #[test]
    fn entries_use_the_folder_rule(attributes in prop::collection::btree_map(
        prop_oneof![Just("server".to_string()), Just("service".to_string()), "[a-z]{1,8}"],
        "[a-z0-9]{0,8}",
        0..5,
    )) {
        let expected = folder_for_attributes(&attributes);
        let entry = ItemEntry::from(ItemSummary {
            label: "entry".to_string(),
            dbus_path: ObjectPath::new("/org/freedesktop/secrets/collection/login/1"),
            attributes,
        });
        prop_assert_eq!(entry.folder, expected);
    }

    /// Unknown type names read as plain text
    #[test]
    fn unknown_type_is_plaintext(name in "[a-z0-9]{0,12}") {
        prop_assume!(!["plaintext", "base64", "binary", "map"].contains(&name.as_str()));
        prop_assert_eq!(SecretType::from_name(&name), SecretType::PlainText);
    }
}
