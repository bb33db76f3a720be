//! Status and operation flag sets
//!
//! Both sets are small copyable bitsets. `Operations` has two composite
//! members, `ITEM_LOADING` and `ITEM_SAVING`, which are never stored as
//! overlapping bit patterns: [`Operations::with_composites`] derives them from
//! their parts every time the tracker recomputes the visible set.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign, Not};

macro_rules! flag_set {
    (
        $(#[$meta:meta])*
        $name:ident {
            $(
                $(#[$flag_meta:meta])*
                $flag:ident = $bit:expr, $label:literal;
            )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
        pub struct $name(u32);

        impl $name {
            $(
                $(#[$flag_meta])*
                pub const $flag: Self = Self(1 << $bit);
            )+

            const NAMED: &'static [(Self, &'static str)] = &[$((Self::$flag, $label)),+];

            /// Returns a set with no flags
            #[must_use]
            pub const fn empty() -> Self {
                Self(0)
            }

            /// Returns a set with every defined flag
            #[must_use]
            pub const fn all() -> Self {
                Self(0 $(| (1 << $bit))+)
            }

            /// Builds a set from raw bits, dropping undefined ones
            #[must_use]
            pub const fn from_bits_truncate(bits: u32) -> Self {
                Self(bits & Self::all().0)
            }

            /// Raw bit representation
            #[must_use]
            pub const fn bits(self) -> u32 {
                self.0
            }

            /// Returns true if no flag is set
            #[must_use]
            pub const fn is_empty(self) -> bool {
                self.0 == 0
            }

            /// Returns true if every flag of `other` is set in `self`
            #[must_use]
            pub const fn contains(self, other: Self) -> bool {
                self.0 & other.0 == other.0
            }

            /// Returns true if any flag of `other` is set in `self`
            #[must_use]
            pub const fn intersects(self, other: Self) -> bool {
                self.0 & other.0 != 0
            }

            /// Sets every flag of `other`
            pub fn insert(&mut self, other: Self) {
                self.0 |= other.0;
            }

            /// Clears every flag of `other`
            pub fn remove(&mut self, other: Self) {
                self.0 &= !other.0;
            }

            /// Returns the flags set in either operand
            #[must_use]
            pub const fn union(self, other: Self) -> Self {
                Self(self.0 | other.0)
            }

            /// Returns `self` without the flags of `other`
            #[must_use]
            pub const fn difference(self, other: Self) -> Self {
                Self(self.0 & !other.0)
            }

            /// Iterates over the names of the set flags
            pub fn names(self) -> impl Iterator<Item = &'static str> {
                Self::NAMED
                    .iter()
                    .filter(move |(flag, _)| self.contains(*flag))
                    .map(|(_, name)| *name)
            }
        }

        impl BitOr for $name {
            type Output = Self;

            fn bitor(self, rhs: Self) -> Self {
                Self(self.0 | rhs.0)
            }
        }

        impl BitOrAssign for $name {
            fn bitor_assign(&mut self, rhs: Self) {
                self.0 |= rhs.0;
            }
        }

        impl BitAnd for $name {
            type Output = Self;

            fn bitand(self, rhs: Self) -> Self {
                Self(self.0 & rhs.0)
            }
        }

        impl Not for $name {
            type Output = Self;

            fn not(self) -> Self {
                Self(!self.0 & Self::all().0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                if self.is_empty() {
                    return f.write_str("None");
                }
                let mut first = true;
                for name in self.names() {
                    if !first {
                        f.write_str(" | ")?;
                    }
                    f.write_str(name)?;
                    first = false;
                }
                Ok(())
            }
        }
    };
}

flag_set! {
    /// Persistent conditions of the service, the current collection and the
    /// loaded item
    ///
    /// The three axes are independent. An empty set means the service is
    /// disconnected and nothing is loaded.
    Status {
        /// A live connection to the Secret Service exists
        SERVICE_CONNECTED = 1, "ServiceConnected";
        /// The loaded item's fields and secret are available
        ITEM_READY = 2, "ItemReady";
        /// The loaded item is locked
        ITEM_LOCKED = 3, "ItemLocked";
        /// The loaded item has local edits not yet saved
        ITEM_NEEDS_SAVE = 4, "ItemNeedsSave";
        /// The current collection's item list is loaded
        COLLECTION_READY = 5, "CollectionReady";
        /// The current collection is locked
        COLLECTION_LOCKED = 6, "CollectionLocked";
    }
}

impl Status {
    /// Drops flag combinations that cannot exist
    ///
    /// An item can only need saving once it has been loaded.
    #[must_use]
    pub fn normalized(self) -> Self {
        if self.contains(Self::ITEM_NEEDS_SAVE) && !self.contains(Self::ITEM_READY) {
            self.difference(Self::ITEM_NEEDS_SAVE)
        } else {
            self
        }
    }
}

flag_set! {
    /// In-flight requests against the secret store
    Operations {
        /// Connecting to the Secret Service
        SERVICE_CONNECTING = 1, "ServiceConnecting";
        /// Reloading the collection list
        SERVICE_LOADING_COLLECTIONS = 2, "ServiceLoadingCollections";
        /// Reading the `default` alias
        SERVICE_READING_DEFAULT_COLLECTION = 3, "ServiceReadingDefaultCollection";
        /// Writing the `default` alias
        SERVICE_WRITING_DEFAULT_COLLECTION = 4, "ServiceWritingDefaultCollection";
        /// Creating an item
        ITEM_CREATING = 5, "ItemCreating";
        /// Loading an item; also asserted while unlocking or loading its secret
        ITEM_LOADING = 6, "ItemLoading";
        /// Loading an item's secret value
        ITEM_LOADING_SECRET = 7, "ItemLoadingSecret";
        /// Unlocking an item before loading its secret
        ITEM_UNLOCKING = 8, "ItemUnlocking";
        /// Saving an item; asserted while any of its save parts is in flight
        ITEM_SAVING = 9, "ItemSaving";
        /// Saving the label of an item
        ITEM_SAVING_LABEL = 10, "ItemSavingLabel";
        /// Saving the secret value of an item
        ITEM_SAVING_SECRET = 11, "ItemSavingSecret";
        /// Saving the attributes of an item
        ITEM_SAVING_ATTRIBUTES = 12, "ItemSavingAttributes";
        /// Deleting an item
        ITEM_DELETING = 13, "ItemDeleting";
        /// Creating a collection
        COLLECTION_CREATING = 14, "CollectionCreating";
        /// Loading the items of the current collection
        COLLECTION_LOADING = 15, "CollectionLoading";
        /// Unlocking a collection
        COLLECTION_UNLOCKING = 16, "CollectionUnlocking";
        /// Locking a collection
        COLLECTION_LOCKING = 17, "CollectionLocking";
        /// Deleting a collection
        COLLECTION_DELETING = 18, "CollectionDeleting";
    }
}

impl Operations {
    /// Parts whose presence asserts [`Operations::ITEM_SAVING`]
    pub const ITEM_SAVE_PARTS: Self = Self(
        Self::ITEM_SAVING_LABEL.0 | Self::ITEM_SAVING_SECRET.0 | Self::ITEM_SAVING_ATTRIBUTES.0,
    );

    /// Parts whose presence asserts [`Operations::ITEM_LOADING`]
    pub const ITEM_LOAD_PARTS: Self =
        Self(Self::ITEM_LOADING_SECRET.0 | Self::ITEM_UNLOCKING.0);

    const COMPOSITES: [(Self, Self); 2] = [
        (Self::ITEM_SAVING, Self::ITEM_SAVE_PARTS),
        (Self::ITEM_LOADING, Self::ITEM_LOAD_PARTS),
    ];

    /// Adds every composite flag that has at least one part in `self`
    ///
    /// Composite flags present in `self` are kept: a composite that was
    /// requested directly stays asserted until it is cleared directly.
    #[must_use]
    pub fn with_composites(self) -> Self {
        Self::COMPOSITES
            .iter()
            .fold(self, |acc, &(composite, parts)| {
                if self.intersects(parts) {
                    acc | composite
                } else {
                    acc
                }
            })
    }
}
