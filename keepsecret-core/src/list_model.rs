//! Observable ordered sequence
//!
//! A [`ListModel`] holds the entries a view displays. Contents are only ever
//! replaced wholesale, and each replacement emits a [`ListEvent::Reset`].
//! Indices are stable between two resets.

use std::slice;

use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 64;

/// Change notification emitted by a [`ListModel`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListEvent {
    /// The contents were replaced; `len` is the new length
    Reset {
        /// Number of entries after the reset
        len: usize,
    },
}

/// Ordered entries with reset notifications
#[derive(Debug)]
pub struct ListModel<T> {
    entries: Vec<T>,
    events: broadcast::Sender<ListEvent>,
}

impl<T> ListModel<T> {
    /// Creates an empty model
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            entries: Vec::new(),
            events,
        }
    }

    /// Subscribes to reset notifications
    pub fn subscribe(&self) -> broadcast::Receiver<ListEvent> {
        self.events.subscribe()
    }

    /// Replaces every entry
    pub fn reset(&mut self, entries: Vec<T>) {
        self.entries = entries;
        let _ = self.events.send(ListEvent::Reset {
            len: self.entries.len(),
        });
    }

    /// Removes every entry; silent if already empty
    pub fn clear(&mut self) {
        if !self.entries.is_empty() {
            self.reset(Vec::new());
        }
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry at `index`
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&T> {
        self.entries.get(index)
    }

    /// Iterates over the entries in order
    pub fn iter(&self) -> slice::Iter<'_, T> {
        self.entries.iter()
    }

    /// The entries as a slice
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.entries
    }

    /// Index of the first entry matching `predicate`
    pub fn position(&self, predicate: impl FnMut(&T) -> bool) -> Option<usize> {
        self.entries.iter().position(predicate)
    }
}

impl<T> Default for ListModel<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, T> IntoIterator for &'a ListModel<T> {
    type Item = &'a T;
    type IntoIter = slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
