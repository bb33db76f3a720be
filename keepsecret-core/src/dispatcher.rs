//! Event dispatcher
//!
//! The [`Dispatcher`] owns the session and both controllers and feeds them
//! store notifications and tracker connectivity changes one at a time. All
//! components therefore run on whichever task drives the dispatcher, and a
//! handler always runs to completion before the next event is looked at.

use std::sync::Arc;

use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::collection::CollectionController;
use crate::config::{AppSettings, ConfigManager};
use crate::item::ItemController;
use crate::session::ConnectionSession;
use crate::store::{SecretStore, StoreEvent};
use crate::tracker::{OperationTracker, TrackerEvent};

/// An event taken from one of the dispatcher's sources
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatched {
    /// Notification from the secret store
    Store(StoreEvent),
    /// Notification from the operation tracker
    Tracker(TrackerEvent),
}

/// Routes store and tracker events to the session and controllers
pub struct Dispatcher {
    session: ConnectionSession,
    collections: CollectionController,
    item: ItemController,
    store_events: broadcast::Receiver<StoreEvent>,
    tracker_events: broadcast::Receiver<TrackerEvent>,
}

impl Dispatcher {
    /// Creates a dispatcher with components that persist nothing
    #[must_use]
    pub fn new(store: Arc<dyn SecretStore>, tracker: Arc<OperationTracker>) -> Self {
        let store_events = store.subscribe();
        let tracker_events = tracker.subscribe();
        Self {
            session: ConnectionSession::new(store, tracker.clone()),
            collections: CollectionController::new(tracker.clone()),
            item: ItemController::new(tracker),
            store_events,
            tracker_events,
        }
    }

    /// Creates a dispatcher configured from settings, persisting the
    /// collection selection through `config`
    #[must_use]
    pub fn with_config(
        store: Arc<dyn SecretStore>,
        tracker: Arc<OperationTracker>,
        settings: &AppSettings,
        config: ConfigManager,
    ) -> Self {
        let store_events = store.subscribe();
        let tracker_events = tracker.subscribe();
        Self {
            session: ConnectionSession::with_settings(store, tracker.clone(), &settings.service),
            collections: CollectionController::with_config(tracker.clone(), config),
            item: ItemController::new(tracker),
            store_events,
            tracker_events,
        }
    }

    #[must_use]
    pub fn session(&self) -> &ConnectionSession {
        &self.session
    }

    #[must_use]
    pub fn collections(&self) -> &CollectionController {
        &self.collections
    }

    #[must_use]
    pub fn item(&self) -> &ItemController {
        &self.item
    }

    /// Mutable access to every component at once
    pub fn parts_mut(
        &mut self,
    ) -> (
        &mut ConnectionSession,
        &mut CollectionController,
        &mut ItemController,
    ) {
        (&mut self.session, &mut self.collections, &mut self.item)
    }

    /// Connects the session
    pub async fn start(&mut self) {
        self.session.connect().await;
    }

    /// Waits for the next event and handles it
    ///
    /// Returns false once a source is closed.
    pub async fn process_next(&mut self) -> bool {
        let received = tokio::select! {
            biased;
            event = self.tracker_events.recv() => event.map(Dispatched::Tracker),
            event = self.store_events.recv() => event.map(Dispatched::Store),
        };
        match received {
            Ok(event) => {
                self.dispatch(event).await;
                true
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Dispatcher lagged behind, resynchronising");
                self.resync().await;
                true
            }
            Err(RecvError::Closed) => false,
        }
    }

    /// Handles every event already queued, returning how many were handled
    ///
    /// Events raised while handling are processed too.
    pub async fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        loop {
            let event = match self.tracker_events.try_recv() {
                Ok(event) => Some(Dispatched::Tracker(event)),
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "Tracker events lagged, resynchronising");
                    self.resync().await;
                    continue;
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => {
                    match self.store_events.try_recv() {
                        Ok(event) => Some(Dispatched::Store(event)),
                        Err(TryRecvError::Lagged(skipped)) => {
                            warn!(skipped, "Store events lagged, resynchronising");
                            self.resync().await;
                            continue;
                        }
                        Err(TryRecvError::Empty | TryRecvError::Closed) => None,
                    }
                }
            };
            let Some(event) = event else {
                return handled;
            };
            self.dispatch(event).await;
            handled += 1;
        }
    }

    /// Handles events until a source is closed
    pub async fn run(&mut self) {
        while self.process_next().await {}
    }

    async fn dispatch(&mut self, event: Dispatched) {
        match event {
            Dispatched::Tracker(TrackerEvent::ServiceConnectedChanged(connected)) => {
                debug!(connected, "Routing connectivity change");
                self.collections
                    .handle_connectivity(&self.session, connected)
                    .await;
                self.item.handle_connectivity(&self.session).await;
            }
            Dispatched::Tracker(_) => {}
            Dispatched::Store(event) => {
                debug!(?event, "Routing store event");
                self.session.handle_store_event(&event).await;
                self.collections
                    .handle_store_event(&self.session, &event)
                    .await;
                self.item.handle_store_event(&event);
            }
        }
    }

    async fn resync(&mut self) {
        let connected = self.session.is_connected();
        self.collections
            .handle_connectivity(&self.session, connected)
            .await;
        self.item.handle_connectivity(&self.session).await;
    }
}
