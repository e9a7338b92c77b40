//! Cloneable read/subscribe view of a service.

use std::sync::Arc;

use crate::cancel::CancellationToken;
use crate::diagnostic::Diagnostic;
use crate::error::DiagResult;
use crate::event::{Bucket, UpdateEvent};
use crate::ids::SubscriptionId;
use crate::notify::{NotificationStream, SubscriptionRegistry};
use crate::producer::{Producer, ProducerSet, ProducerSnapshot};
use crate::query::{DiagnosticQuery, QueryEngine, Scope};
use crate::storage::DiagnosticStore;

/// Query and subscription access to one service instance.
///
/// Handed to listener activation hooks and available from
/// [`DiagnosticService::handle`](crate::DiagnosticService::handle). It cannot
/// report diagnostics and does not keep the notification worker alive.
#[derive(Clone)]
pub struct ServiceHandle {
    store: Arc<dyn DiagnosticStore>,
    producers: Arc<ProducerSet>,
    subscribers: Arc<SubscriptionRegistry>,
    query: QueryEngine,
}

impl ServiceHandle {
    pub(crate) fn new(
        store: Arc<dyn DiagnosticStore>,
        producers: Arc<ProducerSet>,
        subscribers: Arc<SubscriptionRegistry>,
    ) -> Self {
        let query = QueryEngine::new(Arc::clone(&store), Arc::clone(&producers));
        Self {
            store,
            producers,
            subscribers,
            query,
        }
    }

    /// A handle over fresh, empty state with no worker attached.
    #[cfg(test)]
    pub(crate) fn detached() -> Self {
        Self::new(
            Arc::new(crate::storage::InMemoryDiagnosticStore::new()),
            Arc::new(ProducerSet::new()),
            Arc::new(SubscriptionRegistry::new()),
        )
    }

    pub(crate) fn store(&self) -> &Arc<dyn DiagnosticStore> {
        &self.store
    }

    pub(crate) fn producer_set(&self) -> &ProducerSet {
        &self.producers
    }

    pub(crate) fn subscribers(&self) -> &Arc<SubscriptionRegistry> {
        &self.subscribers
    }

    /// Current diagnostics for `query`. See [`QueryEngine::get_diagnostics`].
    pub fn get_diagnostics(
        &self,
        query: &DiagnosticQuery,
        cancel: &CancellationToken,
    ) -> DiagResult<Vec<Diagnostic>> {
        self.query.get_diagnostics(query, cancel)
    }

    /// Stored batch identities inside `scope`.
    pub fn get_diagnostic_buckets(
        &self,
        scope: &Scope,
        cancel: &CancellationToken,
    ) -> DiagResult<Vec<Bucket>> {
        self.query.get_diagnostic_buckets(scope, cancel)
    }

    /// Registers a notification handler.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&Producer, &[UpdateEvent]) + Send + Sync + 'static,
    {
        self.subscribers.subscribe(callback)
    }

    /// Subscribes a channel; see [`NotificationStream`].
    #[must_use]
    pub fn subscribe_stream(&self) -> NotificationStream {
        self.subscribers.subscribe_stream()
    }

    /// Removes a notification handler.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscribers.unsubscribe(id)
    }

    /// Registered producers, in registration order.
    #[must_use]
    pub fn producers(&self) -> ProducerSnapshot {
        self.producers.snapshot()
    }
}
