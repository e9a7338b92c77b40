//! Diagnostic service facade.
//!
//! A `DiagnosticService` is an explicit instance: construct it once, pass it
//! (or its [`ServiceHandle`]) to whoever needs it. There is no global state.
//!
//! Producers report through the ordered notification queue; consumers query
//! the store directly through the query engine.

mod config;
mod handle;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use crate::cancel::CancellationToken;
use crate::diagnostic::Diagnostic;
use crate::error::{DiagResult, ExecutionError, ValidationError};
use crate::event::{Bucket, UpdateEvent};
use crate::ids::{ProducerId, SubscriptionId};
use crate::notify::activation::ActivationTracker;
use crate::notify::queue::{NotificationQueue, QueueCounters};
use crate::notify::{
    ListenerActivation, NoopActivation, NotificationStream, ReportHandle, SubscriptionRegistry,
};
use crate::producer::{Producer, ProducerSet};
use crate::query::{DiagnosticQuery, Scope};
use crate::storage::{DiagnosticStore, InMemoryDiagnosticStore};

pub use config::DiagnosticServiceConfig;
pub use handle::ServiceHandle;

/// Point-in-time service counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ServiceStats {
    /// Registered producers.
    pub producers: usize,
    /// Stored records.
    pub records: usize,
    /// Update/removal events that changed the store.
    pub events_applied: u64,
    /// Events dropped because they changed nothing.
    pub events_ignored: u64,
    /// Batches handed to subscribers.
    pub batches_delivered: u64,
    /// Subscriber or activation panics caught by the worker.
    pub subscriber_panics: u64,
}

/// Builder for [`DiagnosticService`].
pub struct DiagnosticServiceBuilder {
    config: DiagnosticServiceConfig,
    store: Option<Arc<dyn DiagnosticStore>>,
    activation: Arc<dyn ListenerActivation>,
}

impl Default for DiagnosticServiceBuilder {
    fn default() -> Self {
        Self {
            config: DiagnosticServiceConfig::default(),
            store: None,
            activation: Arc::new(NoopActivation),
        }
    }
}

impl DiagnosticServiceBuilder {
    /// Sets the configuration.
    #[must_use]
    pub fn config(mut self, config: DiagnosticServiceConfig) -> Self {
        self.config = config;
        self
    }

    /// Uses a custom store backend. Defaults to [`InMemoryDiagnosticStore`].
    #[must_use]
    pub fn store(mut self, store: Arc<dyn DiagnosticStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the per-workspace listener activation hook.
    #[must_use]
    pub fn activation(mut self, activation: impl ListenerActivation + 'static) -> Self {
        self.activation = Arc::new(activation);
        self
    }

    /// Validates the configuration and starts the notification worker.
    pub fn build(self) -> DiagResult<DiagnosticService> {
        self.config.validate()?;

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryDiagnosticStore::new()));
        let handle = ServiceHandle::new(
            store,
            Arc::new(ProducerSet::new()),
            Arc::new(SubscriptionRegistry::new()),
        );
        let counters = Arc::new(QueueCounters::default());

        let queue = NotificationQueue::start(
            &self.config.worker_thread_name,
            handle.clone(),
            ActivationTracker::new(self.activation),
            self.config.fan_out_policy(),
            Arc::clone(&counters),
        )?;

        Ok(DiagnosticService {
            handle,
            queue,
            counters,
            config: self.config,
        })
    }
}

/// Diagnostic aggregation and notification service.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use diaghub::{
///     CancellationToken, Diagnostic, DiagnosticQuery, DiagnosticService, Producer, UpdateEvent,
///     WorkspaceId,
/// };
///
/// let service = DiagnosticService::builder().build()?;
/// let compiler = Producer::push("compiler");
/// service.register_producer(compiler.clone())?;
///
/// let workspace = WorkspaceId::new();
/// let event = UpdateEvent::new(workspace, "syntax", vec![Diagnostic::error("expected `;`")]);
/// service
///     .report_update(compiler.id(), vec![event])?
///     .wait_timeout(Duration::from_secs(1))?;
///
/// let query = DiagnosticQuery::new(workspace).id("syntax");
/// let found = service.get_diagnostics(&query, &CancellationToken::new())?;
/// assert_eq!(found.len(), 1);
/// # Ok::<(), diaghub::DiagError>(())
/// ```
pub struct DiagnosticService {
    handle: ServiceHandle,
    queue: NotificationQueue,
    counters: Arc<QueueCounters>,
    config: DiagnosticServiceConfig,
}

impl DiagnosticService {
    /// Starts a service with the given configuration and no activation hook.
    pub fn new(config: DiagnosticServiceConfig) -> DiagResult<Self> {
        Self::builder().config(config).build()
    }

    /// Returns a builder.
    #[must_use]
    pub fn builder() -> DiagnosticServiceBuilder {
        DiagnosticServiceBuilder::default()
    }

    /// Query/subscribe view of this service.
    #[must_use]
    pub const fn handle(&self) -> &ServiceHandle {
        &self.handle
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &DiagnosticServiceConfig {
        &self.config
    }

    /// Adds a producer to the producer set.
    pub fn register_producer(&self, producer: Producer) -> DiagResult<()> {
        let name = producer.name().to_string();
        let pull = producer.is_pull();
        self.handle.producer_set().insert(producer)?;
        debug!(producer = %name, pull, "registered producer");
        Ok(())
    }

    /// Removes a producer and queues removal of all of its records.
    ///
    /// Subscribers see one removal batch for the producer's records, ordered
    /// after every report submitted before this call.
    pub fn unregister_producer(&self, producer: ProducerId) -> DiagResult<ReportHandle> {
        let removed = self
            .handle
            .producer_set()
            .remove(producer)
            .ok_or(ValidationError::UnknownProducer { producer })?;
        debug!(producer = %removed.name(), "unregistered producer");
        self.queue.submit_clear(removed)
    }

    /// Queues a batch of update events from `producer`.
    ///
    /// Never blocks on delivery. Events that change nothing are dropped; if
    /// none remain, no notification is sent.
    pub fn report_update(
        &self,
        producer: ProducerId,
        events: Vec<UpdateEvent>,
    ) -> DiagResult<ReportHandle> {
        let producer = self.registered(producer)?;
        debug_assert!(
            events
                .iter()
                .flat_map(|event| event.diagnostics.iter())
                .all(|d| d.debug_validate().is_ok()),
            "producer '{}' reported a malformed diagnostic",
            producer.name()
        );
        self.queue.submit_update(producer, events)
    }

    /// Queues removal of every record of `producer`.
    pub fn report_clear(&self, producer: ProducerId) -> DiagResult<ReportHandle> {
        let producer = self.registered(producer)?;
        self.queue.submit_clear(producer)
    }

    /// Blocks until everything submitted so far has been applied and delivered.
    ///
    /// Fails with `WorkerReentry` when called from a subscriber or activation
    /// hook, which run on the worker.
    pub fn flush(&self) -> DiagResult<()> {
        self.ensure_off_worker("flush")?;
        self.queue.submit_barrier()?.wait().map(|_| ())
    }

    /// Like [`flush`](Self::flush) with a timeout.
    pub fn flush_timeout(&self, timeout: Duration) -> DiagResult<()> {
        self.ensure_off_worker("flush_timeout")?;
        self.queue.submit_barrier()?.wait_timeout(timeout).map(|_| ())
    }

    /// Current diagnostics for `query`.
    pub fn get_diagnostics(
        &self,
        query: &DiagnosticQuery,
        cancel: &CancellationToken,
    ) -> DiagResult<Vec<Diagnostic>> {
        self.handle.get_diagnostics(query, cancel)
    }

    /// Stored batch identities inside `scope`.
    pub fn get_diagnostic_buckets(
        &self,
        scope: &Scope,
        cancel: &CancellationToken,
    ) -> DiagResult<Vec<Bucket>> {
        self.handle.get_diagnostic_buckets(scope, cancel)
    }

    /// Registers a notification handler.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&Producer, &[UpdateEvent]) + Send + Sync + 'static,
    {
        self.handle.subscribe(callback)
    }

    /// Subscribes a channel; see [`NotificationStream`].
    #[must_use]
    pub fn subscribe_stream(&self) -> NotificationStream {
        self.handle.subscribe_stream()
    }

    /// Removes a notification handler.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.handle.unsubscribe(id)
    }

    /// Snapshot of service counters.
    #[must_use]
    pub fn stats(&self) -> ServiceStats {
        ServiceStats {
            producers: self.handle.producer_set().len(),
            records: self.handle.store().len(),
            events_applied: self.counters.events_applied.load(Ordering::Relaxed),
            events_ignored: self.counters.events_ignored.load(Ordering::Relaxed),
            batches_delivered: self.counters.batches_delivered.load(Ordering::Relaxed),
            subscriber_panics: self.counters.subscriber_panics.load(Ordering::Relaxed),
        }
    }

    fn ensure_off_worker(&self, operation: &str) -> DiagResult<()> {
        if self.queue.on_worker_thread() {
            return Err(ExecutionError::WorkerReentry {
                operation: operation.to_string(),
            }
            .into());
        }
        Ok(())
    }

    fn registered(&self, producer: ProducerId) -> DiagResult<Producer> {
        self.handle
            .producer_set()
            .get(producer)
            .ok_or_else(|| ValidationError::UnknownProducer { producer }.into())
    }
}
