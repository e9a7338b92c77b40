//! Subscription registry and channel-backed subscriber streams.
//!
//! Handlers are kept in a copy-on-write vector. `raise` snapshots it before
//! invoking anything, so subscribing or unsubscribing during a fan-out only
//! affects later batches.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, TryRecvError};
use tracing::warn;

use crate::error::{DiagResult, ExecutionError};
use crate::event::{DiagnosticsNotification, UpdateEvent};
use crate::ids::SubscriptionId;
use crate::producer::Producer;

/// Subscriber callback: `(producer, batch)`.
///
/// Runs inline on the notification worker. Long work must be handed off.
pub type SubscriberFn = dyn Fn(&Producer, &[UpdateEvent]) + Send + Sync;

#[derive(Clone)]
struct Subscriber {
    id: SubscriptionId,
    callback: Arc<SubscriberFn>,
}

/// How `raise` treats misbehaving subscribers.
#[derive(Debug, Clone, Copy, Default)]
pub struct FanOutPolicy {
    /// Catch and count subscriber panics instead of unwinding.
    pub isolate_panics: bool,
    /// Warn when one subscriber takes longer than this.
    pub slow_threshold: Option<Duration>,
}

/// Thread-safe set of notification handlers.
#[derive(Default)]
pub struct SubscriptionRegistry {
    snap: ArcSwap<Vec<Subscriber>>,
}

impl SubscriptionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler and returns its id.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&Producer, &[UpdateEvent]) + Send + Sync + 'static,
    {
        let id = SubscriptionId::new();
        let entry = Subscriber {
            id,
            callback: Arc::new(callback),
        };
        self.snap.rcu(|cur| {
            let mut next = Vec::with_capacity(cur.len() + 1);
            next.extend(cur.iter().cloned());
            next.push(entry.clone());
            next
        });
        id
    }

    /// Removes a handler. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let prev = self.snap.rcu(|cur| {
            cur.iter()
                .filter(|s| s.id != id)
                .cloned()
                .collect::<Vec<_>>()
        });
        prev.iter().any(|s| s.id == id)
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.snap.load().len()
    }

    /// Returns true if nobody is subscribed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Subscribes a channel and returns its receiving end.
    ///
    /// The stream unsubscribes itself when dropped.
    #[must_use]
    pub fn subscribe_stream(self: &Arc<Self>) -> NotificationStream {
        let (tx, rx) = unbounded::<DiagnosticsNotification>();
        let id = self.subscribe(move |producer, events| {
            // Receiver gone: the stream is being dropped and will unsubscribe.
            let _ = tx.send(DiagnosticsNotification {
                producer: producer.id(),
                producer_name: producer.name_arc(),
                events: events.to_vec(),
            });
        });
        NotificationStream {
            subscription_id: id,
            rx,
            registry: Arc::clone(self),
            unregistered: AtomicBool::new(false),
        }
    }

    /// Invokes every handler registered at the time of the call.
    ///
    /// Returns the number of handlers that panicked; with panic isolation off
    /// a panic propagates to the caller instead.
    pub fn raise(&self, producer: &Producer, events: &[UpdateEvent], policy: FanOutPolicy) -> u64 {
        let snapshot = self.snap.load_full();
        let mut panics = 0;

        for sub in snapshot.iter() {
            let started = Instant::now();
            if policy.isolate_panics {
                let result =
                    panic::catch_unwind(AssertUnwindSafe(|| (sub.callback)(producer, events)));
                if result.is_err() {
                    panics += 1;
                    warn!(
                        subscription = %sub.id,
                        producer = %producer.name(),
                        "subscriber panicked"
                    );
                }
            } else {
                (sub.callback)(producer, events);
            }

            if let Some(threshold) = policy.slow_threshold {
                let elapsed = started.elapsed();
                if elapsed > threshold {
                    warn!(
                        subscription = %sub.id,
                        producer = %producer.name(),
                        elapsed_ms = elapsed.as_millis() as u64,
                        "slow subscriber is delaying notifications"
                    );
                }
            }
        }
        panics
    }
}

/// Channel-backed subscription.
///
/// Dropping the stream unregisters it.
pub struct NotificationStream {
    subscription_id: SubscriptionId,
    rx: Receiver<DiagnosticsNotification>,
    registry: Arc<SubscriptionRegistry>,
    unregistered: AtomicBool,
}

impl NotificationStream {
    /// The subscription id backing this stream.
    #[must_use]
    pub const fn subscription_id(&self) -> SubscriptionId {
        self.subscription_id
    }

    /// Stops delivery. Idempotent.
    pub fn unsubscribe(&self) {
        if self.unregistered.swap(true, Ordering::AcqRel) {
            return;
        }
        self.registry.unsubscribe(self.subscription_id);
    }

    /// Receive the next notification (blocking).
    pub fn recv(&self) -> DiagResult<DiagnosticsNotification> {
        self.rx.recv().map_err(|_| {
            ExecutionError::Disconnected {
                path: "notification_stream".to_string(),
            }
            .into()
        })
    }

    /// Receive the next notification with a timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> DiagResult<DiagnosticsNotification> {
        self.rx.recv_timeout(timeout).map_err(|err| {
            match err {
                RecvTimeoutError::Timeout => ExecutionError::Timeout {
                    duration_ms: timeout.as_millis().min(u128::from(u64::MAX)) as u64,
                },
                RecvTimeoutError::Disconnected => ExecutionError::Disconnected {
                    path: "notification_stream".to_string(),
                },
            }
            .into()
        })
    }

    /// Returns the next notification if one is already queued.
    #[must_use]
    pub fn try_recv(&self) -> Option<DiagnosticsNotification> {
        match self.rx.try_recv() {
            Ok(n) => Some(n),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }
}

impl Drop for NotificationStream {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
