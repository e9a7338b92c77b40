//! Ordered notification queue.
//!
//! Every report is a job on one unbounded channel drained by one worker
//! thread, so jobs run strictly one at a time in submission order. Submitting
//! never blocks the producer. A job applies its store mutation, drops events
//! that changed nothing, activates listeners for new workspaces and then fans
//! out to subscribers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, info};

use crate::error::{DiagError, DiagResult, ExecutionError};
use crate::event::UpdateEvent;
use crate::producer::Producer;
use crate::service::ServiceHandle;

use super::activation::ActivationTracker;
use super::subscribers::FanOutPolicy;

/// Result of one processed job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportOutcome {
    /// Events that changed the store and were delivered.
    pub changed: usize,
}

/// Counters shared between the worker and the service.
#[derive(Debug, Default)]
pub(crate) struct QueueCounters {
    pub(crate) events_applied: AtomicU64,
    pub(crate) events_ignored: AtomicU64,
    pub(crate) batches_delivered: AtomicU64,
    pub(crate) subscriber_panics: AtomicU64,
}

pub(crate) enum Job {
    Update {
        producer: Producer,
        events: Vec<UpdateEvent>,
        reply: Sender<ReportOutcome>,
    },
    Clear {
        producer: Producer,
        reply: Sender<ReportOutcome>,
    },
    Barrier {
        reply: Sender<ReportOutcome>,
    },
}

/// Handle returned for every submitted job.
///
/// Dropping it is fine; the job still runs. Waiting from a subscriber or
/// activation hook fails with `WorkerReentry`, since the job can only run
/// after the current one returns.
#[derive(Debug)]
pub struct ReportHandle {
    rx: Receiver<ReportOutcome>,
    worker: Option<ThreadId>,
}

impl ReportHandle {
    /// Waits until the job was applied and its notification delivered.
    pub fn wait(self) -> DiagResult<ReportOutcome> {
        self.ensure_off_worker("ReportHandle::wait")?;
        self.rx.recv().map_err(|_| {
            ExecutionError::Disconnected {
                path: "notify_queue".to_string(),
            }
            .into()
        })
    }

    /// Waits with a timeout.
    pub fn wait_timeout(self, timeout: Duration) -> DiagResult<ReportOutcome> {
        self.ensure_off_worker("ReportHandle::wait_timeout")?;
        self.rx.recv_timeout(timeout).map_err(|err| {
            match err {
                RecvTimeoutError::Timeout => ExecutionError::Timeout {
                    duration_ms: timeout.as_millis().min(u128::from(u64::MAX)) as u64,
                },
                RecvTimeoutError::Disconnected => ExecutionError::Disconnected {
                    path: "notify_queue".to_string(),
                },
            }
            .into()
        })
    }

    fn ensure_off_worker(&self, operation: &str) -> DiagResult<()> {
        if self.worker == Some(thread::current().id()) {
            return Err(ExecutionError::WorkerReentry {
                operation: operation.to_string(),
            }
            .into());
        }
        Ok(())
    }
}

/// Single-consumer FIFO job queue with its worker thread.
pub(crate) struct NotificationQueue {
    tx: Option<Sender<Job>>,
    worker: Option<JoinHandle<()>>,
}

impl NotificationQueue {
    pub(crate) fn start(
        thread_name: &str,
        handle: ServiceHandle,
        activation: ActivationTracker,
        policy: FanOutPolicy,
        counters: Arc<QueueCounters>,
    ) -> DiagResult<Self> {
        let (tx, rx) = unbounded::<Job>();
        let worker = Worker {
            handle,
            activation,
            policy,
            counters,
        };
        let join = thread::Builder::new()
            .name(thread_name.to_string())
            .spawn(move || worker.run(&rx))
            .map_err(|e| {
                DiagError::internal(format!("failed to spawn notification worker: {e}"))
            })?;

        Ok(Self {
            tx: Some(tx),
            worker: Some(join),
        })
    }

    /// Returns true when called from the worker thread itself.
    pub(crate) fn on_worker_thread(&self) -> bool {
        self.worker_id() == Some(thread::current().id())
    }

    fn worker_id(&self) -> Option<ThreadId> {
        self.worker.as_ref().map(|join| join.thread().id())
    }

    pub(crate) fn submit_update(
        &self,
        producer: Producer,
        events: Vec<UpdateEvent>,
    ) -> DiagResult<ReportHandle> {
        self.submit(|reply| Job::Update {
            producer,
            events,
            reply,
        })
    }

    pub(crate) fn submit_clear(&self, producer: Producer) -> DiagResult<ReportHandle> {
        self.submit(|reply| Job::Clear { producer, reply })
    }

    pub(crate) fn submit_barrier(&self) -> DiagResult<ReportHandle> {
        self.submit(|reply| Job::Barrier { reply })
    }

    fn submit(
        &self,
        job: impl FnOnce(Sender<ReportOutcome>) -> Job,
    ) -> DiagResult<ReportHandle> {
        let disconnected = || ExecutionError::Disconnected {
            path: "notify_queue".to_string(),
        };
        let tx = self.tx.as_ref().ok_or_else(disconnected)?;
        let (reply, rx) = bounded::<ReportOutcome>(1);
        tx.send(job(reply)).map_err(|_| disconnected())?;
        Ok(ReportHandle {
            rx,
            worker: self.worker_id(),
        })
    }
}

impl Drop for NotificationQueue {
    fn drop(&mut self) {
        // Closing the channel lets the worker drain what is queued, then exit.
        drop(self.tx.take());
        if let Some(join) = self.worker.take() {
            // A subscriber may own the last service reference; never join ourselves.
            if join.thread().id() != thread::current().id() {
                let _ = join.join();
            }
        }
    }
}

struct Worker {
    handle: ServiceHandle,
    activation: ActivationTracker,
    policy: FanOutPolicy,
    counters: Arc<QueueCounters>,
}

impl Worker {
    fn run(mut self, rx: &Receiver<Job>) {
        info!("diagnostic notification worker started");
        while let Ok(job) = rx.recv() {
            match job {
                Job::Update { producer, events, reply } => {
                    let changed = self.apply_update(&producer, events);
                    let _ = reply.send(ReportOutcome { changed });
                }
                Job::Clear { producer, reply } => {
                    let changed = self.apply_clear(&producer);
                    let _ = reply.send(ReportOutcome { changed });
                }
                Job::Barrier { reply } => {
                    let _ = reply.send(ReportOutcome::default());
                }
            }
        }
        info!("diagnostic notification worker stopped");
    }

    fn apply_update(&mut self, producer: &Producer, events: Vec<UpdateEvent>) -> usize {
        // Unregistered while queued: its clear job is already behind us.
        if !self.handle.producer_set().contains(producer.id()) {
            debug!(
                producer = %producer.name(),
                events = events.len(),
                "dropped report from unregistered producer"
            );
            self.counters
                .events_ignored
                .fetch_add(events.len() as u64, Ordering::Relaxed);
            return 0;
        }

        let store = self.handle.store();
        let retention = producer.retention();
        let submitted = events.len();

        let changed: Vec<UpdateEvent> = events
            .into_iter()
            .filter(|event| store.upsert(producer.id(), event, retention))
            .collect();

        let ignored = (submitted - changed.len()) as u64;
        self.counters.events_ignored.fetch_add(ignored, Ordering::Relaxed);
        if ignored > 0 {
            debug!(producer = %producer.name(), ignored, "dropped no-op update events");
        }

        self.deliver(producer, &changed);
        changed.len()
    }

    fn apply_clear(&mut self, producer: &Producer) -> usize {
        let removed: Vec<UpdateEvent> = self
            .handle
            .store()
            .clear(producer.id())
            .iter()
            .map(|record| record.removal_event())
            .collect();
        self.deliver(producer, &removed);
        removed.len()
    }

    fn deliver(&mut self, producer: &Producer, events: &[UpdateEvent]) {
        if events.is_empty() {
            return;
        }
        self.counters
            .events_applied
            .fetch_add(events.len() as u64, Ordering::Relaxed);

        let mut panics = self
            .activation
            .activate(events, &self.handle, self.policy.isolate_panics);
        panics += self.handle.subscribers().raise(producer, events, self.policy);

        self.counters.batches_delivered.fetch_add(1, Ordering::Relaxed);
        if panics > 0 {
            self.counters.subscriber_panics.fetch_add(panics, Ordering::Relaxed);
        }
        debug!(producer = %producer.name(), events = events.len(), "delivered diagnostics batch");
    }
}
