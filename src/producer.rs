//! Diagnostic producers and the copy-on-write producer set.
//!
//! A producer is either push-based (it reports batches and the service keeps
//! their diagnostics) or pull-based (it reports batch identity and answers
//! queries itself). The distinction is a tagged variant so each kind carries
//! exactly the capability it needs.

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use thiserror::Error;

use crate::cancel::{CancellationToken, Cancelled};
use crate::diagnostic::Diagnostic;
use crate::error::{DiagResult, ValidationError};
use crate::ids::ProducerId;
use crate::query::DiagnosticQuery;
use crate::storage::Retention;

/// Failure reported by a pull-based producer.
#[derive(Debug, Error)]
pub enum ProducerError {
    /// The producer observed the cancellation token.
    #[error("query cancelled")]
    Cancelled,

    /// The producer could not answer.
    #[error("{message}")]
    Failed {
        /// Producer-supplied description.
        message: String,
    },
}

impl ProducerError {
    /// Creates a `Failed` error.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}

impl From<Cancelled> for ProducerError {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

/// On-demand diagnostic source.
///
/// Called on the querying thread, never while the store lock is held. A slow
/// implementation delays only its caller.
pub trait PullSource: Send + Sync {
    /// Returns the current diagnostics matching `query`.
    ///
    /// Implementations are expected to honour `query.include_suppressed` and
    /// to return `ProducerError::Cancelled` promptly once `cancel` fires.
    fn query(
        &self,
        query: &DiagnosticQuery,
        cancel: &CancellationToken,
    ) -> Result<Vec<Diagnostic>, ProducerError>;
}

impl<F> PullSource for F
where
    F: Fn(&DiagnosticQuery, &CancellationToken) -> Result<Vec<Diagnostic>, ProducerError>
        + Send
        + Sync,
{
    fn query(
        &self,
        query: &DiagnosticQuery,
        cancel: &CancellationToken,
    ) -> Result<Vec<Diagnostic>, ProducerError> {
        self(query, cancel)
    }
}

/// Capability of a producer, fixed for its lifetime.
#[derive(Clone)]
pub enum ProducerKind {
    /// Reports full diagnostic batches; the service stores them.
    Push,
    /// Answers queries directly; the service stores batch identity only.
    Pull(Arc<dyn PullSource>),
}

impl fmt::Debug for ProducerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Push => f.write_str("Push"),
            Self::Pull(_) => f.write_str("Pull(..)"),
        }
    }
}

/// Handle to a diagnostic producer. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Producer {
    id: ProducerId,
    name: Arc<str>,
    kind: ProducerKind,
}

impl Producer {
    /// Creates a push-based producer whose id is derived from `name`.
    #[must_use]
    pub fn push(name: impl AsRef<str>) -> Self {
        let name = name.as_ref();
        Self {
            id: ProducerId::from_name(name),
            name: Arc::from(name),
            kind: ProducerKind::Push,
        }
    }

    /// Creates a pull-based producer whose id is derived from `name`.
    #[must_use]
    pub fn pull(name: impl AsRef<str>, source: impl PullSource + 'static) -> Self {
        let name = name.as_ref();
        Self {
            id: ProducerId::from_name(name),
            name: Arc::from(name),
            kind: ProducerKind::Pull(Arc::new(source)),
        }
    }

    /// Overrides the derived id.
    #[must_use]
    pub fn with_id(mut self, id: ProducerId) -> Self {
        self.id = id;
        self
    }

    /// The producer id.
    #[must_use]
    pub const fn id(&self) -> ProducerId {
        self.id
    }

    /// The display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn name_arc(&self) -> Arc<str> {
        Arc::clone(&self.name)
    }

    /// The producer capability.
    #[must_use]
    pub const fn kind(&self) -> &ProducerKind {
        &self.kind
    }

    /// Returns true for pull-based producers.
    #[must_use]
    pub const fn is_pull(&self) -> bool {
        matches!(self.kind, ProducerKind::Pull(_))
    }

    /// How the store keeps this producer's batches.
    #[must_use]
    pub const fn retention(&self) -> Retention {
        match self.kind {
            ProducerKind::Push => Retention::Full,
            ProducerKind::Pull(_) => Retention::IdentityOnly,
        }
    }
}

impl PartialEq for Producer {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Producer {}

/// Immutable view of the registered producers, in registration order.
pub type ProducerSnapshot = Arc<Vec<Producer>>;

/// Registered producers, swapped atomically on change.
///
/// Readers take a snapshot and iterate it without locking; registration
/// builds a new vector and publishes it with compare-and-swap.
#[derive(Debug, Default)]
pub struct ProducerSet {
    snap: ArcSwap<Vec<Producer>>,
}

impl ProducerSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> ProducerSnapshot {
        self.snap.load_full()
    }

    /// Looks up a registered producer.
    #[must_use]
    pub fn get(&self, id: ProducerId) -> Option<Producer> {
        self.snap.load().iter().find(|p| p.id == id).cloned()
    }

    /// Returns true if `id` is registered.
    #[must_use]
    pub fn contains(&self, id: ProducerId) -> bool {
        self.snap.load().iter().any(|p| p.id == id)
    }

    /// Number of registered producers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.snap.load().len()
    }

    /// Returns true if no producer is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Adds a producer. Fails if its id is already registered.
    pub fn insert(&self, producer: Producer) -> DiagResult<()> {
        loop {
            let cur = self.snap.load_full();
            if cur.iter().any(|p| p.id == producer.id) {
                return Err(ValidationError::DuplicateProducer { producer: producer.id }.into());
            }

            let mut next = Vec::with_capacity(cur.len() + 1);
            next.extend(cur.iter().cloned());
            next.push(producer.clone());

            let prev = self.snap.compare_and_swap(&cur, Arc::new(next));
            if Arc::ptr_eq(&prev, &cur) {
                return Ok(());
            }
        }
    }

    /// Removes a producer, returning it if it was registered.
    pub fn remove(&self, id: ProducerId) -> Option<Producer> {
        loop {
            let cur = self.snap.load_full();
            let pos = cur.iter().position(|p| p.id == id)?;

            let mut next: Vec<Producer> = cur.iter().cloned().collect();
            let removed = next.remove(pos);

            let prev = self.snap.compare_and_swap(&cur, Arc::new(next));
            if Arc::ptr_eq(&prev, &cur) {
                return Some(removed);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_source(
        _: &DiagnosticQuery,
        _: &CancellationToken,
    ) -> Result<Vec<Diagnostic>, ProducerError> {
        Ok(Vec::new())
    }

    #[test]
    fn test_kinds_and_retention() {
        let push = Producer::push("compiler");
        let pull = Producer::pull("style", empty_source);

        assert!(!push.is_pull());
        assert!(pull.is_pull());
        assert_eq!(push.retention(), Retention::Full);
        assert_eq!(pull.retention(), Retention::IdentityOnly);
        assert_eq!(push.id(), ProducerId::from_name("compiler"));
        assert_eq!(format!("{:?}", pull.kind()), "Pull(..)");
    }

    #[test]
    fn test_insert_rejects_duplicates() {
        let set = ProducerSet::new();
        set.insert(Producer::push("compiler")).unwrap();

        let err = set.insert(Producer::push("compiler")).unwrap_err();
        assert!(err.is_validation());
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_snapshot_is_stable_across_changes() {
        let set = ProducerSet::new();
        let a = Producer::push("a");
        let b = Producer::push("b");
        set.insert(a.clone()).unwrap();

        let before = set.snapshot();
        set.insert(b.clone()).unwrap();
        set.remove(a.id()).unwrap();

        assert_eq!(before.as_slice(), &[a.clone()]);
        assert_eq!(set.snapshot().as_slice(), &[b]);
        assert!(!set.contains(a.id()));
        assert!(set.remove(a.id()).is_none());
    }

    #[test]
    fn test_registration_order_is_preserved() {
        let set = ProducerSet::new();
        for name in ["one", "two", "three"] {
            set.insert(Producer::push(name)).unwrap();
        }
        let snap = set.snapshot();
        let names: Vec<&str> = snap.iter().map(Producer::name).collect();
        assert_eq!(names, vec!["one", "two", "three"]);
    }

    #[test]
    fn test_concurrent_inserts_all_land() {
        let set = Arc::new(ProducerSet::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let set = Arc::clone(&set);
                std::thread::spawn(move || set.insert(Producer::push(format!("p{i}"))).unwrap())
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(set.len(), 8);
    }
}
