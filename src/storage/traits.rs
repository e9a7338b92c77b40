//! Storage contract for diagnostic records.
//!
//! Store operations are pure in-memory index updates and cannot fail.
//! Implementations must hold their lock only for map operations and never
//! call out to producers or subscribers while holding it.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::diagnostic::Diagnostic;
use crate::event::{Bucket, UpdateEvent};
use crate::ids::{BatchId, DocumentId, ProducerId, ProjectId, WorkspaceId};
use crate::query::Scope;

/// How much of a reported batch the store keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Retention {
    /// Keep the diagnostics (push-based producers).
    Full,
    /// Keep identity only; diagnostics are fetched from the producer on demand.
    IdentityOnly,
}

/// Composite key of a stored batch. Unique within a store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BatchKey {
    /// Reporting producer.
    pub producer: ProducerId,
    /// Owning workspace.
    pub workspace: WorkspaceId,
    /// Producer-chosen id.
    pub id: BatchId,
}

impl BatchKey {
    /// Creates a key.
    #[must_use]
    pub const fn new(producer: ProducerId, workspace: WorkspaceId, id: BatchId) -> Self {
        Self {
            producer,
            workspace,
            id,
        }
    }
}

/// Stored state of one batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Owning workspace.
    pub workspace: WorkspaceId,
    /// Producer-chosen id.
    pub id: BatchId,
    /// Project scope, if any.
    pub project: Option<ProjectId>,
    /// Document scope, if any.
    pub document: Option<DocumentId>,
    /// `None` for identity-only records.
    pub diagnostics: Option<Arc<[Diagnostic]>>,
    /// When the record was last replaced.
    pub updated_at: DateTime<Utc>,
}

impl Record {
    /// Builds a record from a non-empty update event.
    #[must_use]
    pub fn from_event(event: &UpdateEvent, retention: Retention) -> Self {
        let diagnostics = match retention {
            Retention::Full => Some(Arc::clone(&event.diagnostics)),
            Retention::IdentityOnly => None,
        };
        Self {
            workspace: event.workspace,
            id: event.id.clone(),
            project: event.project,
            document: event.document,
            diagnostics,
            updated_at: Utc::now(),
        }
    }

    /// Stored diagnostics; empty for identity-only records.
    #[must_use]
    pub fn diagnostics(&self) -> &[Diagnostic] {
        self.diagnostics.as_deref().unwrap_or(&[])
    }

    /// Identity-only view of this record.
    #[must_use]
    pub fn bucket(&self) -> Bucket {
        Bucket {
            id: self.id.clone(),
            workspace: self.workspace,
            project: self.project,
            document: self.document,
        }
    }

    /// Event announcing that this record was removed.
    #[must_use]
    pub fn removal_event(&self) -> UpdateEvent {
        UpdateEvent {
            workspace: self.workspace,
            id: self.id.clone(),
            project: self.project,
            document: self.document,
            diagnostics: Arc::from(Vec::new()),
        }
    }
}

/// Thread-safe index of current diagnostic records.
pub trait DiagnosticStore: Send + Sync {
    /// Inserts, replaces or removes the batch named by `event`.
    ///
    /// An event with no diagnostics removes the batch; if the batch does not
    /// exist this is a no-op. Returns whether the store changed.
    fn upsert(&self, producer: ProducerId, event: &UpdateEvent, retention: Retention) -> bool;

    /// Removes every record of `producer` across all workspaces.
    ///
    /// Returned records are in no particular order.
    fn clear(&self, producer: ProducerId) -> Vec<Record>;

    /// Returns the record for an exact key.
    fn lookup_exact(
        &self,
        producer: ProducerId,
        workspace: WorkspaceId,
        id: &BatchId,
    ) -> Option<Record>;

    /// Returns the records of `producer` that fall inside `scope`.
    fn scan_matching(&self, producer: ProducerId, scope: &Scope) -> Vec<Record>;

    /// Total number of records.
    fn len(&self) -> usize;

    /// Returns true if the store holds no records.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn _assert_store_object_safe(_: &dyn DiagnosticStore) {}

    #[test]
    fn test_identity_only_record_drops_diagnostics() {
        let ev = UpdateEvent::new(WorkspaceId::new(), "semantic", vec![Diagnostic::error("x")]);

        let full = Record::from_event(&ev, Retention::Full);
        assert_eq!(full.diagnostics().len(), 1);

        let identity = Record::from_event(&ev, Retention::IdentityOnly);
        assert!(identity.diagnostics.is_none());
        assert!(identity.diagnostics().is_empty());
        assert_eq!(identity.bucket(), full.bucket());
    }

    #[test]
    fn test_removal_event_keeps_identity() {
        let document = DocumentId::new();
        let ev = UpdateEvent::new(WorkspaceId::new(), 3u64, vec![Diagnostic::warning("w")])
            .with_document(document);
        let record = Record::from_event(&ev, Retention::Full);

        let removal = record.removal_event();
        assert!(removal.is_removal());
        assert_eq!(removal.id, ev.id);
        assert_eq!(removal.workspace, ev.workspace);
        assert_eq!(removal.document, Some(document));
    }
}
