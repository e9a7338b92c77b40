//! Update events, buckets and delivered notifications.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::diagnostic::Diagnostic;
use crate::ids::{BatchId, DocumentId, ProducerId, ProjectId, WorkspaceId};

/// One replaceable group of diagnostics reported by a producer.
///
/// An event with an empty diagnostic list removes the group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateEvent {
    /// Workspace the diagnostics belong to.
    pub workspace: WorkspaceId,
    /// Producer-chosen batch id.
    pub id: BatchId,
    /// Project scope, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<ProjectId>,
    /// Document scope, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<DocumentId>,
    /// Full replacement set of diagnostics for this batch.
    pub diagnostics: Arc<[Diagnostic]>,
}

impl UpdateEvent {
    /// Creates an event replacing the batch `id` in `workspace`.
    #[must_use]
    pub fn new(
        workspace: WorkspaceId,
        id: impl Into<BatchId>,
        diagnostics: impl Into<Arc<[Diagnostic]>>,
    ) -> Self {
        Self {
            workspace,
            id: id.into(),
            project: None,
            document: None,
            diagnostics: diagnostics.into(),
        }
    }

    /// Creates an event removing the batch `id` in `workspace`.
    #[must_use]
    pub fn removal(workspace: WorkspaceId, id: impl Into<BatchId>) -> Self {
        Self::new(workspace, id, Vec::new())
    }

    /// Scopes the event to a project.
    #[must_use]
    pub fn with_project(mut self, project: ProjectId) -> Self {
        self.project = Some(project);
        self
    }

    /// Scopes the event to a document.
    #[must_use]
    pub fn with_document(mut self, document: DocumentId) -> Self {
        self.document = Some(document);
        self
    }

    /// Returns true if this event removes its batch.
    #[must_use]
    pub fn is_removal(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

/// Identity-only description of a stored batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Bucket {
    /// Producer-chosen batch id.
    pub id: BatchId,
    /// Owning workspace.
    pub workspace: WorkspaceId,
    /// Project scope, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<ProjectId>,
    /// Document scope, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<DocumentId>,
}

/// Owned copy of one delivered batch, as seen by stream subscribers.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosticsNotification {
    /// Producer that reported the batch.
    pub producer: ProducerId,
    /// Display name of that producer.
    pub producer_name: Arc<str>,
    /// Events that changed the store, in report order.
    pub events: Vec<UpdateEvent>,
}
