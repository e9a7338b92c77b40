//! Point, aggregate and bucket queries.
//!
//! Queries iterate an immutable producer snapshot. Push-based producers are
//! answered from the store; pull-based producers are asked directly, on the
//! caller's thread and outside the store lock. Cancellation is checked before
//! each producer, and any failure discards whatever was gathered so far.

use std::sync::Arc;

use tracing::debug;

use crate::cancel::CancellationToken;
use crate::diagnostic::{self, Diagnostic};
use crate::error::{DiagResult, ExecutionError};
use crate::event::Bucket;
use crate::ids::{BatchId, DocumentId, ProjectId, WorkspaceId};
use crate::producer::{Producer, ProducerError, ProducerKind, ProducerSet, PullSource};
use crate::storage::{DiagnosticStore, Record};

/// Region of a workspace a query targets.
///
/// Precedence is by what was requested: a document request matches only that
/// document, a project request (without document) matches only that project,
/// and a bare workspace request matches everything in the workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Scope {
    /// Target workspace.
    pub workspace: WorkspaceId,
    /// Optional project filter.
    pub project: Option<ProjectId>,
    /// Optional document filter.
    pub document: Option<DocumentId>,
}

impl Scope {
    /// Whole-workspace scope.
    #[must_use]
    pub const fn workspace(workspace: WorkspaceId) -> Self {
        Self {
            workspace,
            project: None,
            document: None,
        }
    }

    /// Narrows to a project.
    #[must_use]
    pub const fn with_project(mut self, project: ProjectId) -> Self {
        self.project = Some(project);
        self
    }

    /// Narrows to a document.
    #[must_use]
    pub const fn with_document(mut self, document: DocumentId) -> Self {
        self.document = Some(document);
        self
    }

    /// Returns true if `record` falls inside this scope.
    #[must_use]
    pub fn matches(&self, record: &Record) -> bool {
        if record.workspace != self.workspace {
            return false;
        }
        match (self.document, self.project) {
            (Some(document), _) => record.document == Some(document),
            (None, Some(project)) => record.project == Some(project),
            (None, None) => true,
        }
    }
}

/// Diagnostic query.
///
/// # Example
/// ```
/// use diaghub::{DiagnosticQuery, DocumentId, WorkspaceId};
///
/// let query = DiagnosticQuery::new(WorkspaceId::new())
///     .document(DocumentId::new())
///     .id("syntax")
///     .include_suppressed(true);
/// assert!(query.is_point());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticQuery {
    /// Region to search.
    pub scope: Scope,
    /// Exact batch id for a point query.
    pub id: Option<BatchId>,
    /// Whether suppressed diagnostics are returned.
    pub include_suppressed: bool,
}

impl DiagnosticQuery {
    /// Aggregate query over a whole workspace, suppressed diagnostics excluded.
    #[must_use]
    pub const fn new(workspace: WorkspaceId) -> Self {
        Self {
            scope: Scope::workspace(workspace),
            id: None,
            include_suppressed: false,
        }
    }

    /// Builds a query from an existing scope.
    #[must_use]
    pub const fn in_scope(scope: Scope) -> Self {
        Self {
            scope,
            id: None,
            include_suppressed: false,
        }
    }

    /// Restrict to a project.
    #[must_use]
    pub fn project(mut self, project: ProjectId) -> Self {
        self.scope.project = Some(project);
        self
    }

    /// Restrict to a document.
    #[must_use]
    pub fn document(mut self, document: DocumentId) -> Self {
        self.scope.document = Some(document);
        self
    }

    /// Turn this into a point query for one batch id.
    #[must_use]
    pub fn id(mut self, id: impl Into<BatchId>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Include suppressed diagnostics.
    #[must_use]
    pub fn include_suppressed(mut self, include: bool) -> Self {
        self.include_suppressed = include;
        self
    }

    /// Target workspace.
    #[must_use]
    pub const fn workspace_id(&self) -> WorkspaceId {
        self.scope.workspace
    }

    /// Returns true when a batch id was given.
    #[must_use]
    pub const fn is_point(&self) -> bool {
        self.id.is_some()
    }
}

/// Answers queries against a store and a producer set.
#[derive(Clone)]
pub struct QueryEngine {
    store: Arc<dyn DiagnosticStore>,
    producers: Arc<ProducerSet>,
}

impl QueryEngine {
    /// Creates an engine over shared state.
    #[must_use]
    pub fn new(store: Arc<dyn DiagnosticStore>, producers: Arc<ProducerSet>) -> Self {
        Self { store, producers }
    }

    /// Returns the diagnostics matching `query`.
    ///
    /// With an id, the first producer that has the batch answers. Without one,
    /// every producer contributes, in registration order.
    pub fn get_diagnostics(
        &self,
        query: &DiagnosticQuery,
        cancel: &CancellationToken,
    ) -> DiagResult<Vec<Diagnostic>> {
        match &query.id {
            Some(id) => self.point_query(query, id, cancel),
            None => self.aggregate_query(query, cancel),
        }
    }

    /// Enumerates stored batches inside `scope` without fetching diagnostics.
    pub fn get_diagnostic_buckets(
        &self,
        scope: &Scope,
        cancel: &CancellationToken,
    ) -> DiagResult<Vec<Bucket>> {
        let producers = self.producers.snapshot();
        let mut out = Vec::new();
        for producer in producers.iter() {
            cancel.check()?;
            out.extend(
                self.store
                    .scan_matching(producer.id(), scope)
                    .iter()
                    .map(Record::bucket),
            );
        }
        Ok(out)
    }

    fn point_query(
        &self,
        query: &DiagnosticQuery,
        id: &BatchId,
        cancel: &CancellationToken,
    ) -> DiagResult<Vec<Diagnostic>> {
        let producers = self.producers.snapshot();
        for producer in producers.iter() {
            cancel.check()?;
            match producer.kind() {
                ProducerKind::Pull(source) => {
                    let found = pull(producer, source.as_ref(), query, cancel)?;
                    if !found.is_empty() {
                        return Ok(found);
                    }
                }
                ProducerKind::Push => {
                    let workspace = query.scope.workspace;
                    if let Some(record) = self.store.lookup_exact(producer.id(), workspace, id) {
                        return Ok(diagnostic::visible(
                            record.diagnostics(),
                            query.include_suppressed,
                        ));
                    }
                }
            }
        }
        Ok(Vec::new())
    }

    fn aggregate_query(
        &self,
        query: &DiagnosticQuery,
        cancel: &CancellationToken,
    ) -> DiagResult<Vec<Diagnostic>> {
        let producers = self.producers.snapshot();
        let mut out = Vec::new();
        for producer in producers.iter() {
            cancel.check()?;
            match producer.kind() {
                ProducerKind::Pull(source) => {
                    out.extend(pull(producer, source.as_ref(), query, cancel)?);
                }
                ProducerKind::Push => {
                    for record in self.store.scan_matching(producer.id(), &query.scope) {
                        out.extend(
                            record
                                .diagnostics()
                                .iter()
                                .filter(|d| d.is_visible(query.include_suppressed))
                                .cloned(),
                        );
                    }
                }
            }
        }
        Ok(out)
    }
}

fn pull(
    producer: &Producer,
    source: &dyn PullSource,
    query: &DiagnosticQuery,
    cancel: &CancellationToken,
) -> DiagResult<Vec<Diagnostic>> {
    let diagnostics = source.query(query, cancel).map_err(|err| {
        debug!(producer = %producer.name(), error = %err, "pull query failed");
        match err {
            ProducerError::Cancelled => ExecutionError::Cancelled,
            ProducerError::Failed { message } => ExecutionError::ProducerFailed {
                producer: producer.name().to_string(),
                message,
            },
        }
    })?;

    debug_assert!(
        diagnostics.iter().all(|d| d.debug_validate().is_ok()),
        "producer '{}' returned a malformed diagnostic",
        producer.name()
    );
    Ok(diagnostics)
}
