//! In-memory storage backend.
//!
//! Records live in one flat map keyed by `(producer, workspace, id)`. A
//! secondary index maps each producer to its workspaces and batch ids so that
//! clearing a producer or scanning one workspace never walks unrelated
//! records. Empty index entries are removed as soon as they empty out.

use std::collections::{BTreeSet, HashMap};

use parking_lot::Mutex;
use tracing::trace;

use crate::event::UpdateEvent;
use crate::ids::{BatchId, ProducerId, WorkspaceId};
use crate::query::Scope;
use crate::storage::traits::{BatchKey, DiagnosticStore, Record, Retention};

#[derive(Debug, Default)]
struct StoreState {
    records: HashMap<BatchKey, Record>,
    by_producer: HashMap<ProducerId, HashMap<WorkspaceId, BTreeSet<BatchId>>>,
}

impl StoreState {
    fn index(&mut self, key: &BatchKey) {
        self.by_producer
            .entry(key.producer)
            .or_default()
            .entry(key.workspace)
            .or_default()
            .insert(key.id.clone());
    }

    fn unindex(&mut self, key: &BatchKey) {
        let Some(workspaces) = self.by_producer.get_mut(&key.producer) else {
            return;
        };
        if let Some(ids) = workspaces.get_mut(&key.workspace) {
            ids.remove(&key.id);
            if ids.is_empty() {
                workspaces.remove(&key.workspace);
            }
        }
        if workspaces.is_empty() {
            self.by_producer.remove(&key.producer);
        }
    }
}

/// Thread-safe in-memory diagnostic store guarded by a single lock.
#[derive(Debug, Default)]
pub struct InMemoryDiagnosticStore {
    state: Mutex<StoreState>,
}

impl InMemoryDiagnosticStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of producers that currently own at least one record.
    #[must_use]
    pub fn producer_count(&self) -> usize {
        self.state.lock().by_producer.len()
    }
}

impl DiagnosticStore for InMemoryDiagnosticStore {
    fn upsert(&self, producer: ProducerId, event: &UpdateEvent, retention: Retention) -> bool {
        let key = BatchKey::new(producer, event.workspace, event.id.clone());
        let mut state = self.state.lock();

        if event.diagnostics.is_empty() {
            if state.records.remove(&key).is_none() {
                return false;
            }
            state.unindex(&key);
            trace!(
                producer = %producer,
                workspace = %key.workspace,
                id = %key.id,
                "removed record"
            );
            return true;
        }

        let record = Record::from_event(event, retention);
        if state.records.insert(key.clone(), record).is_none() {
            state.index(&key);
        }
        trace!(
            producer = %producer,
            workspace = %key.workspace,
            id = %key.id,
            diagnostics = event.diagnostics.len(),
            "stored record"
        );
        true
    }

    fn clear(&self, producer: ProducerId) -> Vec<Record> {
        let mut state = self.state.lock();
        let Some(workspaces) = state.by_producer.remove(&producer) else {
            return Vec::new();
        };

        let mut removed = Vec::new();
        for (workspace, ids) in workspaces {
            for id in ids {
                let key = BatchKey::new(producer, workspace, id);
                if let Some(record) = state.records.remove(&key) {
                    removed.push(record);
                }
            }
        }
        trace!(producer = %producer, removed = removed.len(), "cleared producer");
        removed
    }

    fn lookup_exact(
        &self,
        producer: ProducerId,
        workspace: WorkspaceId,
        id: &BatchId,
    ) -> Option<Record> {
        let state = self.state.lock();
        state.records.get(&BatchKey::new(producer, workspace, id.clone())).cloned()
    }

    fn scan_matching(&self, producer: ProducerId, scope: &Scope) -> Vec<Record> {
        let state = self.state.lock();
        let Some(ids) = state
            .by_producer
            .get(&producer)
            .and_then(|workspaces| workspaces.get(&scope.workspace))
        else {
            return Vec::new();
        };

        ids.iter()
            .filter_map(|id| {
                let key = BatchKey::new(producer, scope.workspace, id.clone());
                state.records.get(&key)
            })
            .filter(|record| scope.matches(record))
            .cloned()
            .collect()
    }

    fn len(&self) -> usize {
        self.state.lock().records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::diagnostic::Diagnostic;
    use crate::ids::{DocumentId, ProjectId};

    fn event(workspace: WorkspaceId, id: &str, messages: &[&str]) -> UpdateEvent {
        let diags: Vec<Diagnostic> = messages.iter().map(|m| Diagnostic::error(*m)).collect();
        UpdateEvent::new(workspace, id, diags)
    }

    #[test]
    fn upsert_insert_replace_and_remove() {
        let store = InMemoryDiagnosticStore::new();
        let p = ProducerId::new();
        let w = WorkspaceId::new();

        assert!(store.upsert(p, &event(w, "a", &["e1", "e2"]), Retention::Full));
        let rec = store.lookup_exact(p, w, &BatchId::from("a")).unwrap();
        assert_eq!(rec.diagnostics().len(), 2);

        // Replacement is wholesale, never merged.
        assert!(store.upsert(p, &event(w, "a", &["e3"]), Retention::Full));
        let rec = store.lookup_exact(p, w, &BatchId::from("a")).unwrap();
        assert_eq!(rec.diagnostics(), &[Diagnostic::error("e3")]);

        assert!(store.upsert(p, &event(w, "a", &[]), Retention::Full));
        assert!(store.lookup_exact(p, w, &BatchId::from("a")).is_none());
        assert!(store.is_empty());
        assert_eq!(store.producer_count(), 0);
    }

    #[test]
    fn empty_update_for_missing_key_is_noop() {
        let store = InMemoryDiagnosticStore::new();
        let p = ProducerId::new();
        let w = WorkspaceId::new();

        assert!(!store.upsert(p, &event(w, "never", &[]), Retention::Full));
        assert!(store.is_empty());
        assert_eq!(store.producer_count(), 0);
    }

    #[test]
    fn removal_prunes_only_empty_parents() {
        let store = InMemoryDiagnosticStore::new();
        let p = ProducerId::new();
        let w1 = WorkspaceId::new();
        let w2 = WorkspaceId::new();

        store.upsert(p, &event(w1, "a", &["x"]), Retention::Full);
        store.upsert(p, &event(w2, "a", &["y"]), Retention::Full);
        store.upsert(p, &event(w1, "a", &[]), Retention::Full);

        assert_eq!(store.producer_count(), 1);
        assert!(store.scan_matching(p, &Scope::workspace(w1)).is_empty());
        assert_eq!(store.scan_matching(p, &Scope::workspace(w2)).len(), 1);

        store.upsert(p, &event(w2, "a", &[]), Retention::Full);
        assert_eq!(store.producer_count(), 0);
    }

    #[test]
    fn workspaces_are_isolated() {
        let store = InMemoryDiagnosticStore::new();
        let p = ProducerId::new();
        let w1 = WorkspaceId::new();
        let w2 = WorkspaceId::new();

        store.upsert(p, &event(w1, "same", &["one"]), Retention::Full);
        store.upsert(p, &event(w2, "same", &["two"]), Retention::Full);

        let id = BatchId::from("same");
        let first = store.lookup_exact(p, w1, &id).unwrap();
        let second = store.lookup_exact(p, w2, &id).unwrap();
        assert_eq!(first.diagnostics(), &[Diagnostic::error("one")]);
        assert_eq!(second.diagnostics(), &[Diagnostic::error("two")]);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn clear_removes_all_workspaces_of_one_producer() {
        let store = InMemoryDiagnosticStore::new();
        let p = ProducerId::new();
        let other = ProducerId::new();
        let w1 = WorkspaceId::new();
        let w2 = WorkspaceId::new();

        store.upsert(p, &event(w1, "a", &["x"]), Retention::Full);
        store.upsert(p, &event(w1, "b", &["x"]), Retention::Full);
        store.upsert(p, &event(w2, "a", &["x"]), Retention::Full);
        store.upsert(other, &event(w1, "a", &["x"]), Retention::Full);

        let mut removed: Vec<(WorkspaceId, String)> = store
            .clear(p)
            .into_iter()
            .map(|r| (r.workspace, r.id.to_string()))
            .collect();
        removed.sort();
        let mut expected = vec![
            (w1, "a".to_string()),
            (w1, "b".to_string()),
            (w2, "a".to_string()),
        ];
        expected.sort();
        assert_eq!(removed, expected);

        assert_eq!(store.len(), 1);
        assert!(store.clear(p).is_empty());
        assert!(store.lookup_exact(other, w1, &BatchId::from("a")).is_some());
    }

    #[test]
    fn identity_only_records_are_enumerable() {
        let store = InMemoryDiagnosticStore::new();
        let p = ProducerId::new();
        let w = WorkspaceId::new();

        assert!(store.upsert(p, &event(w, "pulled", &["x"]), Retention::IdentityOnly));
        let recs = store.scan_matching(p, &Scope::workspace(w));
        assert_eq!(recs.len(), 1);
        assert!(recs[0].diagnostics.is_none());

        assert!(store.upsert(p, &event(w, "pulled", &[]), Retention::IdentityOnly));
        assert!(store.is_empty());
    }

    #[test]
    fn scan_applies_scope_filter() {
        let store = InMemoryDiagnosticStore::new();
        let p = ProducerId::new();
        let w = WorkspaceId::new();
        let project = ProjectId::new();
        let d1 = DocumentId::new();
        let d2 = DocumentId::new();

        let in_project = |id: &str| event(w, id, &["x"]).with_project(project);
        store.upsert(p, &in_project("doc1").with_document(d1), Retention::Full);
        store.upsert(p, &in_project("doc2").with_document(d2), Retention::Full);
        store.upsert(p, &event(w, "proj", &["x"]).with_project(project), Retention::Full);

        let ids = |scope: Scope| -> Vec<String> {
            store.scan_matching(p, &scope).into_iter().map(|r| r.id.to_string()).collect()
        };

        assert_eq!(ids(Scope::workspace(w)), vec!["doc1", "doc2", "proj"]);
        assert_eq!(ids(Scope::workspace(w).with_project(project)), vec!["doc1", "doc2", "proj"]);
        assert_eq!(ids(Scope::workspace(w).with_document(d1)), vec!["doc1"]);
        assert_eq!(ids(Scope::workspace(w).with_project(project).with_document(d2)), vec!["doc2"]);
        assert!(ids(Scope::workspace(WorkspaceId::new())).is_empty());
    }
}
