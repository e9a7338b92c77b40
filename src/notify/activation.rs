//! Per-workspace listener activation.
//!
//! Before the first notification for a workspace is delivered, the service
//! calls the configured `ListenerActivation` for that workspace exactly once.
//! This gives listeners a chance to subscribe before they could miss events.

use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::event::UpdateEvent;
use crate::ids::WorkspaceId;
use crate::service::ServiceHandle;

/// Hook run once per workspace before its first delivered notification.
pub trait ListenerActivation: Send + Sync {
    /// Prepares listeners for `workspace`.
    ///
    /// Runs on the notification worker; later notifications wait for it.
    fn ensure_activated(&self, workspace: WorkspaceId, service: &ServiceHandle);
}

impl<F> ListenerActivation for F
where
    F: Fn(WorkspaceId, &ServiceHandle) + Send + Sync,
{
    fn ensure_activated(&self, workspace: WorkspaceId, service: &ServiceHandle) {
        self(workspace, service);
    }
}

/// Activation that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopActivation;

impl ListenerActivation for NoopActivation {
    fn ensure_activated(&self, _workspace: WorkspaceId, _service: &ServiceHandle) {}
}

/// Remembers which workspaces were activated.
///
/// Owned by the notification worker, so no locking is needed.
pub(crate) struct ActivationTracker {
    activation: Arc<dyn ListenerActivation>,
    activated: HashSet<WorkspaceId>,
}

impl ActivationTracker {
    pub(crate) fn new(activation: Arc<dyn ListenerActivation>) -> Self {
        Self {
            activation,
            activated: HashSet::new(),
        }
    }

    /// Activates every workspace in `events` not seen before.
    ///
    /// A workspace is marked before its hook runs, so a panicking hook is not
    /// retried. Returns the number of hooks that panicked.
    pub(crate) fn activate(
        &mut self,
        events: &[UpdateEvent],
        service: &ServiceHandle,
        isolate_panics: bool,
    ) -> u64 {
        let mut panics = 0;
        for event in events {
            if !self.activated.insert(event.workspace) {
                continue;
            }
            debug!(workspace = %event.workspace, "activating listeners");

            if isolate_panics {
                let result = panic::catch_unwind(AssertUnwindSafe(|| {
                    self.activation.ensure_activated(event.workspace, service);
                }));
                if result.is_err() {
                    panics += 1;
                    warn!(workspace = %event.workspace, "listener activation panicked");
                }
            } else {
                self.activation.ensure_activated(event.workspace, service);
            }
        }
        panics
    }

    #[cfg(test)]
    pub(crate) fn is_activated(&self, workspace: WorkspaceId) -> bool {
        self.activated.contains(&workspace)
    }
}
