//! # diaghub - Diagnostic Aggregation Service
//!
//! diaghub collects diagnostics from many independent producers (compilers,
//! analyzers, build tools), keeps the latest batch per producer and identity,
//! answers scoped queries and notifies subscribers of every change in the
//! exact order producers reported them.
//!
//! ## Core Concepts
//!
//! - **Producer**: A diagnostic source, either push-based (reports batches) or
//!   pull-based (answers queries on demand)
//! - **UpdateEvent**: One batch replacement; an empty diagnostic list is a removal
//! - **Record**: The stored batch for `(producer, workspace, batch id)`
//! - **Scope**: Workspace, optionally narrowed to a project and then a document
//! - **Notification queue**: A single FIFO worker that applies reports and fans
//!   out to subscribers
//!
//! ## Usage
//!
//! ```rust
//! use std::time::Duration;
//! use diaghub::{
//!     CancellationToken, Diagnostic, DiagnosticQuery, DiagnosticService, Producer, UpdateEvent,
//!     WorkspaceId,
//! };
//!
//! let service = DiagnosticService::builder().build()?;
//! let stream = service.subscribe_stream();
//!
//! let compiler = Producer::push("compiler");
//! service.register_producer(compiler.clone())?;
//!
//! let workspace = WorkspaceId::new();
//! let unused = Diagnostic::warning("unused variable");
//! let event = UpdateEvent::new(workspace, "main.rs", vec![unused]);
//! service.report_update(compiler.id(), vec![event])?;
//!
//! let notification = stream.recv_timeout(Duration::from_secs(1))?;
//! assert_eq!(notification.producer, compiler.id());
//!
//! let query = DiagnosticQuery::new(workspace);
//! let current = service.get_diagnostics(&query, &CancellationToken::new())?;
//! assert_eq!(current.len(), 1);
//! # Ok::<(), diaghub::DiagError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod cancel;
pub mod diagnostic;
pub mod error;
pub mod event;
pub mod ids;
pub mod producer;

// Storage, queries and notification
pub mod notify;
pub mod query;
pub mod service;
pub mod storage;

// Re-export primary types at crate root for convenience
pub use cancel::{CancellationToken, Cancelled};
pub use diagnostic::{Diagnostic, Location, Severity, TextSpan};
pub use error::{DiagError, DiagResult, ExecutionError, ValidationError};
pub use event::{Bucket, DiagnosticsNotification, UpdateEvent};
pub use ids::{BatchId, DocumentId, ProducerId, ProjectId, SubscriptionId, WorkspaceId};
pub use producer::{
    Producer, ProducerError, ProducerKind, ProducerSet, ProducerSnapshot, PullSource,
};
pub use query::{DiagnosticQuery, QueryEngine, Scope};

pub use notify::{
    ListenerActivation, NoopActivation, NotificationStream, ReportHandle, ReportOutcome,
};
pub use service::{
    DiagnosticService, DiagnosticServiceBuilder, DiagnosticServiceConfig, ServiceHandle,
    ServiceStats,
};
pub use storage::{BatchKey, DiagnosticStore, InMemoryDiagnosticStore, Record, Retention};
