//! Diagnostic storage.
//!
//! The service talks to storage through the `DiagnosticStore` trait; the
//! in-memory backend is the one shipped with the crate.

mod memory;
mod traits;

pub use memory::InMemoryDiagnosticStore;
pub use traits::{BatchKey, DiagnosticStore, Record, Retention};
