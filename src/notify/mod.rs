//! Notification pipeline: ordered job queue, subscriber fan-out and
//! per-workspace listener activation.

/// Per-workspace listener activation.
pub mod activation;
/// Ordered job queue and its worker.
pub mod queue;
/// Subscriber registry and streams.
pub mod subscribers;

pub use activation::{ListenerActivation, NoopActivation};
pub use queue::{ReportHandle, ReportOutcome};
pub use subscribers::{FanOutPolicy, NotificationStream, SubscriberFn, SubscriptionRegistry};
