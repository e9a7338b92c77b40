//! Identity types.
//!
//! Producers, workspaces, projects and documents are opaque to this crate; they
//! are represented as UUID newtypes so they are cheap to copy and hash. Batch
//! ids are chosen by producers and only need to be unique within one
//! `(producer, workspace)` pair.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Namespace for name-derived producer ids.
const PRODUCER_NAMESPACE: Uuid = Uuid::from_u128(0x6d1c_2a47_90b3_4f5e_a0c2_7e19_d4b8_3f61);

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random id.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wraps an existing UUID.
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the underlying UUID.
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }
    };
}

uuid_id!(
    /// Identity of one diagnostic producer.
    ProducerId
);

uuid_id!(
    /// Identity of a workspace session. Diagnostics never cross workspaces.
    WorkspaceId
);

uuid_id!(
    /// Identity of a project inside a workspace.
    ProjectId
);

uuid_id!(
    /// Identity of a document inside a project.
    DocumentId
);

uuid_id!(
    /// Identity of a subscriber registration.
    SubscriptionId
);

impl ProducerId {
    /// Derives a stable id from a producer name.
    ///
    /// The same name yields the same id in every process, which lets an
    /// analyzer keep its identity across service restarts.
    ///
    /// ```
    /// use diaghub::ProducerId;
    ///
    /// assert_eq!(ProducerId::from_name("clippy"), ProducerId::from_name("clippy"));
    /// assert_ne!(ProducerId::from_name("clippy"), ProducerId::from_name("rustc"));
    /// ```
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        Self(Uuid::new_v5(&PRODUCER_NAMESPACE, name.as_bytes()))
    }
}

/// Producer-chosen identifier of a replaceable group of diagnostics.
///
/// Opaque to the service: two ids are the same batch iff their strings are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(Arc<str>);

impl BatchId {
    /// Creates a batch id from any string-like value.
    #[must_use]
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BatchId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for BatchId {
    fn from(id: String) -> Self {
        Self(Arc::from(id))
    }
}

impl From<u64> for BatchId {
    fn from(id: u64) -> Self {
        Self::new(id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_producer_id_from_name_is_stable() {
        let a = ProducerId::from_name("compiler");
        let b = ProducerId::from_name("compiler");
        assert_eq!(a, b);
        assert_ne!(a, ProducerId::from_name("linter"));
        assert_ne!(a, ProducerId::new());
    }

    #[test]
    fn test_random_ids_are_distinct() {
        assert_ne!(WorkspaceId::new(), WorkspaceId::new());
        assert_ne!(DocumentId::new(), DocumentId::new());
    }

    #[test]
    fn test_batch_id_conversions_agree() {
        assert_eq!(BatchId::from(7u64), BatchId::from("7"));
        assert_eq!(BatchId::from(String::from("syntax")), BatchId::new("syntax"));
        assert_eq!(BatchId::from("syntax").as_str(), "syntax");
        assert_eq!(BatchId::from("x").to_string(), "x");
    }

    #[test]
    fn test_ids_serialize_transparently() {
        let id = WorkspaceId::from_uuid(Uuid::nil());
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"00000000-0000-0000-0000-000000000000\"");

        let batch: BatchId = serde_json::from_str("\"semantic\"").unwrap();
        assert_eq!(batch.as_str(), "semantic");
    }
}
