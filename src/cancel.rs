//! Cooperative cancellation for queries.

use thiserror::Error;

/// Marker error returned by [`CancellationToken::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation was cancelled")]
pub struct Cancelled;

/// Shared cancellation flag for one query and everything it fans out to.
///
/// Clones observe the same flag. Child tokens are cancelled with any ancestor
/// but can also be cancelled on their own. No async runtime is needed.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: tokio_util::sync::CancellationToken,
}

impl CancellationToken {
    /// Creates a token that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation of this token and all of its descendants.
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    /// Returns true once this token or any ancestor was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }

    /// Returns `Err(Cancelled)` once cancellation was requested.
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }

    /// Creates a child token that is cancelled together with this one.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            inner: self.inner.child_token(),
        }
    }

    /// The underlying token, e.g. to await cancellation from async code.
    #[must_use]
    pub fn as_inner(&self) -> &tokio_util::sync::CancellationToken {
        &self.inner
    }
}

impl From<tokio_util::sync::CancellationToken> for CancellationToken {
    fn from(inner: tokio_util::sync::CancellationToken) -> Self {
        Self { inner }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_flag() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(token.check().is_ok());

        clone.cancel();
        assert!(token.is_cancelled());
        assert_eq!(token.check(), Err(Cancelled));
    }

    #[test]
    fn test_child_follows_parent_but_not_reverse() {
        let parent = CancellationToken::new();
        let child = parent.child();

        child.cancel();
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());

        let other = parent.child();
        parent.cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn test_cancellation_reaches_every_descendant() {
        let root = CancellationToken::new();
        let grandchild = root.child().child();
        let great_grandchild = grandchild.child();
        assert!(!grandchild.is_cancelled());

        root.cancel();
        assert!(grandchild.is_cancelled());
        assert_eq!(great_grandchild.check(), Err(Cancelled));
    }

    #[test]
    fn test_wraps_external_token() {
        let external = tokio_util::sync::CancellationToken::new();
        let token = CancellationToken::from(external.child_token());

        external.cancel();
        assert!(token.is_cancelled());
        assert!(token.as_inner().is_cancelled());
    }
}
