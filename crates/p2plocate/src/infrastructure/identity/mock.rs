//! In-memory identity for tests and embedders that manage ids themselves.

use std::sync::atomic::{AtomicUsize, Ordering};

use super::IdentityProvider;

/// An [`IdentityProvider`] that always returns the same id.
///
/// It counts how often it was asked, which lets tests check that the server
/// resolves its identity only once.
#[derive(Debug)]
pub struct StaticIdentity {
    id: String,
    calls: AtomicUsize,
}

impl StaticIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Returns the number of times [`IdentityProvider::client_id`] was called.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl IdentityProvider for StaticIdentity {
    fn client_id(&self) -> String {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.id.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_identity_returns_configured_id_and_counts_calls() {
        // Arrange
        let identity = StaticIdentity::new("fixed");

        // Act
        let a = identity.client_id();
        let b = identity.client_id();

        // Assert
        assert_eq!(a, "fixed");
        assert_eq!(b, "fixed");
        assert_eq!(identity.calls(), 2);
    }
}
