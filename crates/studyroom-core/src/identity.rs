//! Identity provider seam.
//!
//! The hosted auth layer is an external collaborator; the core only needs to
//! know who the current user is. Timer operations fail with
//! [`TimerError::Unauthenticated`](crate::TimerError::Unauthenticated) when no
//! identity is available.

use crate::UserId;

/// Supplies the identity of the acting user.
pub trait IdentityProvider: Send + Sync {
    fn current_user(&self) -> Option<UserId>;
}

/// A fixed identity, the implementation used by the CLI.
#[derive(Debug, Clone)]
pub struct FixedIdentity {
    user: Option<UserId>,
}

impl FixedIdentity {
    pub fn new(user: impl Into<UserId>) -> Self {
        Self {
            user: Some(user.into()),
        }
    }

    /// No identity; every operation through this provider fails
    /// `Unauthenticated`.
    pub fn anonymous() -> Self {
        Self { user: None }
    }
}

impl IdentityProvider for FixedIdentity {
    fn current_user(&self) -> Option<UserId> {
        self.user.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_identity_returns_user() {
        let id = FixedIdentity::new("alice");
        assert_eq!(id.current_user().as_deref(), Some("alice"));
    }

    #[test]
    fn anonymous_has_no_user() {
        assert!(FixedIdentity::anonymous().current_user().is_none());
    }
}
