//! Resolved caller identity.
//!
//! Token verification happens outside the core; the core only sees the
//! user id the authentication layer resolved, or nothing.

use crate::{ExchangeError, ExchangeResult, UserId};

/// Supplies the user on whose behalf an operation runs.
pub trait IdentityContext: Send + Sync {
    fn current_user_id(&self) -> Option<UserId>;

    /// Resolve the user or fail with `Unauthenticated`.
    fn require_user(&self) -> ExchangeResult<UserId> {
        self.current_user_id().ok_or(ExchangeError::Unauthenticated)
    }
}

/// Identity already resolved by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedIdentity(pub Option<UserId>);

impl ResolvedIdentity {
    pub fn user(user_id: UserId) -> Self {
        Self(Some(user_id))
    }

    pub fn anonymous() -> Self {
        Self(None)
    }
}

impl IdentityContext for ResolvedIdentity {
    fn current_user_id(&self) -> Option<UserId> {
        self.0
    }
}
