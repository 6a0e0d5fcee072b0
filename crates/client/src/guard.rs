//! Route guard for screens that require a session.

use tracing::debug;

use crate::error::Result;
use crate::store::TokenStore;

/// Result of a guard check. The caller performs any navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardOutcome {
    Allow,
    /// Send the user to this route instead.
    RedirectTo(String),
}

impl GuardOutcome {
    #[must_use]
    pub const fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Admits only logged-in users.
#[derive(Debug, Clone)]
pub struct NavigationGuard {
    store: TokenStore,
    auth_route: String,
}

impl NavigationGuard {
    #[must_use]
    pub fn new(store: TokenStore, auth_route: impl Into<String>) -> Self {
        Self {
            store,
            auth_route: auth_route.into(),
        }
    }

    /// Check the persisted logged-in flag.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Store` if the session cannot be read.
    pub fn check(&self) -> Result<GuardOutcome> {
        if self.store.is_logged_in()? {
            return Ok(GuardOutcome::Allow);
        }
        debug!(route = %self.auth_route, "Not logged in, redirecting");
        Ok(GuardOutcome::RedirectTo(self.auth_route.clone()))
    }
}
