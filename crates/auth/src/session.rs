//! Identity session provider seam.
//!
//! The real identity mechanism lives outside this workspace. The workflow
//! only needs the current principal and a login/logout lifecycle.

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::PrincipalId;

/// A logged-in identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub principal: PrincipalId,
}

impl Identity {
    pub fn new(principal: PrincipalId) -> Self {
        Self { principal }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("login was cancelled")]
    Cancelled,

    #[error("login failed: {0}")]
    Failed(String),
}

#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Current identity, if logged in.
    async fn identity(&self) -> Option<Identity>;

    /// Start (or resume) a login and return the resulting identity.
    async fn login(&self) -> Result<Identity, SessionError>;

    async fn logout(&self);
}

#[async_trait]
impl<S> SessionProvider for Arc<S>
where
    S: SessionProvider + ?Sized,
{
    async fn identity(&self) -> Option<Identity> {
        (**self).identity().await
    }

    async fn login(&self) -> Result<Identity, SessionError> {
        (**self).login().await
    }

    async fn logout(&self) {
        (**self).logout().await
    }
}

/// In-memory session for tests and standalone deployments.
///
/// `login` succeeds with the configured principal, or fails with the
/// configured error when none is set.
#[derive(Debug)]
pub struct StaticSession {
    current: RwLock<Option<Identity>>,
    login_as: Result<PrincipalId, SessionError>,
}

impl StaticSession {
    /// Logged out; `login` yields `principal`.
    pub fn new(principal: PrincipalId) -> Self {
        Self {
            current: RwLock::new(None),
            login_as: Ok(principal),
        }
    }

    /// Already logged in as `principal`.
    pub fn logged_in(principal: PrincipalId) -> Self {
        Self {
            current: RwLock::new(Some(Identity::new(principal.clone()))),
            login_as: Ok(principal),
        }
    }

    /// Logged out; every `login` fails with `error`.
    pub fn failing(error: SessionError) -> Self {
        Self {
            current: RwLock::new(None),
            login_as: Err(error),
        }
    }
}

#[async_trait]
impl SessionProvider for StaticSession {
    async fn identity(&self) -> Option<Identity> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn login(&self) -> Result<Identity, SessionError> {
        let identity = Identity::new(self.login_as.clone()?);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(identity.clone());
        tracing::info!(principal = %identity.principal, "session established");
        Ok(identity)
    }

    async fn logout(&self) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal() -> PrincipalId {
        PrincipalId::parse("rrkah-fqaaa-aaaaa-aaaaq-cai").unwrap()
    }

    #[tokio::test]
    async fn login_then_logout() {
        let session = StaticSession::new(principal());
        assert_eq!(session.identity().await, None);

        let identity = session.login().await.unwrap();
        assert_eq!(identity.principal, principal());
        assert_eq!(session.identity().await, Some(identity));

        session.logout().await;
        assert_eq!(session.identity().await, None);
    }

    #[tokio::test]
    async fn failing_login_leaves_session_empty() {
        let session = StaticSession::failing(SessionError::Cancelled);
        assert_eq!(session.login().await, Err(SessionError::Cancelled));
        assert_eq!(session.identity().await, None);
    }
}
