//! Layout-level route guards.

use serde::Serialize;

use crate::{AdminAccess, AdminAccessQuery, AdminCheck, SessionProvider};

/// Outcome of guarding a protected route. There are exactly three.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "decision")]
pub enum GuardDecision {
    Render,
    RedirectToLogin { to: String },
    AccessDenied,
}

/// Guard for one back-office area (admin panel or control panel).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteGuard {
    login_route: String,
}

impl RouteGuard {
    pub fn new(login_route: impl Into<String>) -> Self {
        Self {
            login_route: login_route.into(),
        }
    }

    pub fn login_route(&self) -> &str {
        &self.login_route
    }

    /// Pure decision over an access snapshot.
    ///
    /// A loading or failed check denies access; it is never provisionally
    /// admin.
    pub fn decide(&self, access: &AdminAccess) -> GuardDecision {
        if !access.is_authenticated {
            GuardDecision::RedirectToLogin {
                to: self.login_route.clone(),
            }
        } else if access.grants_admin() {
            GuardDecision::Render
        } else {
            GuardDecision::AccessDenied
        }
    }

    /// Resolve the current identity's access and decide.
    pub async fn check<C, S>(&self, query: &AdminAccessQuery<C>, session: &S) -> GuardDecision
    where
        C: AdminCheck,
        S: SessionProvider + ?Sized,
    {
        let identity = session.identity().await;
        let access = query.resolve(identity.as_ref()).await;
        let decision = self.decide(&access);
        tracing::debug!(route = %self.login_route, ?decision, "route guard evaluated");
        decision
    }
}
