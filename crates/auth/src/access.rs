//! Admin access query.
//!
//! Derives `{is_authenticated, is_admin, is_loading, error}` from the current
//! identity and a remote admin check. The remote result is cached per
//! principal under [`ADMIN_ROLE_KEY`] and re-fetched only after
//! [`AdminAccessQuery::invalidate`]. A result fetched across an
//! invalidation is stored stale, so it is never served as fresh.
//!
//! Fail-closed: a pending or failed check never reports `is_admin = true`.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde::Serialize;

use crate::{Identity, PrincipalId, RemoteError};

/// Cache key of the admin-role query.
pub const ADMIN_ROLE_KEY: &str = "admin-role";

/// Remote "is this caller an admin" check.
#[async_trait]
pub trait AdminCheck: Send + Sync {
    async fn is_caller_admin(&self, caller: &PrincipalId) -> Result<bool, RemoteError>;
}

#[async_trait]
impl<C> AdminCheck for Arc<C>
where
    C: AdminCheck + ?Sized,
{
    async fn is_caller_admin(&self, caller: &PrincipalId) -> Result<bool, RemoteError> {
        (**self).is_caller_admin(caller).await
    }
}

/// Snapshot of the caller's admin access.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct AdminAccess {
    pub is_authenticated: bool,
    pub is_admin: bool,
    pub is_loading: bool,
    pub error: Option<RemoteError>,
}

impl AdminAccess {
    pub fn unauthenticated() -> Self {
        Self::default()
    }

    pub fn loading() -> Self {
        Self {
            is_authenticated: true,
            is_loading: true,
            ..Self::default()
        }
    }

    pub fn settled(result: Result<bool, RemoteError>) -> Self {
        match result {
            Ok(is_admin) => Self {
                is_authenticated: true,
                is_admin,
                ..Self::default()
            },
            Err(error) => Self {
                is_authenticated: true,
                error: Some(error),
                ..Self::default()
            },
        }
    }

    /// Whether protected admin content may be shown.
    pub fn grants_admin(&self) -> bool {
        self.is_authenticated && self.is_admin && !self.is_loading
    }
}

#[derive(Debug)]
struct CachedCheck {
    principal: PrincipalId,
    result: Result<bool, RemoteError>,
    stale: bool,
}

#[derive(Debug, Default)]
struct QueryState {
    cached: Option<CachedCheck>,
    /// Outstanding remote checks per principal.
    in_flight: BTreeMap<PrincipalId, usize>,
    /// Bumped by every invalidation.
    generation: u64,
    fetches: u64,
}

impl QueryState {
    fn begin_fetch(&mut self, principal: &PrincipalId) -> u64 {
        *self.in_flight.entry(principal.clone()).or_default() += 1;
        self.fetches += 1;
        self.generation
    }

    fn end_fetch(&mut self, principal: &PrincipalId) {
        if let Some(count) = self.in_flight.get_mut(principal) {
            *count -= 1;
            if *count == 0 {
                self.in_flight.remove(principal);
            }
        }
    }

    fn is_fetching_for(&self, principal: &PrincipalId) -> bool {
        self.in_flight.contains_key(principal)
    }
}

/// Pull-based admin access query with an invalidate-then-refetch cache.
#[derive(Debug)]
pub struct AdminAccessQuery<C> {
    check: C,
    state: Mutex<QueryState>,
}

impl<C: AdminCheck> AdminAccessQuery<C> {
    pub fn new(check: C) -> Self {
        Self {
            check,
            state: Mutex::new(QueryState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, QueryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resolve access for `identity`, calling the remote check only when
    /// authenticated and no fresh cached result exists for that principal.
    pub async fn resolve(&self, identity: Option<&Identity>) -> AdminAccess {
        let Some(identity) = identity else {
            return AdminAccess::unauthenticated();
        };
        let principal = &identity.principal;

        let generation = {
            let mut state = self.state();
            if let Some(cached) = state.cached.as_ref().filter(|c| !c.stale && &c.principal == principal) {
                tracing::debug!(key = ADMIN_ROLE_KEY, %principal, "admin check served from cache");
                return AdminAccess::settled(cached.result.clone());
            }
            state.begin_fetch(principal)
        };

        let result = self.check.is_caller_admin(principal).await;
        if let Err(e) = &result {
            tracing::warn!(%principal, error = %e, "admin check failed; treating caller as non-admin");
        }

        let mut state = self.state();
        state.end_fetch(principal);
        let stale = state.generation != generation;
        if stale {
            tracing::debug!(key = ADMIN_ROLE_KEY, %principal, "admin role invalidated during fetch");
        }
        state.cached = Some(CachedCheck {
            principal: principal.clone(),
            result: result.clone(),
            stale,
        });

        AdminAccess::settled(result)
    }

    /// Current view without triggering a remote call.
    ///
    /// An authenticated identity reads as loading while a check for it is
    /// outstanding or no fresh cached result exists.
    pub fn snapshot(&self, identity: Option<&Identity>) -> AdminAccess {
        let Some(identity) = identity else {
            return AdminAccess::unauthenticated();
        };

        let state = self.state();
        if state.is_fetching_for(&identity.principal) {
            return AdminAccess::loading();
        }
        match state.cached.as_ref() {
            Some(cached) if !cached.stale && cached.principal == identity.principal => {
                AdminAccess::settled(cached.result.clone())
            }
            _ => AdminAccess::loading(),
        }
    }

    /// Mark the cached admin-role result stale; the next `resolve` re-fetches.
    pub fn invalidate(&self) {
        let mut state = self.state();
        state.generation += 1;
        if let Some(cached) = state.cached.as_mut() {
            cached.stale = true;
        }
        drop(state);
        tracing::debug!(key = ADMIN_ROLE_KEY, "admin role query invalidated");
    }

    /// Whether a remote check is currently outstanding.
    pub fn is_fetching(&self) -> bool {
        !self.state().in_flight.is_empty()
    }

    /// Number of remote checks issued so far.
    pub fn fetch_count(&self) -> u64 {
        self.state().fetches
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use tokio::sync::Notify;

    use super::*;

    #[derive(Default)]
    struct FakeCheck {
        admin: AtomicBool,
        fail: AtomicBool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl AdminCheck for FakeCheck {
        async fn is_caller_admin(&self, _caller: &PrincipalId) -> Result<bool, RemoteError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(RemoteError::new("canister unreachable"));
            }
            Ok(self.admin.load(Ordering::SeqCst))
        }
    }

    /// Reads the admin flag, then holds the first call until released.
    #[derive(Default)]
    struct GatedCheck {
        admin: AtomicBool,
        gate_first: AtomicBool,
        entered: Notify,
        release: Notify,
        calls: AtomicUsize,
    }

    impl GatedCheck {
        fn gated() -> Self {
            Self {
                gate_first: AtomicBool::new(true),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl AdminCheck for GatedCheck {
        async fn is_caller_admin(&self, _caller: &PrincipalId) -> Result<bool, RemoteError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let admin = self.admin.load(Ordering::SeqCst);
            if self.gate_first.swap(false, Ordering::SeqCst) {
                self.entered.notify_one();
                self.release.notified().await;
            }
            Ok(admin)
        }
    }

    fn identity(raw: &str) -> Identity {
        Identity::new(PrincipalId::parse(raw).unwrap())
    }

    #[tokio::test]
    async fn unauthenticated_makes_no_remote_call() {
        let check = Arc::new(FakeCheck::default());
        let query = AdminAccessQuery::new(check.clone());

        let access = query.resolve(None).await;

        assert_eq!(access, AdminAccess::unauthenticated());
        assert!(!access.is_authenticated);
        assert!(!access.is_admin);
        assert_eq!(check.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn caches_until_invalidated() {
        let check = Arc::new(FakeCheck::default());
        let query = AdminAccessQuery::new(check.clone());
        let me = identity("aaaaa-aa");

        assert!(!query.resolve(Some(&me)).await.is_admin);
        check.admin.store(true, Ordering::SeqCst);

        assert!(!query.resolve(Some(&me)).await.is_admin);
        assert_eq!(check.calls.load(Ordering::SeqCst), 1);

        query.invalidate();
        assert!(query.snapshot(Some(&me)).is_loading);

        let access = query.resolve(Some(&me)).await;
        assert!(access.is_admin);
        assert!(access.grants_admin());
        assert_eq!(check.calls.load(Ordering::SeqCst), 2);
        assert_eq!(query.fetch_count(), 2);
    }

    #[tokio::test]
    async fn failure_is_captured_and_fails_closed() {
        let check = Arc::new(FakeCheck::default());
        check.admin.store(true, Ordering::SeqCst);
        check.fail.store(true, Ordering::SeqCst);
        let query = AdminAccessQuery::new(check);
        let me = identity("aaaaa-aa");

        let access = query.resolve(Some(&me)).await;

        assert!(access.is_authenticated);
        assert!(!access.is_admin);
        assert_eq!(access.error, Some(RemoteError::new("canister unreachable")));
    }

    #[tokio::test]
    async fn cached_result_is_not_shared_across_principals() {
        let check = Arc::new(FakeCheck::default());
        check.admin.store(true, Ordering::SeqCst);
        let query = AdminAccessQuery::new(check.clone());

        query.resolve(Some(&identity("aaaaa-aa"))).await;
        let other = identity("2vxsx-fae");
        assert!(query.snapshot(Some(&other)).is_loading);

        query.resolve(Some(&other)).await;
        assert_eq!(check.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn loading_never_grants_admin() {
        let mut access = AdminAccess::loading();
        access.is_admin = true;
        assert!(!access.grants_admin());
    }

    #[tokio::test]
    async fn invalidation_during_fetch_forces_refetch() {
        let check = Arc::new(GatedCheck::gated());
        let query = AdminAccessQuery::new(check.clone());
        let me = identity("aaaaa-aa");

        let promote = async {
            check.entered.notified().await;
            assert!(query.is_fetching());
            assert!(query.snapshot(Some(&me)).is_loading);
            check.admin.store(true, Ordering::SeqCst);
            query.invalidate();
            check.release.notify_one();
        };
        let (first, ()) = tokio::join!(query.resolve(Some(&me)), promote);

        assert!(!first.is_admin);
        assert!(!query.is_fetching());
        assert!(query.snapshot(Some(&me)).is_loading);

        let access = query.resolve(Some(&me)).await;
        assert!(access.grants_admin());
        assert_eq!(query.fetch_count(), 2);
        assert_eq!(check.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn overlapping_resolves_stay_loading_until_each_settles() {
        let check = Arc::new(GatedCheck::gated());
        let query = AdminAccessQuery::new(check.clone());
        let slow = identity("aaaaa-aa");
        let quick = identity("bbbbb-bb");

        let interleave = async {
            check.entered.notified().await;
            let settled = query.resolve(Some(&quick)).await;
            assert!(!settled.is_loading);
            assert!(query.is_fetching());
            assert!(query.snapshot(Some(&slow)).is_loading);
            check.release.notify_one();
        };
        let (first, ()) = tokio::join!(query.resolve(Some(&slow)), interleave);

        assert!(!first.is_loading);
        assert!(!query.is_fetching());
        assert!(!query.snapshot(Some(&slow)).is_loading);
        assert_eq!(query.fetch_count(), 2);
    }
}
