//! `trellis-auth` — identity and admin access boundary.
//!
//! Decoupled from rendering and transport: route guards return decisions,
//! they never render anything themselves.

pub mod access;
pub mod guard;
pub mod local_store;
pub mod principal;
pub mod remote;
pub mod roles;
pub mod session;

pub use access::{AdminAccess, AdminAccessQuery, AdminCheck, ADMIN_ROLE_KEY};
pub use guard::{GuardDecision, RouteGuard};
pub use local_store::{AuthStoreError, LocalAccount, LocalAuthStore};
pub use principal::PrincipalId;
pub use remote::RemoteError;
pub use roles::Role;
pub use session::{Identity, SessionError, SessionProvider, StaticSession};
