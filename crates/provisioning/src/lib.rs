//! `trellis-provisioning` — admin access provisioning workflow.
//!
//! The wizard walks an operator from login to holding the admin role:
//! log in, register an email, associate it with the caller's principal, then
//! grant the admin role by email. The state machine in [`wizard`] is pure;
//! [`driver`] runs its effects against a [`backend::ProvisioningBackend`].

pub mod backend;
pub mod config;
pub mod driver;
pub mod normalize;
pub mod registry;
pub mod wizard;

pub use backend::{InMemoryBackend, ProvisioningBackend};
pub use config::{ConfigError, ProvisioningConfig};
pub use driver::{ProvisioningDriver, ScheduledRedirect};
pub use normalize::{classify, normalize, ErrorKind, PermissionReason};
pub use registry::{AccessCommand, AccessError, AccessEvent, AccessRegistry};
pub use wizard::{Effect, Transition, Wizard, WizardInput, WizardStep};
