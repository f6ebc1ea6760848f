//! Remote access-control operations.
//!
//! [`ProvisioningBackend`] is the seam to the remote layer; every call names
//! its caller explicitly. [`InMemoryBackend`] implements it over the
//! [`AccessRegistry`] aggregate and reports failures as plain text, the way
//! the remote layer does.

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use chrono::Utc;

use trellis_auth::{AdminCheck, PrincipalId, RemoteError, Role};
use trellis_core::{Aggregate, EmailAddress, RegistrationId};

use crate::registry::{
    AccessCommand, AccessError, AccessEvent, AccessRegistry, AssociateEmail,
    GrantAdminRoleByEmail, RegisterEmail,
};

#[async_trait]
pub trait ProvisioningBackend: AdminCheck {
    /// Fails if the email is already registered.
    async fn register_email(&self, caller: &PrincipalId, email: &str) -> Result<(), RemoteError>;

    /// Fails if the email is not registered, is claimed by a different
    /// principal, or `principal` is not the caller.
    async fn associate_email(
        &self,
        caller: &PrincipalId,
        email: &str,
        principal: &PrincipalId,
    ) -> Result<(), RemoteError>;

    /// Fails unless the email is associated with `principal`.
    async fn grant_admin_role_by_email(
        &self,
        caller: &PrincipalId,
        email: &str,
        principal: &PrincipalId,
    ) -> Result<(), RemoteError>;
}

#[async_trait]
impl<B> ProvisioningBackend for Arc<B>
where
    B: ProvisioningBackend + ?Sized,
{
    async fn register_email(&self, caller: &PrincipalId, email: &str) -> Result<(), RemoteError> {
        (**self).register_email(caller, email).await
    }

    async fn associate_email(
        &self,
        caller: &PrincipalId,
        email: &str,
        principal: &PrincipalId,
    ) -> Result<(), RemoteError> {
        (**self).associate_email(caller, email, principal).await
    }

    async fn grant_admin_role_by_email(
        &self,
        caller: &PrincipalId,
        email: &str,
        principal: &PrincipalId,
    ) -> Result<(), RemoteError> {
        (**self).grant_admin_role_by_email(caller, email, principal).await
    }
}

/// In-process backend holding a single [`AccessRegistry`] and its event log.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    registry: RwLock<AccessRegistry>,
    log: RwLock<Vec<AccessEvent>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn execute(&self, command: AccessCommand) -> Result<Vec<AccessEvent>, AccessError> {
        let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        let events = registry.handle(&command)?;
        for event in &events {
            registry.apply(event);
        }
        self.log
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(events.iter().cloned());
        Ok(events)
    }

    fn submit(&self, command: AccessCommand) -> Result<(), RemoteError> {
        match self.execute(command) {
            Ok(events) => {
                for event in &events {
                    tracing::info!(event_type = trellis_core::Event::event_type(event), "access registry updated");
                }
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "access registry rejected command");
                Err(RemoteError::new(e.to_string()))
            }
        }
    }

    pub fn caller_role(&self, caller: &PrincipalId) -> Role {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .role_of(caller)
    }

    /// Every event applied so far, in order.
    pub fn events(&self) -> Vec<AccessEvent> {
        self.log.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

fn parse_email(raw: &str) -> Result<EmailAddress, RemoteError> {
    EmailAddress::parse(raw).map_err(|_| RemoteError::new(AccessError::InvalidEmail.to_string()))
}

#[async_trait]
impl AdminCheck for InMemoryBackend {
    async fn is_caller_admin(&self, caller: &PrincipalId) -> Result<bool, RemoteError> {
        Ok(self
            .registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_admin(caller))
    }
}

#[async_trait]
impl ProvisioningBackend for InMemoryBackend {
    async fn register_email(&self, caller: &PrincipalId, email: &str) -> Result<(), RemoteError> {
        let email = parse_email(email)?;
        self.submit(AccessCommand::RegisterEmail(RegisterEmail {
            caller: caller.clone(),
            registration_id: RegistrationId::new(),
            email,
            occurred_at: Utc::now(),
        }))
    }

    async fn associate_email(
        &self,
        caller: &PrincipalId,
        email: &str,
        principal: &PrincipalId,
    ) -> Result<(), RemoteError> {
        let email = parse_email(email)?;
        self.submit(AccessCommand::AssociateEmail(AssociateEmail {
            caller: caller.clone(),
            email,
            principal: principal.clone(),
            occurred_at: Utc::now(),
        }))
    }

    async fn grant_admin_role_by_email(
        &self,
        caller: &PrincipalId,
        email: &str,
        principal: &PrincipalId,
    ) -> Result<(), RemoteError> {
        let email = parse_email(email)?;
        self.submit(AccessCommand::GrantAdminRoleByEmail(GrantAdminRoleByEmail {
            caller: caller.clone(),
            email,
            principal: principal.clone(),
            occurred_at: Utc::now(),
        }))
    }
}
