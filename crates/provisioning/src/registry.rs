//! Access registry aggregate: email registrations, email→principal
//! associations and the admin set.
//!
//! # Invariants
//! - An email is registered at most once.
//! - A registered email associates to exactly one principal, and only the
//!   principal itself may claim it.
//! - The admin role is granted by email and requires the email's association
//!   to match the principal being granted.
//! - While no admin exists any logged-in caller may register emails; after
//!   that only admins may.
//!
//! Failure texts match what the remote access-control layer reports; the
//! provisioning normalizer classifies them by substring.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use trellis_auth::{PrincipalId, Role};
use trellis_core::{Aggregate, AggregateRoot, EmailAddress, Event, RegistrationId};

pub const REGISTRY_ID: &str = "access-registry";

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AccessError {
    #[error("Unauthorized: Only users can {action}")]
    AnonymousCaller { action: &'static str },

    #[error("Unauthorized: Only admins can {action}")]
    AdminOnly { action: &'static str },

    #[error("Invalid email address")]
    InvalidEmail,

    #[error("Email already registered")]
    EmailAlreadyRegistered,

    #[error("Email not registered")]
    EmailNotRegistered,

    #[error("Email already associated with another principal")]
    EmailAlreadyAssociated,

    #[error("Can only associate your own principal")]
    ForeignPrincipal,

    #[error("Email not yet associated")]
    EmailNotAssociated,

    #[error("Auth failed: principal does not match the email association")]
    PrincipalMismatch,
}

// ─────────────────────────────────────────────────────────────────────────────
// Records
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailRegistration {
    pub registration_id: RegistrationId,
    pub registered_by: PrincipalId,
    pub registered_at: DateTime<Utc>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterEmail {
    pub caller: PrincipalId,
    pub registration_id: RegistrationId,
    pub email: EmailAddress,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssociateEmail {
    pub caller: PrincipalId,
    pub email: EmailAddress,
    pub principal: PrincipalId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrantAdminRoleByEmail {
    pub caller: PrincipalId,
    pub email: EmailAddress,
    pub principal: PrincipalId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AccessCommand {
    RegisterEmail(RegisterEmail),
    AssociateEmail(AssociateEmail),
    GrantAdminRoleByEmail(GrantAdminRoleByEmail),
}

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailRegistered {
    pub registration_id: RegistrationId,
    pub email: EmailAddress,
    pub registered_by: PrincipalId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailAssociated {
    pub email: EmailAddress,
    pub principal: PrincipalId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminRoleGranted {
    pub email: EmailAddress,
    pub principal: PrincipalId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessEvent {
    EmailRegistered(EmailRegistered),
    EmailAssociated(EmailAssociated),
    AdminRoleGranted(AdminRoleGranted),
}

impl Event for AccessEvent {
    fn event_type(&self) -> &'static str {
        match self {
            AccessEvent::EmailRegistered(_) => "access.email.registered",
            AccessEvent::EmailAssociated(_) => "access.email.associated",
            AccessEvent::AdminRoleGranted(_) => "access.admin.granted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            AccessEvent::EmailRegistered(e) => e.occurred_at,
            AccessEvent::EmailAssociated(e) => e.occurred_at,
            AccessEvent::AdminRoleGranted(e) => e.occurred_at,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Aggregate
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct AccessRegistry {
    id: &'static str,
    registrations: BTreeMap<EmailAddress, EmailRegistration>,
    associations: BTreeMap<EmailAddress, PrincipalId>,
    admins: BTreeSet<PrincipalId>,
    version: u64,
}

impl Default for AccessRegistry {
    fn default() -> Self {
        Self {
            id: REGISTRY_ID,
            registrations: BTreeMap::new(),
            associations: BTreeMap::new(),
            admins: BTreeSet::new(),
            version: 0,
        }
    }
}

impl AccessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_admin(&self, principal: &PrincipalId) -> bool {
        self.admins.contains(principal)
    }

    pub fn role_of(&self, principal: &PrincipalId) -> Role {
        if principal.is_anonymous() {
            Role::GUEST
        } else if self.is_admin(principal) {
            Role::ADMIN
        } else {
            Role::USER
        }
    }

    pub fn registration(&self, email: &EmailAddress) -> Option<&EmailRegistration> {
        self.registrations.get(email)
    }

    pub fn association(&self, email: &EmailAddress) -> Option<&PrincipalId> {
        self.associations.get(email)
    }

    pub fn admin_count(&self) -> usize {
        self.admins.len()
    }

    fn ensure_user(caller: &PrincipalId, action: &'static str) -> Result<(), AccessError> {
        if caller.is_anonymous() {
            return Err(AccessError::AnonymousCaller { action });
        }
        Ok(())
    }
}

impl AggregateRoot for AccessRegistry {
    type Id = &'static str;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl Aggregate for AccessRegistry {
    type Command = AccessCommand;
    type Event = AccessEvent;
    type Error = AccessError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            AccessEvent::EmailRegistered(e) => {
                self.registrations.insert(
                    e.email.clone(),
                    EmailRegistration {
                        registration_id: e.registration_id,
                        registered_by: e.registered_by.clone(),
                        registered_at: e.occurred_at,
                    },
                );
            }
            AccessEvent::EmailAssociated(e) => {
                self.associations.insert(e.email.clone(), e.principal.clone());
            }
            AccessEvent::AdminRoleGranted(e) => {
                self.admins.insert(e.principal.clone());
            }
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            AccessCommand::RegisterEmail(cmd) => self.handle_register(cmd),
            AccessCommand::AssociateEmail(cmd) => self.handle_associate(cmd),
            AccessCommand::GrantAdminRoleByEmail(cmd) => self.handle_grant(cmd),
        }
    }
}

impl AccessRegistry {
    fn handle_register(&self, cmd: &RegisterEmail) -> Result<Vec<AccessEvent>, AccessError> {
        Self::ensure_user(&cmd.caller, "register emails")?;

        if !self.admins.is_empty() && !self.is_admin(&cmd.caller) {
            return Err(AccessError::AdminOnly { action: "register emails" });
        }
        if self.registrations.contains_key(&cmd.email) {
            return Err(AccessError::EmailAlreadyRegistered);
        }

        Ok(vec![AccessEvent::EmailRegistered(EmailRegistered {
            registration_id: cmd.registration_id,
            email: cmd.email.clone(),
            registered_by: cmd.caller.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_associate(&self, cmd: &AssociateEmail) -> Result<Vec<AccessEvent>, AccessError> {
        Self::ensure_user(&cmd.caller, "associate emails")?;

        if !self.registrations.contains_key(&cmd.email) {
            return Err(AccessError::EmailNotRegistered);
        }
        match self.associations.get(&cmd.email) {
            Some(existing) if existing != &cmd.principal => {
                return Err(AccessError::EmailAlreadyAssociated);
            }
            Some(_) => {
                if cmd.caller != cmd.principal {
                    return Err(AccessError::ForeignPrincipal);
                }
                // Re-association by the same principal changes nothing.
                return Ok(vec![]);
            }
            None => {}
        }
        if cmd.caller != cmd.principal {
            return Err(AccessError::ForeignPrincipal);
        }

        Ok(vec![AccessEvent::EmailAssociated(EmailAssociated {
            email: cmd.email.clone(),
            principal: cmd.principal.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_grant(&self, cmd: &GrantAdminRoleByEmail) -> Result<Vec<AccessEvent>, AccessError> {
        Self::ensure_user(&cmd.caller, "grant admin roles")?;

        let Some(associated) = self.associations.get(&cmd.email) else {
            return Err(AccessError::EmailNotAssociated);
        };
        if associated != &cmd.principal {
            return Err(AccessError::PrincipalMismatch);
        }
        if cmd.caller != cmd.principal && !self.is_admin(&cmd.caller) {
            return Err(AccessError::AdminOnly {
                action: "grant the admin role to another principal",
            });
        }
        if self.is_admin(&cmd.principal) {
            return Ok(vec![]);
        }

        Ok(vec![AccessEvent::AdminRoleGranted(AdminRoleGranted {
            email: cmd.email.clone(),
            principal: cmd.principal.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    fn p(raw: &str) -> PrincipalId {
        PrincipalId::parse(raw).unwrap()
    }

    fn email(raw: &str) -> EmailAddress {
        EmailAddress::parse(raw).unwrap()
    }

    fn run(registry: &mut AccessRegistry, cmd: AccessCommand) -> Result<Vec<AccessEvent>, AccessError> {
        let events = registry.handle(&cmd)?;
        for event in &events {
            registry.apply(event);
        }
        Ok(events)
    }

    fn register(caller: &PrincipalId, address: &str) -> AccessCommand {
        AccessCommand::RegisterEmail(RegisterEmail {
            caller: caller.clone(),
            registration_id: RegistrationId::new(),
            email: email(address),
            occurred_at: now(),
        })
    }

    fn associate(caller: &PrincipalId, address: &str, principal: &PrincipalId) -> AccessCommand {
        AccessCommand::AssociateEmail(AssociateEmail {
            caller: caller.clone(),
            email: email(address),
            principal: principal.clone(),
            occurred_at: now(),
        })
    }

    fn grant(caller: &PrincipalId, address: &str, principal: &PrincipalId) -> AccessCommand {
        AccessCommand::GrantAdminRoleByEmail(GrantAdminRoleByEmail {
            caller: caller.clone(),
            email: email(address),
            principal: principal.clone(),
            occurred_at: now(),
        })
    }

    #[test]
    fn full_provisioning_sequence() {
        let p1 = p("aaaaa-aa");
        let mut registry = AccessRegistry::new();

        let events = run(&mut registry, register(&p1, "a@b.com")).unwrap();
        assert_eq!(events[0].event_type(), "access.email.registered");
        run(&mut registry, associate(&p1, "a@b.com", &p1)).unwrap();
        run(&mut registry, grant(&p1, "a@b.com", &p1)).unwrap();

        assert!(registry.is_admin(&p1));
        assert_eq!(registry.role_of(&p1), Role::ADMIN);
        assert_eq!(registry.version(), 3);
        assert_eq!(registry.association(&email("a@b.com")), Some(&p1));
    }

    #[test]
    fn register_twice_fails() {
        let p1 = p("aaaaa-aa");
        let mut registry = AccessRegistry::new();

        run(&mut registry, register(&p1, "a@b.com")).unwrap();
        let err = run(&mut registry, register(&p1, "A@B.com")).unwrap_err();
        assert_eq!(err, AccessError::EmailAlreadyRegistered);
        assert_eq!(registry.version(), 1);
    }

    #[test]
    fn anonymous_cannot_register() {
        let registry = AccessRegistry::new();
        let err = registry.handle(&register(&PrincipalId::anonymous(), "a@b.com")).unwrap_err();
        assert_eq!(err.to_string(), "Unauthorized: Only users can register emails");
    }

    #[test]
    fn registration_closes_after_first_admin() {
        let p1 = p("aaaaa-aa");
        let p2 = p("bbbbb-bb");
        let mut registry = AccessRegistry::new();
        run(&mut registry, register(&p1, "a@b.com")).unwrap();
        run(&mut registry, associate(&p1, "a@b.com", &p1)).unwrap();
        run(&mut registry, grant(&p1, "a@b.com", &p1)).unwrap();

        let err = run(&mut registry, register(&p2, "c@d.com")).unwrap_err();
        assert_eq!(err.to_string(), "Unauthorized: Only admins can register emails");

        run(&mut registry, register(&p1, "c@d.com")).unwrap();
        assert_eq!(registry.registration(&email("c@d.com")).map(|r| &r.registered_by), Some(&p1));
    }

    #[test]
    fn associate_requires_registration() {
        let p1 = p("aaaaa-aa");
        let registry = AccessRegistry::new();
        let err = registry.handle(&associate(&p1, "a@b.com", &p1)).unwrap_err();
        assert_eq!(err, AccessError::EmailNotRegistered);
    }

    #[test]
    fn associate_only_own_principal() {
        let p1 = p("aaaaa-aa");
        let p2 = p("bbbbb-bb");
        let mut registry = AccessRegistry::new();
        run(&mut registry, register(&p1, "a@b.com")).unwrap();

        let err = run(&mut registry, associate(&p2, "a@b.com", &p1)).unwrap_err();
        assert_eq!(err, AccessError::ForeignPrincipal);
    }

    #[test]
    fn claimed_email_cannot_move() {
        let p1 = p("aaaaa-aa");
        let p2 = p("bbbbb-bb");
        let mut registry = AccessRegistry::new();
        run(&mut registry, register(&p1, "a@b.com")).unwrap();
        run(&mut registry, associate(&p1, "a@b.com", &p1)).unwrap();

        let err = run(&mut registry, associate(&p2, "a@b.com", &p2)).unwrap_err();
        assert_eq!(err, AccessError::EmailAlreadyAssociated);

        // Same principal again is a no-op.
        assert!(run(&mut registry, associate(&p1, "a@b.com", &p1)).unwrap().is_empty());
        assert_eq!(registry.version(), 2);
    }

    #[test]
    fn grant_requires_matching_association() {
        let p1 = p("aaaaa-aa");
        let p2 = p("bbbbb-bb");
        let mut registry = AccessRegistry::new();
        run(&mut registry, register(&p1, "a@b.com")).unwrap();

        let err = run(&mut registry, grant(&p1, "a@b.com", &p1)).unwrap_err();
        assert_eq!(err, AccessError::EmailNotAssociated);

        run(&mut registry, associate(&p1, "a@b.com", &p1)).unwrap();
        let err = run(&mut registry, grant(&p2, "a@b.com", &p2)).unwrap_err();
        assert_eq!(err, AccessError::PrincipalMismatch);
        assert!(err.to_string().contains("Auth failed"));
        assert!(!registry.is_admin(&p2));
    }

    #[test]
    fn non_admin_cannot_grant_someone_else() {
        let p1 = p("aaaaa-aa");
        let p2 = p("bbbbb-bb");
        let mut registry = AccessRegistry::new();
        run(&mut registry, register(&p1, "a@b.com")).unwrap();
        run(&mut registry, associate(&p1, "a@b.com", &p1)).unwrap();

        let err = run(&mut registry, grant(&p2, "a@b.com", &p1)).unwrap_err();
        assert!(matches!(err, AccessError::AdminOnly { .. }));
    }

    #[test]
    fn regrant_is_idempotent() {
        let p1 = p("aaaaa-aa");
        let mut registry = AccessRegistry::new();
        run(&mut registry, register(&p1, "a@b.com")).unwrap();
        run(&mut registry, associate(&p1, "a@b.com", &p1)).unwrap();
        run(&mut registry, grant(&p1, "a@b.com", &p1)).unwrap();

        assert!(run(&mut registry, grant(&p1, "a@b.com", &p1)).unwrap().is_empty());
        assert_eq!(registry.admin_count(), 1);
    }

    #[test]
    fn anonymous_is_guest() {
        assert_eq!(AccessRegistry::new().role_of(&PrincipalId::anonymous()), Role::GUEST);
    }
}
