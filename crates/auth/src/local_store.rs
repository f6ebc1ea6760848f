//! Local mock authentication store for standalone (control panel) deployments.
//!
//! Accounts and the current session live in a single JSON document on disk,
//! the equivalent of browser local storage. Lookups are linear scans; the
//! store is meant for a handful of operators.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockWriteGuard};

use anyhow::Context;
use argon2::password_hash::{
    rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
};
use argon2::Argon2;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use trellis_core::{DomainError, EmailAddress};

use crate::{AdminCheck, Identity, PrincipalId, RemoteError, Role, SessionError, SessionProvider};

const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Error)]
pub enum AuthStoreError {
    #[error("{0}")]
    Validation(#[from] DomainError),

    #[error("an account already exists for {0}")]
    AccountExists(EmailAddress),

    #[error("no account exists for {0}")]
    UnknownAccount(EmailAddress),

    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("password hashing failed: {0}")]
    Hash(String),

    #[error("auth store persistence failed: {0:#}")]
    Persistence(anyhow::Error),
}

/// A locally stored operator account.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalAccount {
    pub email: EmailAddress,
    pub principal: PrincipalId,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    password_digest: String,
}

impl core::fmt::Debug for LocalAccount {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LocalAccount")
            .field("email", &self.email)
            .field("principal", &self.principal)
            .field("role", &self.role)
            .field("created_at", &self.created_at)
            .field("password_digest", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct AuthDocument {
    accounts: Vec<LocalAccount>,
    session: Option<EmailAddress>,
}

impl AuthDocument {
    fn find(&self, email: &EmailAddress) -> Option<&LocalAccount> {
        self.accounts.iter().find(|a| &a.email == email)
    }

    fn current(&self) -> Option<&LocalAccount> {
        self.session.as_ref().and_then(|email| self.find(email))
    }
}

/// JSON-document backed account store.
#[derive(Debug)]
pub struct LocalAuthStore {
    path: Option<PathBuf>,
    doc: RwLock<AuthDocument>,
}

impl LocalAuthStore {
    /// Open (or start) the store persisted at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, AuthStoreError> {
        let path = path.into();
        let doc = load_document(&path).map_err(AuthStoreError::Persistence)?;
        tracing::debug!(path = %path.display(), accounts = doc.accounts.len(), "local auth store opened");
        Ok(Self {
            path: Some(path),
            doc: RwLock::new(doc),
        })
    }

    /// Store that never touches the filesystem.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            doc: RwLock::new(AuthDocument::default()),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, AuthDocument> {
        self.doc.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn read(&self) -> AuthDocument {
        self.doc.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn persist(&self, doc: &AuthDocument) -> Result<(), AuthStoreError> {
        match &self.path {
            Some(path) => save_document(path, doc).map_err(AuthStoreError::Persistence),
            None => Ok(()),
        }
    }

    /// Persist `next` and only then make it the in-memory document.
    fn commit(
        &self,
        doc: &mut RwLockWriteGuard<'_, AuthDocument>,
        next: AuthDocument,
    ) -> Result<(), AuthStoreError> {
        self.persist(&next)?;
        **doc = next;
        Ok(())
    }

    /// Create an account with the `user` role. Does not start a session.
    pub fn sign_up(&self, email: &str, password: &str) -> Result<LocalAccount, AuthStoreError> {
        let email = EmailAddress::parse(email)?;
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(DomainError::validation(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            ))
            .into());
        }

        let mut doc = self.write();
        if doc.find(&email).is_some() {
            return Err(AuthStoreError::AccountExists(email));
        }

        let account = LocalAccount {
            email,
            principal: mint_principal()?,
            role: Role::USER,
            created_at: Utc::now(),
            password_digest: hash_password(password)?,
        };
        let mut next = doc.clone();
        next.accounts.push(account.clone());
        self.commit(&mut doc, next)?;

        tracing::info!(email = %account.email, principal = %account.principal, "local account created");
        Ok(account)
    }

    /// Verify credentials and make the account the current session.
    pub fn sign_in(&self, email: &str, password: &str) -> Result<Identity, AuthStoreError> {
        let email = EmailAddress::parse(email)?;

        let mut doc = self.write();
        let account = doc.find(&email).ok_or(AuthStoreError::InvalidCredentials)?;
        if !verify_password(password, &account.password_digest)? {
            tracing::warn!(%email, "local sign-in rejected");
            return Err(AuthStoreError::InvalidCredentials);
        }

        let identity = Identity::new(account.principal.clone());
        let mut next = doc.clone();
        next.session = Some(email);
        self.commit(&mut doc, next)?;
        Ok(identity)
    }

    pub fn sign_out(&self) -> Result<(), AuthStoreError> {
        let mut doc = self.write();
        let mut next = doc.clone();
        next.session = None;
        self.commit(&mut doc, next)
    }

    pub fn current(&self) -> Option<LocalAccount> {
        self.read().current().cloned()
    }

    pub fn accounts(&self) -> Vec<LocalAccount> {
        self.read().accounts
    }

    pub fn set_role(&self, email: &str, role: Role) -> Result<(), AuthStoreError> {
        let email = EmailAddress::parse(email)?;

        let mut doc = self.write();
        let mut next = doc.clone();
        let account = next
            .accounts
            .iter_mut()
            .find(|a| a.email == email)
            .ok_or_else(|| AuthStoreError::UnknownAccount(email.clone()))?;
        account.role = role;
        self.commit(&mut doc, next)?;

        tracing::info!(%email, "local account role updated");
        Ok(())
    }
}

#[async_trait]
impl SessionProvider for LocalAuthStore {
    async fn identity(&self) -> Option<Identity> {
        self.current().map(|a| Identity::new(a.principal))
    }

    /// Resumes the persisted session; new sessions start with `sign_in`.
    async fn login(&self) -> Result<Identity, SessionError> {
        self.identity()
            .await
            .ok_or_else(|| SessionError::Failed("no stored session; sign in first".to_string()))
    }

    async fn logout(&self) {
        if let Err(e) = self.sign_out() {
            tracing::error!(error = %e, "failed to clear local session");
        }
    }
}

#[async_trait]
impl AdminCheck for LocalAuthStore {
    async fn is_caller_admin(&self, caller: &PrincipalId) -> Result<bool, RemoteError> {
        if caller.is_anonymous() {
            return Err(RemoteError::new("Unauthorized: Only users can check admin status"));
        }
        let doc = self.read();
        Ok(doc
            .accounts
            .iter()
            .any(|a| &a.principal == caller && a.role.is_admin()))
    }
}

/// Grouped lowercase hex of a fresh UUIDv7; always a valid principal.
fn mint_principal() -> Result<PrincipalId, AuthStoreError> {
    let hex = Uuid::now_v7().simple().to_string();
    let grouped = hex
        .as_bytes()
        .chunks(5)
        .map(|c| String::from_utf8_lossy(c).into_owned())
        .collect::<Vec<_>>()
        .join("-");
    Ok(PrincipalId::parse(&grouped)?)
}

fn hash_password(password: &str) -> Result<String, AuthStoreError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AuthStoreError::Hash(e.to_string()))
}

fn verify_password(password: &str, digest: &str) -> Result<bool, AuthStoreError> {
    let parsed = PasswordHash::new(digest).map_err(|e| AuthStoreError::Hash(e.to_string()))?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(AuthStoreError::Hash(e.to_string())),
    }
}

fn load_document(path: &Path) -> anyhow::Result<AuthDocument> {
    if !path.exists() {
        return Ok(AuthDocument::default());
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read auth store at {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse auth store at {}", path.display()))
}

fn save_document(path: &Path, doc: &AuthDocument) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(doc).context("failed to serialize auth store")?;

    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).with_context(|| format!("failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("failed to replace {}", path.display()))?;
    Ok(())
}
