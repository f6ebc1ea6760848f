//! Runs the wizard's effects against the session, the backend and the
//! admin-role query.
//!
//! Effects execute strictly in order; each outcome is fed back into the
//! wizard before the next input is considered. There is no retry: a failed
//! call becomes a `StepFailed` input and the operator decides what to do.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use trellis_auth::{AdminAccessQuery, PrincipalId, RemoteError, SessionProvider};

use crate::backend::ProvisioningBackend;
use crate::config::ProvisioningConfig;
use crate::wizard::{Effect, Wizard, WizardInput, WizardStep};

/// A redirect the wizard asked for after a delay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledRedirect {
    pub to: String,
    pub after: Duration,
}

pub struct ProvisioningDriver<B, S> {
    backend: Arc<B>,
    session: S,
    access: Arc<AdminAccessQuery<Arc<B>>>,
    wizard: Wizard,
    scheduled: Option<ScheduledRedirect>,
    redirected_to: Option<String>,
}

impl<B, S> ProvisioningDriver<B, S>
where
    B: ProvisioningBackend,
    S: SessionProvider,
{
    pub fn new(config: &ProvisioningConfig, backend: Arc<B>, session: S) -> Self {
        let access = Arc::new(AdminAccessQuery::new(backend.clone()));
        Self::with_access(config, backend, session, access)
    }

    /// Share an existing admin-role query (and its cache) with route guards.
    pub fn with_access(
        config: &ProvisioningConfig,
        backend: Arc<B>,
        session: S,
        access: Arc<AdminAccessQuery<Arc<B>>>,
    ) -> Self {
        Self {
            backend,
            session,
            access,
            wizard: config.wizard(),
            scheduled: None,
            redirected_to: None,
        }
    }

    pub fn wizard(&self) -> &Wizard {
        &self.wizard
    }

    pub fn access(&self) -> &Arc<AdminAccessQuery<Arc<B>>> {
        &self.access
    }

    pub fn pending_redirect(&self) -> Option<&ScheduledRedirect> {
        self.scheduled.as_ref()
    }

    /// Where the operator has been sent, once a redirect fired.
    pub fn redirected_to(&self) -> Option<&str> {
        self.redirected_to.as_deref()
    }

    /// Pick up an identity that already exists when the page loads.
    pub async fn start(&mut self) -> &Wizard {
        let principal = self.session.identity().await.map(|i| i.principal);
        if principal.is_some() {
            self.dispatch(WizardInput::IdentityChanged(principal)).await;
        }
        &self.wizard
    }

    pub async fn dispatch(&mut self, input: WizardInput) -> &Wizard {
        let mut queue = VecDeque::from([input]);

        while let Some(input) = queue.pop_front() {
            let before = self.wizard.step();
            let transition = self.wizard.transition(&input);
            self.wizard = transition.state;

            if self.wizard.step() != before {
                tracing::info!(from = %before, to = %self.wizard.step(), "provisioning step advanced");
            }
            if let Some(error) = self.wizard.error() {
                tracing::debug!(step = %self.wizard.step(), error, "provisioning step reported error");
            }

            for effect in transition.effects {
                if let Some(follow_up) = self.run(effect).await {
                    queue.push_back(follow_up);
                }
            }
        }

        &self.wizard
    }

    /// Wait out a scheduled redirect, then fire it.
    pub async fn wait_for_redirect(&mut self) -> Option<&str> {
        let scheduled = self.scheduled.take()?;
        tokio::time::sleep(scheduled.after).await;
        self.dispatch(WizardInput::RedirectElapsed).await;
        self.redirected_to()
    }

    fn caller(&self) -> PrincipalId {
        self.wizard
            .principal()
            .cloned()
            .unwrap_or_else(PrincipalId::anonymous)
    }

    async fn run(&mut self, effect: Effect) -> Option<WizardInput> {
        match effect {
            Effect::Login => match self.session.login().await {
                Ok(identity) => Some(WizardInput::IdentityChanged(Some(identity.principal))),
                Err(e) => {
                    tracing::warn!(error = %e, "login failed");
                    Some(WizardInput::LoginFailed(e.to_string()))
                }
            },

            Effect::CheckAdminStatus => {
                let identity = self.session.identity().await;
                let access = self.access.resolve(identity.as_ref()).await;
                Some(WizardInput::AdminStatusResolved(access.grants_admin()))
            }

            Effect::RegisterEmail { email } => {
                let caller = self.caller();
                let result = self.backend.register_email(&caller, email.as_str()).await;
                Some(Self::outcome(WizardStep::RegisterEmail, result))
            }

            Effect::AssociateEmail { email, principal } => {
                let caller = self.caller();
                let result = self
                    .backend
                    .associate_email(&caller, email.as_str(), &principal)
                    .await;
                Some(Self::outcome(WizardStep::AssociateEmail, result))
            }

            Effect::GrantAdmin { email, principal } => {
                let caller = self.caller();
                let result = self
                    .backend
                    .grant_admin_role_by_email(&caller, email.as_str(), &principal)
                    .await;
                Some(Self::outcome(WizardStep::GrantAdmin, result))
            }

            Effect::InvalidateAdminRole => {
                self.access.invalidate();
                None
            }

            Effect::ScheduleRedirect { after } => {
                self.scheduled = Some(ScheduledRedirect {
                    to: self.wizard.redirect_target().to_string(),
                    after,
                });
                None
            }

            Effect::Redirect { to } => {
                tracing::info!(%to, "provisioning complete; redirecting");
                self.scheduled = None;
                self.redirected_to = Some(to);
                None
            }
        }
    }

    fn outcome(step: WizardStep, result: Result<(), RemoteError>) -> WizardInput {
        match result {
            Ok(()) => {
                tracing::info!(%step, "provisioning call succeeded");
                WizardInput::StepSucceeded(step)
            }
            Err(e) => {
                tracing::warn!(%step, error = %e, "provisioning call failed");
                WizardInput::StepFailed {
                    step,
                    message: e.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;
    use trellis_auth::{SessionError, StaticSession};

    fn p1() -> PrincipalId {
        PrincipalId::parse("aaaaa-aa").unwrap()
    }

    fn config() -> ProvisioningConfig {
        ProvisioningConfig {
            redirect_delay: Duration::from_millis(1),
            ..ProvisioningConfig::default()
        }
    }

    #[tokio::test]
    async fn login_advances_to_register() {
        let backend = Arc::new(InMemoryBackend::new());
        let mut driver = ProvisioningDriver::new(&config(), backend, StaticSession::new(p1()));

        let wizard = driver.dispatch(WizardInput::LoginRequested).await;

        assert_eq!(wizard.step(), WizardStep::RegisterEmail);
        assert_eq!(wizard.principal(), Some(&p1()));
        assert!(!wizard.is_pending());
    }

    #[tokio::test]
    async fn cancelled_login_is_reported_inline() {
        let backend = Arc::new(InMemoryBackend::new());
        let session = StaticSession::failing(SessionError::Cancelled);
        let mut driver = ProvisioningDriver::new(&config(), backend, session);

        let wizard = driver.dispatch(WizardInput::LoginRequested).await;

        assert_eq!(wizard.step(), WizardStep::Login);
        assert_eq!(wizard.error(), Some("login was cancelled"));
    }

    #[tokio::test]
    async fn start_picks_up_existing_identity() {
        let backend = Arc::new(InMemoryBackend::new());
        let mut driver =
            ProvisioningDriver::new(&config(), backend, StaticSession::logged_in(p1()));

        assert_eq!(driver.start().await.step(), WizardStep::RegisterEmail);
    }

    #[tokio::test]
    async fn start_without_identity_stays_on_login() {
        let backend = Arc::new(InMemoryBackend::new());
        let mut driver = ProvisioningDriver::new(&config(), backend, StaticSession::new(p1()));

        let wizard = driver.start().await;
        assert_eq!(wizard.step(), WizardStep::Login);
        assert_eq!(wizard.error(), None);
    }

    #[tokio::test]
    async fn redirect_fires_after_delay() {
        let backend = Arc::new(InMemoryBackend::new());
        let mut driver =
            ProvisioningDriver::new(&config(), backend, StaticSession::logged_in(p1()));
        driver.start().await;

        for step in [WizardStep::RegisterEmail, WizardStep::AssociateEmail, WizardStep::GrantAdmin] {
            let wizard = driver
                .dispatch(WizardInput::Submit { email: "a@b.com".to_string() })
                .await;
            assert_ne!(wizard.step(), step);
        }

        assert_eq!(driver.wizard().step(), WizardStep::Complete);
        assert_eq!(
            driver.pending_redirect(),
            Some(&ScheduledRedirect { to: "/admin".to_string(), after: Duration::from_millis(1) })
        );
        assert_eq!(driver.wait_for_redirect().await, Some("/admin"));
        assert!(driver.pending_redirect().is_none());
    }
}
