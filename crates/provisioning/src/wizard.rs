//! Admin provisioning wizard as a pure state machine.
//!
//! ```text
//! Login ──identity──▶ RegisterEmail ──ok──▶ AssociateEmail ──ok──▶ GrantAdmin ──ok──▶ Complete
//!   │                      │                      │                     │
//!   └──────────────── already admin (any time after login) ───────────────────────▶ Complete
//! ```
//!
//! Steps only move forward. A failed step stays current with its normalized
//! error so the operator can correct the input and resubmit. Nothing here does
//! IO: [`Wizard::transition`] returns the next state plus the effects the
//! caller must run, and the outcome of each effect comes back as a
//! [`WizardInput`].

use std::time::Duration;

use serde::{Deserialize, Serialize};

use trellis_auth::PrincipalId;
use trellis_core::EmailAddress;

use crate::normalize::{normalize, LOGIN_REQUIRED_MESSAGE};

pub const INVALID_EMAIL_MESSAGE: &str = "Please enter a valid email address.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WizardStep {
    Login,
    RegisterEmail,
    AssociateEmail,
    GrantAdmin,
    Complete,
}

impl WizardStep {
    pub fn next(self) -> Option<Self> {
        match self {
            WizardStep::Login => Some(WizardStep::RegisterEmail),
            WizardStep::RegisterEmail => Some(WizardStep::AssociateEmail),
            WizardStep::AssociateEmail => Some(WizardStep::GrantAdmin),
            WizardStep::GrantAdmin => Some(WizardStep::Complete),
            WizardStep::Complete => None,
        }
    }

    /// Steps backed by a remote mutation.
    pub fn is_mutation(self) -> bool {
        matches!(
            self,
            WizardStep::RegisterEmail | WizardStep::AssociateEmail | WizardStep::GrantAdmin
        )
    }

    pub fn is_terminal(self) -> bool {
        self == WizardStep::Complete
    }
}

impl core::fmt::Display for WizardStep {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            WizardStep::Login => "login",
            WizardStep::RegisterEmail => "register-email",
            WizardStep::AssociateEmail => "associate-email",
            WizardStep::GrantAdmin => "grant-admin",
            WizardStep::Complete => "complete",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WizardInput {
    /// Operator pressed the login button.
    LoginRequested,
    LoginFailed(String),
    IdentityChanged(Option<PrincipalId>),
    /// Result of the independent admin-status check.
    AdminStatusResolved(bool),
    /// Operator submitted the current step's form.
    Submit { email: String },
    StepSucceeded(WizardStep),
    StepFailed { step: WizardStep, message: String },
    RedirectElapsed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Login,
    CheckAdminStatus,
    RegisterEmail { email: EmailAddress },
    AssociateEmail { email: EmailAddress, principal: PrincipalId },
    GrantAdmin { email: EmailAddress, principal: PrincipalId },
    /// Mark the cached admin-role query stale.
    InvalidateAdminRole,
    ScheduleRedirect { after: Duration },
    Redirect { to: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub state: Wizard,
    pub effects: Vec<Effect>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wizard {
    step: WizardStep,
    principal: Option<PrincipalId>,
    email: Option<EmailAddress>,
    pending: bool,
    error: Option<String>,
    redirected: bool,
    redirect_delay: Duration,
    redirect_to: String,
}

impl Wizard {
    pub fn new(redirect_delay: Duration, redirect_to: impl Into<String>) -> Self {
        Self {
            step: WizardStep::Login,
            principal: None,
            email: None,
            pending: false,
            error: None,
            redirected: false,
            redirect_delay,
            redirect_to: redirect_to.into(),
        }
    }

    pub fn step(&self) -> WizardStep {
        self.step
    }

    pub fn principal(&self) -> Option<&PrincipalId> {
        self.principal.as_ref()
    }

    /// Email carried from the last accepted submission (form prefill).
    pub fn email(&self) -> Option<&EmailAddress> {
        self.email.as_ref()
    }

    /// Whether the current step's call is in flight; the trigger is disabled.
    pub fn is_pending(&self) -> bool {
        self.pending
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_redirected(&self) -> bool {
        self.redirected
    }

    /// Route the operator lands on once provisioning completes.
    pub fn redirect_target(&self) -> &str {
        &self.redirect_to
    }

    pub fn transition(&self, input: &WizardInput) -> Transition {
        let mut next = self.clone();
        let mut effects = Vec::new();

        match input {
            WizardInput::LoginRequested => {
                if self.step == WizardStep::Login && !self.pending {
                    next.pending = true;
                    next.error = None;
                    effects.push(Effect::Login);
                }
            }

            WizardInput::LoginFailed(message) => {
                if self.step == WizardStep::Login && self.pending {
                    next.pending = false;
                    next.error = Some(normalize(message.as_str()));
                }
            }

            WizardInput::IdentityChanged(principal) => {
                next.principal = principal.clone();
                if principal.is_some() && !self.step.is_terminal() {
                    if self.step == WizardStep::Login {
                        next.step = WizardStep::RegisterEmail;
                        next.pending = false;
                        next.error = None;
                    }
                    effects.push(Effect::CheckAdminStatus);
                } else if principal.is_none() && self.step == WizardStep::Login {
                    next.pending = false;
                }
            }

            WizardInput::AdminStatusResolved(is_admin) => {
                if *is_admin && self.principal.is_some() && !self.step.is_terminal() {
                    next.step = WizardStep::Complete;
                    next.pending = false;
                    next.error = None;
                    next.redirected = true;
                    effects.push(Effect::Redirect { to: self.redirect_to.clone() });
                }
            }

            WizardInput::Submit { email } => {
                if self.step.is_mutation() && !self.pending {
                    self.submit(&mut next, &mut effects, email);
                }
            }

            WizardInput::StepSucceeded(step) => {
                if *step == self.step && step.is_mutation() && self.pending {
                    next.pending = false;
                    next.error = None;
                    effects.push(Effect::InvalidateAdminRole);
                    if let Some(following) = step.next() {
                        next.step = following;
                        if following.is_terminal() {
                            effects.push(Effect::ScheduleRedirect { after: self.redirect_delay });
                        }
                    }
                }
            }

            WizardInput::StepFailed { step, message } => {
                if *step == self.step && self.pending {
                    next.pending = false;
                    next.error = Some(normalize(message.as_str()));
                }
            }

            WizardInput::RedirectElapsed => {
                if self.step.is_terminal() && !self.redirected {
                    next.redirected = true;
                    effects.push(Effect::Redirect { to: self.redirect_to.clone() });
                }
            }
        }

        Transition { state: next, effects }
    }

    fn submit(&self, next: &mut Wizard, effects: &mut Vec<Effect>, raw_email: &str) {
        let Some(principal) = self.principal.clone() else {
            next.error = Some(LOGIN_REQUIRED_MESSAGE.to_string());
            return;
        };
        let Ok(email) = EmailAddress::parse(raw_email) else {
            next.error = Some(INVALID_EMAIL_MESSAGE.to_string());
            return;
        };

        next.pending = true;
        next.error = None;
        next.email = Some(email.clone());

        effects.push(match self.step {
            WizardStep::RegisterEmail => Effect::RegisterEmail { email },
            WizardStep::AssociateEmail => Effect::AssociateEmail { email, principal },
            _ => Effect::GrantAdmin { email, principal },
        });
    }
}
