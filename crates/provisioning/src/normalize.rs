//! Remote failure normalization.
//!
//! The remote access-control layer reports failures as free text. This module
//! turns that text into a fixed operator-facing message by substring matching
//! against an ordered rule table; the first matching rule wins.
//!
//! The substrings are an unversioned contract with the remote layer. If its
//! wording changes, classification silently falls through to
//! [`ErrorKind::Unclassified`].

use core::fmt::Display;

use serde::Serialize;

pub const ADMIN_REQUIRED_MESSAGE: &str =
    "Access denied: administrator privileges are required for this action.";
pub const LOGIN_REQUIRED_MESSAGE: &str =
    "Access denied: please log in with your identity provider to continue.";
pub const PERMISSION_DENIED_MESSAGE: &str =
    "Access denied: you do not have permission to perform this action.";
pub const EMAIL_NOT_REGISTERED_MESSAGE: &str =
    "This email address has not been registered yet. Please register it first.";
pub const EMAIL_ALREADY_ASSOCIATED_MESSAGE: &str =
    "This email address is already associated with another principal.";
pub const EMAIL_NOT_ASSOCIATED_MESSAGE: &str =
    "This email address has not been associated with a principal yet. Please associate it first.";
pub const PRINCIPAL_MISMATCH_MESSAGE: &str =
    "Authentication failed: your principal does not match the one associated with this email.";
pub const SELF_ASSOCIATION_ONLY_MESSAGE: &str =
    "You can only associate your own principal with an email address.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionReason {
    AdminRequired,
    LoginRequired,
    Generic,
}

/// Closed taxonomy of provisioning failures.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "detail")]
pub enum ErrorKind {
    PermissionDenied { reason: PermissionReason },
    EmailNotRegistered,
    EmailAlreadyAssociated,
    EmailNotAssociated,
    PrincipalMismatch,
    SelfAssociationOnly,
    Unclassified(String),
}

/// Ordered rules: every pattern of a rule must be present for it to match.
const RULES: [(&[&str], ErrorKind); 8] = [
    (
        &["Unauthorized", "Only admins"],
        ErrorKind::PermissionDenied { reason: PermissionReason::AdminRequired },
    ),
    (
        &["Unauthorized", "Only users"],
        ErrorKind::PermissionDenied { reason: PermissionReason::LoginRequired },
    ),
    (
        &["Unauthorized"],
        ErrorKind::PermissionDenied { reason: PermissionReason::Generic },
    ),
    (&["Email not registered"], ErrorKind::EmailNotRegistered),
    (&["Email already associated"], ErrorKind::EmailAlreadyAssociated),
    (&["Email not yet associated"], ErrorKind::EmailNotAssociated),
    (&["Auth failed"], ErrorKind::PrincipalMismatch),
    (&["Can only associate your own principal"], ErrorKind::SelfAssociationOnly),
];

const AUTHORIZATION_PATTERNS: [&str; 6] = [
    "Unauthorized",
    "permission",
    "Auth failed",
    "Email not registered",
    "Email already associated",
    "Email not yet associated",
];

impl ErrorKind {
    pub fn from_message(text: &str) -> Self {
        RULES
            .iter()
            .find(|(patterns, _)| patterns.iter().all(|p| text.contains(p)))
            .map(|(_, kind)| kind.clone())
            .unwrap_or_else(|| ErrorKind::Unclassified(text.to_string()))
    }

    /// Operator-facing text. Unclassified errors pass through unmodified.
    pub fn message(&self) -> &str {
        match self {
            ErrorKind::PermissionDenied { reason } => match reason {
                PermissionReason::AdminRequired => ADMIN_REQUIRED_MESSAGE,
                PermissionReason::LoginRequired => LOGIN_REQUIRED_MESSAGE,
                PermissionReason::Generic => PERMISSION_DENIED_MESSAGE,
            },
            ErrorKind::EmailNotRegistered => EMAIL_NOT_REGISTERED_MESSAGE,
            ErrorKind::EmailAlreadyAssociated => EMAIL_ALREADY_ASSOCIATED_MESSAGE,
            ErrorKind::EmailNotAssociated => EMAIL_NOT_ASSOCIATED_MESSAGE,
            ErrorKind::PrincipalMismatch => PRINCIPAL_MISMATCH_MESSAGE,
            ErrorKind::SelfAssociationOnly => SELF_ASSOCIATION_ONLY_MESSAGE,
            ErrorKind::Unclassified(raw) => raw,
        }
    }
}

/// Map any error to its operator-facing message.
pub fn normalize<E: Display + ?Sized>(error: &E) -> String {
    ErrorKind::from_message(&error.to_string()).message().to_string()
}

/// Whether the error is authorization related.
pub fn classify<E: Display + ?Sized>(error: &E) -> bool {
    let text = error.to_string();
    AUTHORIZATION_PATTERNS.iter().any(|p| text.contains(p))
}
