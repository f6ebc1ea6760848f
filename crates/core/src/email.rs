//! Email address value object.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::value_object::ValueObject;

/// A normalized email address (trimmed, lower-cased).
///
/// Validation is deliberately shallow: one `@` with a non-empty local part and
/// a domain containing no whitespace. Deliverability is not checked.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EmailAddress(String);

impl EmailAddress {
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let normalized = raw.trim().to_lowercase();

        let Some((local, domain)) = normalized.split_once('@') else {
            return Err(DomainError::validation("email must contain '@'"));
        };
        if local.is_empty() || domain.is_empty() {
            return Err(DomainError::validation("email local part and domain must be non-empty"));
        }
        if domain.contains('@') {
            return Err(DomainError::validation("email must contain a single '@'"));
        }
        if normalized.chars().any(char::is_whitespace) {
            return Err(DomainError::validation("email must not contain whitespace"));
        }

        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl ValueObject for EmailAddress {}

impl core::fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for EmailAddress {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for EmailAddress {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<EmailAddress> for String {
    fn from(value: EmailAddress) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn normalizes_case_and_whitespace() {
        let email = EmailAddress::parse("  Alice@Example.ORG ").unwrap();
        assert_eq!(email.as_str(), "alice@example.org");
    }

    #[test]
    fn rejects_missing_at() {
        assert!(matches!(
            EmailAddress::parse("alice.example.org"),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn rejects_empty_parts_and_double_at() {
        assert!(EmailAddress::parse("@example.org").is_err());
        assert!(EmailAddress::parse("alice@").is_err());
        assert!(EmailAddress::parse("a@b@c").is_err());
        assert!(EmailAddress::parse("a b@c.org").is_err());
    }

    proptest! {
        #[test]
        fn parse_is_idempotent(local in "[a-zA-Z0-9._]{1,16}", domain in "[a-zA-Z0-9]{1,12}\\.[a-z]{2,4}") {
            let first = EmailAddress::parse(&format!("{local}@{domain}")).unwrap();
            let second = EmailAddress::parse(first.as_str()).unwrap();
            prop_assert_eq!(first, second);
        }
    }
}
