use core::str::FromStr;
use serde::{Deserialize, Serialize};

use trellis_core::DomainError;

/// Textual principal of the anonymous (not logged in) caller.
pub const ANONYMOUS_PRINCIPAL: &str = "2vxsx-fae";

const MAX_PRINCIPAL_LEN: usize = 63;

/// Identity of an authenticated principal, as handed out by the identity
/// provider.
///
/// Opaque: the only operations are equality, hashing and display. The textual
/// form is dash-separated groups of lowercase base32 characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PrincipalId(String);

impl PrincipalId {
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        if raw.is_empty() || raw.len() > MAX_PRINCIPAL_LEN {
            return Err(DomainError::invalid_id(format!(
                "PrincipalId: length must be 1..={MAX_PRINCIPAL_LEN}"
            )));
        }

        for group in raw.split('-') {
            if group.is_empty() {
                return Err(DomainError::invalid_id("PrincipalId: empty group"));
            }
            if !group.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()) {
                return Err(DomainError::invalid_id(format!(
                    "PrincipalId: invalid characters in '{group}'"
                )));
            }
        }

        Ok(Self(raw.to_string()))
    }

    pub fn anonymous() -> Self {
        Self(ANONYMOUS_PRINCIPAL.to_string())
    }

    pub fn is_anonymous(&self) -> bool {
        self.0 == ANONYMOUS_PRINCIPAL
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PrincipalId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PrincipalId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PrincipalId> for String {
    fn from(value: PrincipalId) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parses_canister_style_principal() {
        let p: PrincipalId = "rrkah-fqaaa-aaaaa-aaaaq-cai".parse().unwrap();
        assert_eq!(p.as_str(), "rrkah-fqaaa-aaaaa-aaaaq-cai");
        assert!(!p.is_anonymous());
    }

    #[test]
    fn anonymous_round_trips_through_parse() {
        let p = PrincipalId::parse(ANONYMOUS_PRINCIPAL).unwrap();
        assert!(p.is_anonymous());
        assert_eq!(p, PrincipalId::anonymous());
    }

    #[test]
    fn rejects_uppercase_and_empty_groups() {
        assert!(PrincipalId::parse("").is_err());
        assert!(PrincipalId::parse("ABCDE-fg").is_err());
        assert!(PrincipalId::parse("abc--def").is_err());
        assert!(PrincipalId::parse("-abc").is_err());
    }

    #[test]
    fn deserialize_validates() {
        let ok: PrincipalId = serde_json::from_str("\"aaaaa-aa\"").unwrap();
        assert_eq!(ok.as_str(), "aaaaa-aa");
        assert!(serde_json::from_str::<PrincipalId>("\"Not Valid\"").is_err());
    }

    proptest! {
        #[test]
        fn grouped_base32_text_parses(groups in prop::collection::vec("[a-z2-7]{1,5}", 1..10)) {
            let raw = groups.join("-");
            let parsed = PrincipalId::parse(&raw).unwrap();
            prop_assert_eq!(parsed.to_string(), raw);
        }
    }
}
