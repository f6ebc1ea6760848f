//! Provisioning configuration.
//!
//! Defaults suit local development. Each value can be overridden through the
//! environment:
//!
//! | variable | default |
//! |---|---|
//! | `TRELLIS_REDIRECT_DELAY_MS` | `2000` |
//! | `TRELLIS_ADMIN_HOME` | `/admin` |
//! | `TRELLIS_ADMIN_LOGIN` | `/admin/login` |
//! | `TRELLIS_CONTROL_PANEL_LOGIN` | `/control-panel/login` |

use std::time::Duration;

use thiserror::Error;

use trellis_auth::RouteGuard;

use crate::wizard::Wizard;

pub const REDIRECT_DELAY_VAR: &str = "TRELLIS_REDIRECT_DELAY_MS";
pub const ADMIN_HOME_VAR: &str = "TRELLIS_ADMIN_HOME";
pub const ADMIN_LOGIN_VAR: &str = "TRELLIS_ADMIN_LOGIN";
pub const CONTROL_PANEL_LOGIN_VAR: &str = "TRELLIS_CONTROL_PANEL_LOGIN";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}' ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisioningConfig {
    /// Pause between completing the wizard and redirecting to `admin_home`.
    pub redirect_delay: Duration,
    pub admin_home: String,
    pub admin_login: String,
    pub control_panel_login: String,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            redirect_delay: Duration::from_millis(2000),
            admin_home: "/admin".to_string(),
            admin_login: "/admin/login".to_string(),
            control_panel_login: "/control-panel/login".to_string(),
        }
    }
}

impl ProvisioningConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (the environment in production).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(REDIRECT_DELAY_VAR) {
            let ms: u64 = raw.trim().parse().map_err(|e: std::num::ParseIntError| {
                ConfigError::InvalidValue {
                    key: REDIRECT_DELAY_VAR,
                    value: raw.clone(),
                    reason: e.to_string(),
                }
            })?;
            config.redirect_delay = Duration::from_millis(ms);
        }

        for (key, slot) in [
            (ADMIN_HOME_VAR, &mut config.admin_home),
            (ADMIN_LOGIN_VAR, &mut config.admin_login),
            (CONTROL_PANEL_LOGIN_VAR, &mut config.control_panel_login),
        ] {
            if let Some(raw) = lookup(key) {
                *slot = route(key, raw)?;
            }
        }

        Ok(config)
    }

    pub fn wizard(&self) -> Wizard {
        Wizard::new(self.redirect_delay, self.admin_home.clone())
    }

    pub fn admin_guard(&self) -> RouteGuard {
        RouteGuard::new(self.admin_login.clone())
    }

    pub fn control_panel_guard(&self) -> RouteGuard {
        RouteGuard::new(self.control_panel_login.clone())
    }
}

fn route(key: &'static str, raw: String) -> Result<String, ConfigError> {
    let trimmed = raw.trim();
    if !trimmed.starts_with('/') {
        return Err(ConfigError::InvalidValue {
            key,
            value: raw.clone(),
            reason: "route must start with '/'".to_string(),
        });
    }
    Ok(trimmed.to_string())
}
