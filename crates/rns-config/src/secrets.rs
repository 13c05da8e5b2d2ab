//! Runtime secret resolution.
//!
//! # Contract
//! - Config YAML stores only **env var NAMES** (`transport.credentials_env`).
//! - Callers invoke [`resolve_secrets`] once at start-up and pass the result
//!   into constructors; no other module reads `std::env` for credentials.
//! - `Debug` on [`ResolvedSecrets`] **redacts** values.
//! - Error messages reference the env var **NAME**, never the value.

use anyhow::{bail, Result};

use crate::station::StationConfig;

/// Broker bridge credentials. **Values are redacted in `Debug` output.**
#[derive(Clone, Default)]
pub struct ResolvedSecrets {
    pub bridge_username: Option<String>,
    pub bridge_password: Option<String>,
}

impl ResolvedSecrets {
    /// Both halves, or nothing.
    pub fn bridge_credentials(&self) -> Option<(&str, &str)> {
        match (&self.bridge_username, &self.bridge_password) {
            (Some(u), Some(p)) => Some((u.as_str(), p.as_str())),
            _ => None,
        }
    }
}

impl std::fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecrets")
            .field(
                "bridge_username",
                &self.bridge_username.as_ref().map(|_| "<REDACTED>"),
            )
            .field(
                "bridge_password",
                &self.bridge_password.as_ref().map(|_| "<REDACTED>"),
            )
            .finish()
    }
}

/// Unset or blank variables resolve to `None`.
fn resolve_env(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

/// Resolve the bridge credentials named by `cfg`.
///
/// # Errors
/// - only one of username/password is set (`SECRETS_PARTIAL`);
/// - `transport.auth_required` is true and either is missing
///   (`SECRETS_MISSING`).
pub fn resolve_secrets(cfg: &StationConfig) -> Result<ResolvedSecrets> {
    resolve_secrets_with(cfg, resolve_env)
}

/// Same as [`resolve_secrets`] with an injectable lookup, for tests.
pub fn resolve_secrets_with<F>(cfg: &StationConfig, lookup: F) -> Result<ResolvedSecrets>
where
    F: Fn(&str) -> Option<String>,
{
    let names = &cfg.transport.credentials_env;
    let username = lookup(&names.username);
    let password = lookup(&names.password);

    match (&username, &password) {
        (Some(_), None) => bail!(
            "SECRETS_PARTIAL: env var '{}' is set but '{}' is not",
            names.username,
            names.password
        ),
        (None, Some(_)) => bail!(
            "SECRETS_PARTIAL: env var '{}' is set but '{}' is not",
            names.password,
            names.username
        ),
        (None, None) if cfg.transport.auth_required => bail!(
            "SECRETS_MISSING: transport.auth_required is set but env vars '{}' / '{}' are not",
            names.username,
            names.password
        ),
        _ => {}
    }

    Ok(ResolvedSecrets {
        bridge_username: username,
        bridge_password: password,
    })
}
