//! Secret resolution for the Postgres connection string.
//!
//! # Contract
//! - Config YAML stores only the **env var NAME** that holds the DSN, at
//!   `/db/url_env` (e.g. `"OXEN_DATABASE_URL"`), never the DSN itself.
//! - At startup, callers invoke [`resolve_db_url`] once and pass the result
//!   to `oxen_db::connect_from_env` / `PgPoolOptions`.
//! - `Debug` on [`ResolvedDbSecret`] redacts the DSN.
//! - Error messages reference the env var **NAME**, never the value.

use anyhow::{bail, Result};
use serde_json::Value;

const DEFAULT_DB_URL_ENV: &str = "OXEN_DATABASE_URL";

/// The resolved Postgres connection string, with a `Debug` impl that never
/// prints it (a DSN carries a password).
#[derive(Clone)]
pub struct ResolvedDbSecret {
    pub url: String,
    env_var: String,
}

impl ResolvedDbSecret {
    /// The env var name the DSN came from — safe to log.
    pub fn env_var(&self) -> &str {
        &self.env_var
    }
}

impl std::fmt::Debug for ResolvedDbSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedDbSecret")
            .field("env_var", &self.env_var)
            .field("url", &"<REDACTED>")
            .finish()
    }
}

fn read_str_at(config: &Value, pointer: &str) -> Option<String> {
    let s = config.pointer(pointer)?.as_str()?;
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Resolve the Postgres DSN from the environment, using the env var name
/// stored at `/db/url_env` in `config_json` (defaulting to
/// `OXEN_DATABASE_URL` if the config is silent on it).
///
/// # Errors
/// Fails closed with the env var **NAME** when it is unset or blank. The
/// value is never mentioned in the error.
pub fn resolve_db_url(config_json: &Value) -> Result<ResolvedDbSecret> {
    let env_var =
        read_str_at(config_json, "/db/url_env").unwrap_or_else(|| DEFAULT_DB_URL_ENV.to_string());

    let url = match std::env::var(&env_var) {
        Ok(v) if !v.trim().is_empty() => v,
        _ => {
            bail!("SECRETS_MISSING: required env var '{env_var}' (Postgres DSN) is not set or empty");
        }
    };

    Ok(ResolvedDbSecret { url, env_var })
}
