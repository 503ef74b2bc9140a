//! Connection context for a messaging session.

use std::env;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Base URL used when none is configured.
pub const DEFAULT_API_BASE: &str = "https://api.zulip.com/v1";

/// Configuration error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("{0} is not a valid boolean value")]
    InvalidBool(String),
    #[error(
        "Base URL is not https but secure is set to true. \
         Either set secure to false or make sure the site begins with https."
    )]
    InsecureBase,
    #[error("Base URL must not be empty")]
    EmptyBase,
}

/// Immutable connection settings for the remote service.
///
/// Built once and shared as `Arc<ClientContext>`; the session core never
/// mutates it, so a supervisor and its fetchers always agree on credentials.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientContext {
    /// Account email, used as the basic-auth username.
    pub email: String,
    /// API key, used as the basic-auth password.
    pub api_key: String,
    /// Base URL of the API, e.g. `https://chat.example.org/api/v1`.
    pub api_base: String,
    /// Verify the server's TLS certificate.
    pub secure: bool,
}

// Keep the API key out of logs.
impl std::fmt::Debug for ClientContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientContext")
            .field("email", &self.email)
            .field("api_key", &"<redacted>")
            .field("api_base", &self.api_base)
            .field("secure", &self.secure)
            .finish()
    }
}

impl ClientContext {
    /// Create and validate a context.
    ///
    /// # Errors
    /// Returns error if the base URL is empty, or is not https while
    /// `secure` is set.
    pub fn new(
        email: impl Into<String>,
        api_key: impl Into<String>,
        api_base: impl Into<String>,
        secure: bool,
    ) -> Result<Self, ContextError> {
        let ctx = Self {
            email: email.into(),
            api_key: api_key.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            secure,
        };
        ctx.validate()?;
        Ok(ctx)
    }

    /// Load from environment variables.
    ///
    /// Each setting reads the clisiana-specific variable first and falls back
    /// to the generic `ZULIP_*` one.
    ///
    /// # Errors
    /// Returns error if a value is malformed or the result fails validation.
    pub fn from_env() -> Result<Self, ContextError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(mut lookup: F) -> Result<Self, ContextError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let email =
            first_set(&["CLISIANA_ZULIP_EMAIL", "ZULIP_EMAIL"], &mut lookup).unwrap_or_default();
        let api_key = first_set(&["CLISIANA_ZULIP_API_KEY", "ZULIP_API_KEY"], &mut lookup)
            .unwrap_or_default();
        let api_base = first_set(&["CLISIANA_ZULIP_URL", "ZULIP_URL"], &mut lookup)
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let secure = match first_set(&["CLISIANA_VERIFY_SSL"], &mut lookup) {
            Some(raw) => parse_bool(&raw)?,
            None => true,
        };

        Self::new(email, api_key, api_base, secure)
    }

    /// Validate invariants between fields.
    ///
    /// # Errors
    /// See [`ClientContext::new`].
    pub fn validate(&self) -> Result<(), ContextError> {
        if self.api_base.trim().is_empty() {
            return Err(ContextError::EmptyBase);
        }
        let is_https = self
            .api_base
            .get(..8)
            .is_some_and(|scheme| scheme.eq_ignore_ascii_case("https://"));
        if self.secure && !is_https {
            return Err(ContextError::InsecureBase);
        }
        Ok(())
    }

    /// Full URL of an API endpoint.
    #[must_use]
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path.trim_start_matches('/'))
    }
}

fn first_set<F>(keys: &[&str], lookup: &mut F) -> Option<String>
where
    F: FnMut(&str) -> Option<String>,
{
    keys.iter()
        .filter_map(|key| lookup(key))
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

/// Parse the boolean spellings accepted by the client's settings.
///
/// # Errors
/// Returns error for anything outside the accepted spellings.
pub fn parse_bool(raw: &str) -> Result<bool, ContextError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "1" | "on" => Ok(true),
        "false" | "f" | "no" | "n" | "0" | "off" => Ok(false),
        _ => Err(ContextError::InvalidBool(raw.to_string())),
    }
}
