//! Vendor credential loading from the runtime `.env` file.
//!
//! Credentials are read once at startup and handed to the provider router by
//! reference. Nothing in the dispatch path reads the process environment.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::Context;
use tracing::debug;

/// Runtime credentials loaded from the `.env` file.
#[derive(Clone, Default)]
pub struct Credentials {
    vars: BTreeMap<String, String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("keys", &self.vars.keys().collect::<Vec<_>>())
            .field("values", &"[REDACTED]")
            .finish()
    }
}

impl Credentials {
    /// Build credentials from a key-value map.
    pub fn from_map(vars: BTreeMap<String, String>) -> Self {
        Self { vars }
    }

    /// Returns a credential value for a key, if present.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Returns a credential value only when it is non-blank.
    pub fn non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|value| !value.trim().is_empty())
    }
}

/// Load credentials from a specific `.env` path.
///
/// # Errors
///
/// Returns an error if the file does not exist, permissions are too broad,
/// or parsing fails.
pub fn load_credentials(path: &Path) -> anyhow::Result<Credentials> {
    if !path.exists() {
        return Err(anyhow::anyhow!(
            "credentials file does not exist: {}",
            path.display()
        ));
    }

    validate_private_permissions(path)?;

    let mut vars = BTreeMap::new();
    let iter = dotenvy::from_path_iter(path)
        .with_context(|| format!("failed to read credentials at {}", path.display()))?;

    for item in iter {
        let (key, value) = item.with_context(|| {
            format!(
                "failed to parse key-value entry in credentials file {}",
                path.display()
            )
        })?;
        vars.insert(key, value);
    }

    Ok(Credentials { vars })
}

/// Restrict a file to owner read/write when supported.
///
/// Applied to every file bulkcast writes that holds recipient data.
///
/// # Errors
///
/// Returns an error if permissions cannot be updated.
pub fn enforce_private_file_permissions(path: &Path) -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        let perms = fs::Permissions::from_mode(0o600);
        fs::set_permissions(path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

#[cfg(unix)]
fn validate_private_permissions(path: &Path) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = fs::metadata(path)
        .with_context(|| format!("failed to inspect credentials file {}", path.display()))?;
    let mode = metadata.permissions().mode() & 0o777;

    if mode & 0o077 != 0 {
        return Err(anyhow::anyhow!(
            "credentials file {} must be 0600, found {:o}",
            path.display(),
            mode
        ));
    }

    Ok(())
}

#[cfg(not(unix))]
fn validate_private_permissions(_path: &Path) -> anyhow::Result<()> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Vendor auth
// ---------------------------------------------------------------------------

/// Mailgun API key, sent as basic auth `api:<key>`.
#[derive(Clone, PartialEq, Eq)]
pub struct MailgunAuth {
    /// Private API key.
    pub api_key: String,
}

impl std::fmt::Debug for MailgunAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailgunAuth")
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

/// Twilio account SID and auth token.
#[derive(Clone, PartialEq, Eq)]
pub struct TwilioAuth {
    /// Account SID (`AC...`), also part of the request path.
    pub account_sid: String,
    /// Auth token.
    pub auth_token: String,
}

impl std::fmt::Debug for TwilioAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwilioAuth")
            .field("account_sid", &self.account_sid)
            .field("auth_token", &"[REDACTED]")
            .finish()
    }
}

/// Plivo auth ID and auth token.
#[derive(Clone, PartialEq, Eq)]
pub struct PlivoAuth {
    /// Auth ID, also part of the request path.
    pub auth_id: String,
    /// Auth token.
    pub auth_token: String,
}

impl std::fmt::Debug for PlivoAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlivoAuth")
            .field("auth_id", &self.auth_id)
            .field("auth_token", &"[REDACTED]")
            .finish()
    }
}

/// Resolve Mailgun auth from `MAILGUN_API_KEY`.
pub fn resolve_mailgun_auth(credentials: &Credentials) -> Option<MailgunAuth> {
    let api_key = credentials.non_empty("MAILGUN_API_KEY")?;
    debug!("using MAILGUN_API_KEY from .env");
    Some(MailgunAuth {
        api_key: api_key.to_owned(),
    })
}

/// Resolve Twilio auth from `TWILIO_ACCOUNT_SID` and `TWILIO_AUTH_TOKEN`.
///
/// Both must be present; a lone SID or token resolves to `None`.
pub fn resolve_twilio_auth(credentials: &Credentials) -> Option<TwilioAuth> {
    let account_sid = credentials.non_empty("TWILIO_ACCOUNT_SID")?;
    let auth_token = credentials.non_empty("TWILIO_AUTH_TOKEN")?;
    debug!("using Twilio account credentials from .env");
    Some(TwilioAuth {
        account_sid: account_sid.to_owned(),
        auth_token: auth_token.to_owned(),
    })
}

/// Resolve Plivo auth from `PLIVO_AUTH_ID` and `PLIVO_AUTH_TOKEN`.
pub fn resolve_plivo_auth(credentials: &Credentials) -> Option<PlivoAuth> {
    let auth_id = credentials.non_empty("PLIVO_AUTH_ID")?;
    let auth_token = credentials.non_empty("PLIVO_AUTH_TOKEN")?;
    debug!("using Plivo account credentials from .env");
    Some(PlivoAuth {
        auth_id: auth_id.to_owned(),
        auth_token: auth_token.to_owned(),
    })
}
