//! Configuration loading and runtime paths.
//!
//! Bulkcast reads `config.toml` from its runtime directory (`~/.bulkcast/`
//! or `$BULKCAST_HOME`). Every section is optional.
//!
//! Precedence: env vars > config file > defaults.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

use crate::dispatch::DispatchOptions;
use crate::recipient::DEFAULT_COUNTRY_CODE;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Throttle, retry and deny-list defaults.
    pub dispatch: DispatchConfig,
    /// SMS number handling.
    pub sms: SmsConfig,
    /// Per-vendor, non-secret settings.
    pub providers: ProvidersConfig,
    /// Template catalog location.
    pub templates: TemplatesConfig,
}

/// Defaults applied to every dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Pause between recipients, in milliseconds.
    pub delay_ms: u64,
    /// Retries after the first failed attempt.
    pub max_retries: u32,
    /// Pause between attempts for one recipient, in milliseconds.
    pub retry_delay_ms: u64,
    /// Addresses never sent to, matched case-insensitively.
    pub excluded_addresses: Vec<String>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            delay_ms: default_delay_ms(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            excluded_addresses: Vec::new(),
        }
    }
}

/// SMS number handling.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SmsConfig {
    /// Country code prepended to bare 10-digit numbers.
    pub default_country_code: String,
}

impl Default for SmsConfig {
    fn default() -> Self {
        Self {
            default_country_code: DEFAULT_COUNTRY_CODE.to_owned(),
        }
    }
}

/// Vendor settings. Secrets live in the credentials file, not here.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    /// Mailgun email settings.
    pub mailgun: MailgunConfig,
    /// Twilio SMS settings.
    pub twilio: TwilioConfig,
    /// Plivo SMS settings.
    pub plivo: PlivoConfig,
}

/// Mailgun settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MailgunConfig {
    /// Sending domain registered with Mailgun.
    pub domain: Option<String>,
    /// Default `From` identity.
    pub sender: Option<String>,
    /// API base URL.
    pub base_url: String,
}

impl Default for MailgunConfig {
    fn default() -> Self {
        Self {
            domain: None,
            sender: None,
            base_url: "https://api.mailgun.net".to_owned(),
        }
    }
}

/// Twilio settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TwilioConfig {
    /// Default sending number.
    pub from_number: Option<String>,
    /// API base URL.
    pub base_url: String,
}

impl Default for TwilioConfig {
    fn default() -> Self {
        Self {
            from_number: None,
            base_url: "https://api.twilio.com".to_owned(),
        }
    }
}

/// Plivo settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PlivoConfig {
    /// Default sending number.
    pub from_number: Option<String>,
    /// API base URL.
    pub base_url: String,
}

impl Default for PlivoConfig {
    fn default() -> Self {
        Self {
            from_number: None,
            base_url: "https://api.plivo.com".to_owned(),
        }
    }
}

/// Template catalog settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TemplatesConfig {
    /// Extra catalog file merged over the built-in templates.
    pub catalog: Option<PathBuf>,
}

// Default value functions for serde

fn default_delay_ms() -> u64 {
    1000
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_delay_ms() -> u64 {
    2000
}

impl Config {
    /// Load `path` and apply environment overrides.
    ///
    /// A missing file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = Self::load_from_file(path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                tracing::debug!(path = %path.display(), "loading config from file");
                Self::from_toml(&contents)
                    .with_context(|| format!("failed to parse config at {}", path.display()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "failed to read config at {}: {e}",
                path.display()
            )),
        }
    }

    /// Parse a TOML string into config.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or has wrong value types.
    pub fn from_toml(toml_str: &str) -> anyhow::Result<Self> {
        toml::from_str(toml_str).context("failed to parse config TOML")
    }

    /// Apply environment overrides through a resolver (env > config > defaults).
    pub fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(v) = env("BULKCAST_DELAY_MS") {
            match v.parse() {
                Ok(n) => self.dispatch.delay_ms = n,
                Err(_) => warn_invalid("BULKCAST_DELAY_MS", &v),
            }
        }
        if let Some(v) = env("BULKCAST_MAX_RETRIES") {
            match v.parse() {
                Ok(n) => self.dispatch.max_retries = n,
                Err(_) => warn_invalid("BULKCAST_MAX_RETRIES", &v),
            }
        }
        if let Some(v) = env("BULKCAST_RETRY_DELAY_MS") {
            match v.parse() {
                Ok(n) => self.dispatch.retry_delay_ms = n,
                Err(_) => warn_invalid("BULKCAST_RETRY_DELAY_MS", &v),
            }
        }
        if let Some(v) = env("BULKCAST_DEFAULT_COUNTRY_CODE") {
            if !v.is_empty() && v.chars().all(|c| c.is_ascii_digit()) {
                self.sms.default_country_code = v;
            } else {
                warn_invalid("BULKCAST_DEFAULT_COUNTRY_CODE", &v);
            }
        }

        if let Some(v) = env("MAILGUN_DOMAIN") {
            self.providers.mailgun.domain = Some(v);
        }
        if let Some(v) = env("MAILGUN_SENDER") {
            self.providers.mailgun.sender = Some(v);
        }
    }

    /// Baseline per-call options derived from `[dispatch]`.
    pub fn dispatch_defaults(&self) -> DispatchOptions {
        DispatchOptions {
            delay_ms: self.dispatch.delay_ms,
            max_retries: self.dispatch.max_retries,
            retry_delay_ms: self.dispatch.retry_delay_ms,
            ..DispatchOptions::default()
        }
    }
}

fn warn_invalid(var: &str, value: &str) {
    tracing::warn!(var, value, "ignoring invalid env override");
}

// ---------------------------------------------------------------------------
// Runtime paths
// ---------------------------------------------------------------------------

/// Filesystem locations under the runtime root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimePaths {
    /// Runtime root directory.
    pub root: PathBuf,
    /// `config.toml`.
    pub config_file: PathBuf,
    /// `.env` credentials file.
    pub env_file: PathBuf,
    /// Log directory for production logging.
    pub logs_dir: PathBuf,
    /// JSON ledger of templates sent per recipient.
    pub sent_ledger: PathBuf,
}

impl RuntimePaths {
    /// Lay out runtime paths under `root`.
    pub fn under(root: PathBuf) -> Self {
        Self {
            config_file: root.join("config.toml"),
            env_file: root.join(".env"),
            logs_dir: root.join("logs"),
            sent_ledger: root.join("sent.json"),
            root,
        }
    }
}

/// Resolve the default runtime directory (`~/.bulkcast/`).
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn config_dir() -> anyhow::Result<PathBuf> {
    let home = directories::BaseDirs::new()
        .ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
    Ok(home.home_dir().join(".bulkcast"))
}

/// Resolve runtime paths, honouring `$BULKCAST_HOME`.
///
/// # Errors
///
/// Returns an error if neither `$BULKCAST_HOME` nor a home directory is available.
pub fn runtime_paths() -> anyhow::Result<RuntimePaths> {
    match std::env::var("BULKCAST_HOME") {
        Ok(root) if !root.is_empty() => Ok(RuntimePaths::under(PathBuf::from(root))),
        _ => Ok(RuntimePaths::under(config_dir()?)),
    }
}
