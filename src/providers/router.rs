//! Provider router resolving vendor adapters by name.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::ProvidersConfig;
use crate::credentials::{
    resolve_mailgun_auth, resolve_plivo_auth, resolve_twilio_auth, Credentials,
};

use super::mailgun::MailgunProvider;
use super::plivo::PlivoProvider;
use super::twilio::TwilioProvider;
use super::{ConnectionStatus, DeliveryProvider, ProviderKind};

/// Provider routing errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouterError {
    /// Provider name is not a known vendor.
    #[error("unsupported provider '{provider}'")]
    UnsupportedProvider {
        /// Requested provider name.
        provider: String,
    },
    /// Required credential or sender setting missing for the provider.
    #[error("missing credential for provider '{provider}': {key}")]
    MissingCredential {
        /// Provider name.
        provider: String,
        /// Missing credential or setting.
        key: String,
    },
    /// Provider is known but was not registered with this router.
    #[error("provider '{provider}' is not available")]
    UnavailableProvider {
        /// Provider name.
        provider: String,
    },
}

/// Outcome of checking one provider's connectivity.
#[derive(Debug, Clone)]
pub struct ProviderCheck {
    /// Provider name.
    pub provider: String,
    /// Connection status, or the reason the check could not run.
    pub status: Result<ConnectionStatus, String>,
}

/// Router mapping provider names to configured adapter instances.
///
/// Built once at startup. Providers whose credentials are absent are not
/// registered; resolving them reports which key is missing.
#[derive(Clone, Default)]
pub struct ProviderRouter {
    providers: HashMap<String, Arc<dyn DeliveryProvider>>,
    unavailable: HashMap<String, RouterError>,
}

impl std::fmt::Debug for ProviderRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRouter")
            .field("available", &self.available())
            .field("unavailable", &self.unavailable)
            .finish()
    }
}

impl ProviderRouter {
    /// Build a router from provider config and loaded credentials.
    pub fn from_config(config: &ProvidersConfig, credentials: &Credentials) -> Self {
        let mut router = Self::default();

        for kind in ProviderKind::ALL {
            match instantiate_provider(kind, config, credentials) {
                Ok(provider) => router.register(provider),
                Err(err) => {
                    tracing::debug!(provider = %kind, error = %err, "provider not registered");
                    router.unavailable.insert(kind.name().to_owned(), err);
                }
            }
        }

        router
    }

    /// Create a router backed by a single provider for integration tests.
    #[doc(hidden)]
    pub fn for_testing(name: &str, provider: Arc<dyn DeliveryProvider>) -> Self {
        let mut providers = HashMap::new();
        providers.insert(name.to_ascii_lowercase(), provider);
        Self {
            providers,
            unavailable: HashMap::new(),
        }
    }

    /// Register an adapter under its own name, replacing any previous one.
    pub fn register(&mut self, provider: Arc<dyn DeliveryProvider>) {
        let name = provider.name().to_ascii_lowercase();
        self.unavailable.remove(&name);
        self.providers.insert(name, provider);
    }

    /// Resolve a provider by name (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::MissingCredential`] when the vendor is known but
    /// its credentials were absent at startup, and
    /// [`RouterError::UnsupportedProvider`] for unknown names.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn DeliveryProvider>, RouterError> {
        let key = name.trim().to_ascii_lowercase();
        if let Some(provider) = self.providers.get(&key) {
            return Ok(Arc::clone(provider));
        }
        if let Some(err) = self.unavailable.get(&key) {
            return Err(err.clone());
        }
        match key.parse::<ProviderKind>() {
            Ok(_) => Err(RouterError::UnavailableProvider { provider: key }),
            Err(_) => Err(RouterError::UnsupportedProvider {
                provider: name.to_owned(),
            }),
        }
    }

    /// Returns true when a provider is registered under `name`.
    pub fn has_provider(&self, name: &str) -> bool {
        self.providers.contains_key(&name.trim().to_ascii_lowercase())
    }

    /// Registered provider names in sorted order.
    pub fn available(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check connectivity of one provider.
    ///
    /// # Errors
    ///
    /// Returns a [`RouterError`] if the provider cannot be resolved.
    pub async fn check(&self, name: &str) -> Result<ProviderCheck, RouterError> {
        let provider = self.resolve(name)?;
        Ok(check_provider(provider.as_ref()).await)
    }

    /// Check connectivity of every registered provider, in name order.
    pub async fn check_all(&self) -> Vec<ProviderCheck> {
        let mut checks = Vec::with_capacity(self.providers.len());
        for name in self.available() {
            if let Some(provider) = self.providers.get(&name) {
                checks.push(check_provider(provider.as_ref()).await);
            }
        }
        checks
    }
}

async fn check_provider(provider: &dyn DeliveryProvider) -> ProviderCheck {
    let status = provider
        .check_connection()
        .await
        .map_err(|e| e.to_string());
    match &status {
        Ok(s) => {
            tracing::info!(provider = provider.name(), connected = s.connected, "provider check");
        }
        Err(e) => {
            tracing::warn!(provider = provider.name(), error = %e, "provider check failed");
        }
    }
    ProviderCheck {
        provider: provider.name().to_owned(),
        status,
    }
}

fn missing(kind: ProviderKind, key: &str) -> RouterError {
    RouterError::MissingCredential {
        provider: kind.name().to_owned(),
        key: key.to_owned(),
    }
}

fn instantiate_provider(
    kind: ProviderKind,
    config: &ProvidersConfig,
    credentials: &Credentials,
) -> Result<Arc<dyn DeliveryProvider>, RouterError> {
    match kind {
        ProviderKind::Mailgun => {
            let auth =
                resolve_mailgun_auth(credentials).ok_or_else(|| missing(kind, "MAILGUN_API_KEY"))?;
            let domain = config
                .mailgun
                .domain
                .clone()
                .or_else(|| credentials.non_empty("MAILGUN_DOMAIN").map(str::to_owned))
                .ok_or_else(|| missing(kind, "MAILGUN_DOMAIN"))?;
            let sender = config
                .mailgun
                .sender
                .clone()
                .or_else(|| credentials.non_empty("MAILGUN_SENDER").map(str::to_owned))
                .ok_or_else(|| missing(kind, "MAILGUN_SENDER"))?;
            Ok(Arc::new(
                MailgunProvider::new(domain, sender, auth).with_base_url(&config.mailgun.base_url),
            ))
        }
        ProviderKind::Twilio => {
            let auth = resolve_twilio_auth(credentials)
                .ok_or_else(|| missing(kind, "TWILIO_ACCOUNT_SID and TWILIO_AUTH_TOKEN"))?;
            let from = config
                .twilio
                .from_number
                .clone()
                .or_else(|| credentials.non_empty("TWILIO_PHONE_NUMBER").map(str::to_owned))
                .ok_or_else(|| missing(kind, "TWILIO_PHONE_NUMBER"))?;
            Ok(Arc::new(
                TwilioProvider::new(from, auth).with_base_url(&config.twilio.base_url),
            ))
        }
        ProviderKind::Plivo => {
            let auth = resolve_plivo_auth(credentials)
                .ok_or_else(|| missing(kind, "PLIVO_AUTH_ID and PLIVO_AUTH_TOKEN"))?;
            let from = config
                .plivo
                .from_number
                .clone()
                .or_else(|| credentials.non_empty("PLIVO_PHONE_NUMBER").map(str::to_owned))
                .ok_or_else(|| missing(kind, "PLIVO_PHONE_NUMBER"))?;
            Ok(Arc::new(
                PlivoProvider::new(from, auth).with_base_url(&config.plivo.base_url),
            ))
        }
    }
}
