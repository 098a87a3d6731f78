//! Integration tests for provider resolution by name.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use bulkcast::config::ProvidersConfig;
use bulkcast::credentials::Credentials;
use bulkcast::providers::router::{ProviderRouter, RouterError};
use bulkcast::providers::{
    ConnectionStatus, DeliveryProvider, OutboundMessage, ProviderError, ProviderKind, SendOutcome,
};
use bulkcast::recipient::Channel;

fn credentials(pairs: &[(&str, &str)]) -> Credentials {
    let vars: BTreeMap<String, String> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect();
    Credentials::from_map(vars)
}

fn mailgun_config() -> ProvidersConfig {
    let mut config = ProvidersConfig::default();
    config.mailgun.domain = Some("mg.example.com".to_owned());
    config.mailgun.sender = Some("noreply@mg.example.com".to_owned());
    config
}

struct OfflineProvider;

#[async_trait]
impl DeliveryProvider for OfflineProvider {
    async fn send_one(
        &self,
        _recipient: &str,
        _message: &OutboundMessage,
    ) -> Result<SendOutcome, ProviderError> {
        Ok(SendOutcome::delivered(None))
    }

    async fn send_many(
        &self,
        _recipients: &[String],
        _message: &OutboundMessage,
    ) -> Result<SendOutcome, ProviderError> {
        Ok(SendOutcome::delivered(None))
    }

    async fn check_connection(&self) -> Result<ConnectionStatus, ProviderError> {
        Err(ProviderError::Unavailable("offline".to_owned()))
    }

    fn name(&self) -> &str {
        "offline"
    }

    fn channel(&self) -> Channel {
        Channel::Email
    }
}

#[test]
fn registers_only_providers_with_credentials() {
    let creds = credentials(&[("MAILGUN_API_KEY", "key-test")]);
    let router = ProviderRouter::from_config(&mailgun_config(), &creds);
    assert_eq!(router.available(), vec!["mailgun".to_owned()]);
    assert!(router.has_provider("Mailgun"));
    assert!(!router.has_provider("twilio"));
}

#[test]
fn resolve_is_case_insensitive() {
    let creds = credentials(&[("MAILGUN_API_KEY", "key-test")]);
    let router = ProviderRouter::from_config(&mailgun_config(), &creds);
    let provider = router.resolve("MAILGUN").expect("mailgun should resolve");
    assert_eq!(provider.name(), "mailgun");
    assert_eq!(provider.channel(), Channel::Email);
}

#[test]
fn missing_credentials_name_the_key() {
    let router = ProviderRouter::from_config(&ProvidersConfig::default(), &Credentials::default());
    let err = match router.resolve("twilio") {
        Ok(_) => panic!("twilio should not resolve without credentials"),
        Err(err) => err,
    };
    match err {
        RouterError::MissingCredential { provider, key } => {
            assert_eq!(provider, "twilio");
            assert!(key.contains("TWILIO_ACCOUNT_SID"));
        }
        other => panic!("expected missing credential, got: {other}"),
    }
}

#[test]
fn sms_sender_falls_back_to_credentials() {
    let creds = credentials(&[
        ("PLIVO_AUTH_ID", "MAtest"),
        ("PLIVO_AUTH_TOKEN", "secret"),
        ("PLIVO_PHONE_NUMBER", "+15550002222"),
    ]);
    let router = ProviderRouter::from_config(&ProvidersConfig::default(), &creds);
    assert!(router.has_provider("plivo"));
}

#[test]
fn sms_provider_without_sender_is_unregistered() {
    let creds = credentials(&[
        ("TWILIO_ACCOUNT_SID", "ACtest"),
        ("TWILIO_AUTH_TOKEN", "token"),
    ]);
    let router = ProviderRouter::from_config(&ProvidersConfig::default(), &creds);
    match router.resolve("twilio") {
        Err(RouterError::MissingCredential { key, .. }) => {
            assert_eq!(key, "TWILIO_PHONE_NUMBER");
        }
        Err(other) => panic!("expected missing sender, got: {other}"),
        Ok(_) => panic!("twilio should need a sending number"),
    }
}

#[test]
fn unknown_provider_is_unsupported() {
    let router = ProviderRouter::default();
    assert!(matches!(
        router.resolve("sendgrid"),
        Err(RouterError::UnsupportedProvider { .. })
    ));
}

#[test]
fn provider_kind_parses_known_names() {
    assert_eq!("Twilio".parse::<ProviderKind>().ok(), Some(ProviderKind::Twilio));
    assert_eq!(ProviderKind::Plivo.channel(), Channel::Sms);
    assert!("smtp".parse::<ProviderKind>().is_err());
}

#[test]
fn register_makes_custom_provider_resolvable() {
    let mut router = ProviderRouter::default();
    router.register(Arc::new(OfflineProvider));
    assert!(router.resolve("offline").is_ok());
}

#[tokio::test]
async fn check_all_reports_unreachable_providers() {
    let router = ProviderRouter::for_testing("offline", Arc::new(OfflineProvider));
    let checks = router.check_all().await;
    assert_eq!(checks.len(), 1);
    assert_eq!(checks[0].provider, "offline");
    assert!(checks[0].status.is_err());
}

#[tokio::test]
async fn check_unknown_provider_fails_fast() {
    let router = ProviderRouter::for_testing("offline", Arc::new(OfflineProvider));
    assert!(router.check("plivo").await.is_err());
}
