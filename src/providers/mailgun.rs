//! Mailgun provider implementation using the `/v3/{domain}/messages` API.

use serde::Deserialize;

use crate::credentials::MailgunAuth;
use crate::recipient::Channel;

use super::{
    http_client, read_http_response, ConnectionStatus, DeliveryProvider, HttpReply,
    OutboundMessage, ProviderError, SendOutcome,
};

/// Default Mailgun API base URL.
pub const DEFAULT_MAILGUN_URL: &str = "https://api.mailgun.net";

/// Basic-auth user name Mailgun expects alongside the API key.
const MAILGUN_AUTH_USER: &str = "api";

// ---------------------------------------------------------------------------
// Wire types (pub for integration testing)
// ---------------------------------------------------------------------------

/// Mailgun send response body.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct MailgunSendResponse {
    /// Message identifier, e.g. `<2024...@mg.example.com>`.
    pub id: String,
    /// Status text, usually "Queued. Thank you.".
    #[serde(default)]
    pub message: String,
}

/// Mailgun error body.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct MailgunErrorResponse {
    /// Error description.
    pub message: String,
}

#[derive(Debug, Deserialize)]
struct MailgunDomainResponse {
    domain: MailgunDomain,
}

#[derive(Debug, Deserialize)]
struct MailgunDomain {
    name: String,
    #[serde(default)]
    state: Option<String>,
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

/// Mailgun email provider.
#[derive(Debug, Clone)]
pub struct MailgunProvider {
    domain: String,
    sender: String,
    auth: MailgunAuth,
    /// Base URL for the Mailgun API.
    #[doc(hidden)]
    pub base_url: String,
    client: reqwest::Client,
}

impl MailgunProvider {
    /// Create a provider sending from `sender` through `domain`.
    pub fn new(domain: String, sender: String, auth: MailgunAuth) -> Self {
        Self {
            domain,
            sender,
            auth,
            base_url: DEFAULT_MAILGUN_URL.to_owned(),
            client: http_client(),
        }
    }

    /// Point the provider at a different API host (EU region, test server).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/v3/{path}", self.base_url.trim_end_matches('/'))
    }

    async fn post_message(
        &self,
        recipients: &[String],
        message: &OutboundMessage,
    ) -> Result<SendOutcome, ProviderError> {
        let form = build_form(&self.sender, recipients, message);
        let response = self
            .client
            .post(self.api_url(&format!("{}/messages", self.domain)))
            .basic_auth(MAILGUN_AUTH_USER, Some(&self.auth.api_key))
            .form(&form)
            .send()
            .await?;

        let reply = read_http_response(response).await?;
        parse_response(reply)
    }
}

// ---------------------------------------------------------------------------
// Request / Response builders (pub for integration testing)
// ---------------------------------------------------------------------------

/// Build the form fields for a send.
///
/// All recipients share one comma-joined `to` field.
#[doc(hidden)]
pub fn build_form(
    sender: &str,
    recipients: &[String],
    message: &OutboundMessage,
) -> Vec<(&'static str, String)> {
    let from = message.from.as_deref().unwrap_or(sender);
    vec![
        ("from", from.to_owned()),
        ("to", recipients.join(",")),
        ("subject", message.subject.clone().unwrap_or_default()),
        ("html", message.body.clone()),
    ]
}

/// Map a Mailgun reply to a [`SendOutcome`].
///
/// # Errors
///
/// Returns `ProviderError::Parse` if a 2xx body is not a Mailgun send response.
#[doc(hidden)]
pub fn parse_response(reply: HttpReply) -> Result<SendOutcome, ProviderError> {
    if !reply.is_success() {
        let vendor_message = serde_json::from_str::<MailgunErrorResponse>(&reply.body)
            .ok()
            .map(|err| err.message);
        return Ok(reply.into_rejection(None, vendor_message));
    }

    let resp: MailgunSendResponse =
        serde_json::from_str(&reply.body).map_err(|e| ProviderError::Parse(e.to_string()))?;
    tracing::debug!(id = %resp.id, status = %resp.message, "mailgun accepted message");
    Ok(SendOutcome::delivered(Some(resp.id)))
}

// ---------------------------------------------------------------------------
// Trait impl
// ---------------------------------------------------------------------------

#[async_trait::async_trait]
impl DeliveryProvider for MailgunProvider {
    async fn send_one(
        &self,
        recipient: &str,
        message: &OutboundMessage,
    ) -> Result<SendOutcome, ProviderError> {
        self.post_message(&[recipient.to_owned()], message).await
    }

    async fn send_many(
        &self,
        recipients: &[String],
        message: &OutboundMessage,
    ) -> Result<SendOutcome, ProviderError> {
        self.post_message(recipients, message).await
    }

    async fn check_connection(&self) -> Result<ConnectionStatus, ProviderError> {
        let response = self
            .client
            .get(self.api_url(&format!("domains/{}", self.domain)))
            .basic_auth(MAILGUN_AUTH_USER, Some(&self.auth.api_key))
            .send()
            .await?;
        let reply = read_http_response(response).await?;

        if !reply.is_success() {
            let rejection = reply.into_rejection(None, None);
            return Ok(ConnectionStatus {
                connected: false,
                account: Some(self.domain.clone()),
                message: rejection.error_message.unwrap_or_default(),
            });
        }

        let resp: MailgunDomainResponse =
            serde_json::from_str(&reply.body).map_err(|e| ProviderError::Parse(e.to_string()))?;
        let state = resp.domain.state.unwrap_or_else(|| "unknown".to_owned());
        Ok(ConnectionStatus {
            connected: true,
            account: Some(resp.domain.name),
            message: format!("Mailgun connection successful (domain state: {state})"),
        })
    }

    fn name(&self) -> &str {
        "mailgun"
    }

    fn channel(&self) -> Channel {
        Channel::Email
    }
}
