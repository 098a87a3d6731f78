//! Twilio provider implementation using the Programmable Messaging API.

use serde::Deserialize;

use crate::credentials::TwilioAuth;
use crate::recipient::Channel;

use super::{
    http_client, read_http_response, ConnectionStatus, DeliveryProvider, HttpReply,
    OutboundMessage, ProviderError, SendOutcome,
};

/// Default Twilio API base URL.
pub const DEFAULT_TWILIO_URL: &str = "https://api.twilio.com";

const TWILIO_API_VERSION: &str = "2010-04-01";

// ---------------------------------------------------------------------------
// Wire types (pub for integration testing)
// ---------------------------------------------------------------------------

/// Twilio message resource returned on create.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct TwilioMessageResponse {
    /// Message SID (`SM...`).
    pub sid: String,
    /// Initial message status, e.g. "queued".
    #[serde(default)]
    pub status: Option<String>,
}

/// Twilio error body.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct TwilioErrorResponse {
    /// Numeric Twilio error code, e.g. 21211 for an invalid `To` number.
    pub code: Option<u32>,
    /// Error description.
    pub message: String,
}

#[derive(Debug, Deserialize)]
struct TwilioAccountResponse {
    sid: String,
    #[serde(default)]
    friendly_name: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

/// Twilio SMS provider.
///
/// Twilio creates one message resource per destination. The provider reports
/// itself as single-destination, so the dispatch engine spaces and retries
/// each recipient itself. A direct [`DeliveryProvider::send_many`] call issues
/// one request per recipient and stops at the first rejection.
#[derive(Debug, Clone)]
pub struct TwilioProvider {
    from_number: String,
    auth: TwilioAuth,
    /// Base URL for the Twilio API.
    #[doc(hidden)]
    pub base_url: String,
    client: reqwest::Client,
}

impl TwilioProvider {
    /// Create a provider sending from `from_number`.
    pub fn new(from_number: String, auth: TwilioAuth) -> Self {
        Self {
            from_number,
            auth,
            base_url: DEFAULT_TWILIO_URL.to_owned(),
            client: http_client(),
        }
    }

    /// Point the provider at a different API host.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn account_url(&self, suffix: &str) -> String {
        format!(
            "{}/{TWILIO_API_VERSION}/Accounts/{}{suffix}",
            self.base_url.trim_end_matches('/'),
            self.auth.account_sid
        )
    }
}

// ---------------------------------------------------------------------------
// Request / Response builders (pub for integration testing)
// ---------------------------------------------------------------------------

/// Build the form fields for one message.
#[doc(hidden)]
pub fn build_form(
    default_from: &str,
    recipient: &str,
    message: &OutboundMessage,
) -> Vec<(&'static str, String)> {
    let from = message.from.as_deref().unwrap_or(default_from);
    vec![
        ("To", recipient.to_owned()),
        ("From", from.to_owned()),
        ("Body", message.body.clone()),
    ]
}

/// Map a Twilio reply to a [`SendOutcome`].
///
/// # Errors
///
/// Returns `ProviderError::Parse` if a 2xx body is not a message resource.
#[doc(hidden)]
pub fn parse_response(reply: HttpReply) -> Result<SendOutcome, ProviderError> {
    if !reply.is_success() {
        let (code, message) = match serde_json::from_str::<TwilioErrorResponse>(&reply.body) {
            Ok(err) => (err.code.map(|c| c.to_string()), Some(err.message)),
            Err(_) => (None, None),
        };
        return Ok(reply.into_rejection(code, message));
    }

    let resp: TwilioMessageResponse =
        serde_json::from_str(&reply.body).map_err(|e| ProviderError::Parse(e.to_string()))?;
    tracing::debug!(
        sid = %resp.sid,
        status = resp.status.as_deref().unwrap_or("unknown"),
        "twilio accepted message"
    );
    Ok(SendOutcome::delivered(Some(resp.sid)))
}

// ---------------------------------------------------------------------------
// Trait impl
// ---------------------------------------------------------------------------

#[async_trait::async_trait]
impl DeliveryProvider for TwilioProvider {
    async fn send_one(
        &self,
        recipient: &str,
        message: &OutboundMessage,
    ) -> Result<SendOutcome, ProviderError> {
        let form = build_form(&self.from_number, recipient, message);
        let response = self
            .client
            .post(self.account_url("/Messages.json"))
            .basic_auth(&self.auth.account_sid, Some(&self.auth.auth_token))
            .form(&form)
            .send()
            .await?;

        let reply = read_http_response(response).await?;
        parse_response(reply)
    }

    async fn send_many(
        &self,
        recipients: &[String],
        message: &OutboundMessage,
    ) -> Result<SendOutcome, ProviderError> {
        let mut sids = Vec::with_capacity(recipients.len());
        for recipient in recipients {
            let outcome = self.send_one(recipient, message).await?;
            if !outcome.success {
                return Ok(outcome);
            }
            sids.extend(outcome.provider_message_id);
        }
        Ok(SendOutcome::delivered_each(sids))
    }

    async fn check_connection(&self) -> Result<ConnectionStatus, ProviderError> {
        let response = self
            .client
            .get(self.account_url(".json"))
            .basic_auth(&self.auth.account_sid, Some(&self.auth.auth_token))
            .send()
            .await?;
        let reply = read_http_response(response).await?;

        if !reply.is_success() {
            let rejection = parse_response(reply)?;
            return Ok(ConnectionStatus {
                connected: false,
                account: Some(self.auth.account_sid.clone()),
                message: rejection.error_message.unwrap_or_default(),
            });
        }

        let resp: TwilioAccountResponse =
            serde_json::from_str(&reply.body).map_err(|e| ProviderError::Parse(e.to_string()))?;
        let status = resp.status.unwrap_or_else(|| "unknown".to_owned());
        Ok(ConnectionStatus {
            connected: true,
            account: Some(resp.friendly_name.unwrap_or(resp.sid)),
            message: format!("Twilio connection successful (account status: {status})"),
        })
    }

    fn multi_destination(&self) -> bool {
        false
    }

    fn name(&self) -> &str {
        "twilio"
    }

    fn channel(&self) -> Channel {
        Channel::Sms
    }
}
