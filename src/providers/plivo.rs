//! Plivo provider implementation using the `/v1/Account/{id}/Message/` API.

use serde::{Deserialize, Serialize};

use crate::credentials::PlivoAuth;
use crate::recipient::Channel;

use super::{
    http_client, read_http_response, ConnectionStatus, DeliveryProvider, HttpReply,
    OutboundMessage, ProviderError, SendOutcome,
};

/// Default Plivo API base URL.
pub const DEFAULT_PLIVO_URL: &str = "https://api.plivo.com";

/// Separator Plivo uses for multiple destinations in one request.
pub const DESTINATION_SEPARATOR: &str = "<";

// ---------------------------------------------------------------------------
// Wire types (pub for integration testing)
// ---------------------------------------------------------------------------

/// Plivo send request body.
#[doc(hidden)]
#[derive(Debug, Serialize)]
pub struct PlivoRequest {
    /// Sender number.
    pub src: String,
    /// Destination numbers joined with `<`.
    pub dst: String,
    /// Message text.
    pub text: String,
}

/// Plivo send response body.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct PlivoResponse {
    /// Status text, e.g. "message(s) queued".
    #[serde(default)]
    pub message: Option<String>,
    /// One UUID per destination.
    #[serde(default)]
    pub message_uuid: Vec<String>,
}

/// Plivo error body.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct PlivoErrorResponse {
    /// Error description.
    pub error: String,
}

#[derive(Debug, Deserialize)]
struct PlivoAccountResponse {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    account_type: Option<String>,
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

/// Plivo SMS provider.
#[derive(Debug, Clone)]
pub struct PlivoProvider {
    from_number: String,
    auth: PlivoAuth,
    /// Base URL for the Plivo API.
    #[doc(hidden)]
    pub base_url: String,
    client: reqwest::Client,
}

impl PlivoProvider {
    /// Create a provider sending from `from_number`.
    pub fn new(from_number: String, auth: PlivoAuth) -> Self {
        Self {
            from_number,
            auth,
            base_url: DEFAULT_PLIVO_URL.to_owned(),
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
            "{}/v1/Account/{}/{suffix}",
            self.base_url.trim_end_matches('/'),
            self.auth.auth_id
        )
    }

    async fn post_message(
        &self,
        recipients: &[String],
        message: &OutboundMessage,
    ) -> Result<SendOutcome, ProviderError> {
        let api_request = build_request(&self.from_number, recipients, message);
        let response = self
            .client
            .post(self.account_url("Message/"))
            .basic_auth(&self.auth.auth_id, Some(&self.auth.auth_token))
            .json(&api_request)
            .send()
            .await?;

        let reply = read_http_response(response).await?;
        parse_response(reply)
    }
}

// ---------------------------------------------------------------------------
// Request / Response builders (pub for integration testing)
// ---------------------------------------------------------------------------

/// Build a Plivo request covering every recipient.
#[doc(hidden)]
pub fn build_request(
    default_from: &str,
    recipients: &[String],
    message: &OutboundMessage,
) -> PlivoRequest {
    PlivoRequest {
        src: message.from.clone().unwrap_or_else(|| default_from.to_owned()),
        dst: recipients.join(DESTINATION_SEPARATOR),
        text: message.body.clone(),
    }
}

/// Map a Plivo reply to a [`SendOutcome`].
///
/// # Errors
///
/// Returns `ProviderError::Parse` if a 2xx body is not a send response.
#[doc(hidden)]
pub fn parse_response(reply: HttpReply) -> Result<SendOutcome, ProviderError> {
    if !reply.is_success() {
        let vendor_message = serde_json::from_str::<PlivoErrorResponse>(&reply.body)
            .ok()
            .map(|err| err.error);
        return Ok(reply.into_rejection(None, vendor_message));
    }

    let resp: PlivoResponse =
        serde_json::from_str(&reply.body).map_err(|e| ProviderError::Parse(e.to_string()))?;
    tracing::debug!(
        uuids = resp.message_uuid.len(),
        status = resp.message.as_deref().unwrap_or("unknown"),
        "plivo accepted message"
    );
    Ok(SendOutcome::delivered_each(resp.message_uuid))
}

// ---------------------------------------------------------------------------
// Trait impl
// ---------------------------------------------------------------------------

#[async_trait::async_trait]
impl DeliveryProvider for PlivoProvider {
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
            .get(self.account_url(""))
            .basic_auth(&self.auth.auth_id, Some(&self.auth.auth_token))
            .send()
            .await?;
        let reply = read_http_response(response).await?;

        if !reply.is_success() {
            let rejection = parse_response(reply)?;
            return Ok(ConnectionStatus {
                connected: false,
                account: Some(self.auth.auth_id.clone()),
                message: rejection.error_message.unwrap_or_default(),
            });
        }

        let resp: PlivoAccountResponse =
            serde_json::from_str(&reply.body).map_err(|e| ProviderError::Parse(e.to_string()))?;
        let account_type = resp.account_type.unwrap_or_else(|| "unknown".to_owned());
        Ok(ConnectionStatus {
            connected: true,
            account: resp.name.or_else(|| Some(self.auth.auth_id.clone())),
            message: format!("Plivo connection successful (account type: {account_type})"),
        })
    }

    fn name(&self) -> &str {
        "plivo"
    }

    fn channel(&self) -> Channel {
        Channel::Sms
    }
}
