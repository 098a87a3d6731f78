//! Delivery provider abstraction layer.
//!
//! Defines the [`DeliveryProvider`] trait and the normalized result types
//! every vendor adapter returns.
//!
//! Three providers are implemented:
//! - [`mailgun::MailgunProvider`]: email via the Mailgun messages API
//! - [`twilio::TwilioProvider`]: SMS via the Twilio Messages API
//! - [`plivo::PlivoProvider`]: SMS via the Plivo Message API
//!
//! The [`router::ProviderRouter`] resolves a provider name to a configured
//! adapter instance. Adding a vendor means implementing the trait and
//! registering it in the router; the dispatch engine is untouched.
//!
//! Failure model: a vendor that answers with a non-2xx status (rate limit,
//! rejected recipient, bad credentials) produces an `Ok` [`SendOutcome`] with
//! `success == false`. Only transport and decoding problems surface as
//! [`ProviderError`].

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::recipient::Channel;

pub mod mailgun;
pub mod plivo;
pub mod router;
pub mod twilio;

// ---------------------------------------------------------------------------
// Provider selection
// ---------------------------------------------------------------------------

/// Known vendor adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Mailgun (email).
    Mailgun,
    /// Twilio (SMS).
    Twilio,
    /// Plivo (SMS).
    Plivo,
}

impl ProviderKind {
    /// Every known provider, in listing order.
    pub const ALL: [Self; 3] = [Self::Mailgun, Self::Twilio, Self::Plivo];

    /// Lowercase provider name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Mailgun => "mailgun",
            Self::Twilio => "twilio",
            Self::Plivo => "plivo",
        }
    }

    /// Channel this vendor delivers on.
    pub fn channel(self) -> Channel {
        match self {
            Self::Mailgun => Channel::Email,
            Self::Twilio | Self::Plivo => Channel::Sms,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ProviderKind {
    type Err = router::RouterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == wanted)
            .ok_or_else(|| router::RouterError::UnsupportedProvider {
                provider: s.to_owned(),
            })
    }
}

// ---------------------------------------------------------------------------
// Request / Response
// ---------------------------------------------------------------------------

/// A fully rendered message handed to an adapter.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OutboundMessage {
    /// Subject line; ignored by SMS adapters.
    pub subject: Option<String>,
    /// Message body.
    pub body: String,
    /// Sender identity overriding the adapter's configured default.
    pub from: Option<String>,
}

/// Normalized result of one vendor call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendOutcome {
    /// Whether the vendor accepted the message.
    pub success: bool,
    /// Vendor-assigned message identifier on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_message_id: Option<String>,
    /// Human-readable failure description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Vendor error code, or the HTTP status when the vendor gives none.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    /// Per-recipient message ids of a multi-recipient send, in recipient
    /// order. Empty when the vendor returns a single id for the whole call.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recipient_message_ids: Vec<String>,
}

impl SendOutcome {
    /// An accepted send.
    pub fn delivered(provider_message_id: Option<String>) -> Self {
        Self {
            success: true,
            provider_message_id,
            error_message: None,
            error_code: None,
            recipient_message_ids: Vec::new(),
        }
    }

    /// An accepted multi-recipient send with one id per recipient.
    ///
    /// `provider_message_id` carries the first id.
    pub fn delivered_each(recipient_message_ids: Vec<String>) -> Self {
        Self {
            success: true,
            provider_message_id: recipient_message_ids.first().cloned(),
            error_message: None,
            error_code: None,
            recipient_message_ids,
        }
    }

    /// Message id assigned to the recipient at `index` of the call.
    ///
    /// Falls back to `provider_message_id` when the vendor gave no
    /// per-recipient ids.
    pub fn message_id_for(&self, index: usize) -> Option<&str> {
        self.recipient_message_ids
            .get(index)
            .or(self.provider_message_id.as_ref())
            .map(String::as_str)
    }

    /// A vendor-side rejection.
    pub fn rejected(error_message: impl Into<String>, error_code: Option<String>) -> Self {
        Self {
            success: false,
            provider_message_id: None,
            error_message: Some(error_message.into()),
            error_code,
            recipient_message_ids: Vec::new(),
        }
    }
}

/// Result of a provider connectivity check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    /// Whether the vendor accepted our credentials.
    pub connected: bool,
    /// Account or domain name reported by the vendor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    /// Short description of the result.
    pub message: String,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Unexpected failures an adapter cannot express as a [`SendOutcome`].
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// HTTP transport failure (connect, timeout, TLS).
    #[error("provider request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// Success response did not match the expected schema.
    #[error("provider response parse error: {0}")]
    Parse(String),
    /// Adapter cannot serve the request with its current configuration.
    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

// ---------------------------------------------------------------------------
// HTTP helpers (shared by all adapters)
// ---------------------------------------------------------------------------

/// Status and body of a completed HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    /// HTTP status code.
    pub status: u16,
    /// Raw response body.
    pub body: String,
}

impl HttpReply {
    /// Whether the status is 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Turn a non-2xx reply into a rejected outcome.
    ///
    /// `vendor_message` replaces the raw body when the adapter could extract
    /// one; `vendor_code` falls back to the HTTP status. The message is
    /// sanitized before it leaves the adapter.
    pub fn into_rejection(
        self,
        vendor_code: Option<String>,
        vendor_message: Option<String>,
    ) -> SendOutcome {
        let detail = vendor_message.unwrap_or(self.body);
        let message = format!("HTTP {}: {}", self.status, sanitize_http_error_body(&detail));
        let code = vendor_code.unwrap_or_else(|| self.status.to_string());
        SendOutcome::rejected(message, Some(code))
    }
}

/// Read status and body from a response.
///
/// # Errors
///
/// Returns `ProviderError::Request` if the body cannot be read.
pub async fn read_http_response(response: reqwest::Response) -> Result<HttpReply, ProviderError> {
    let status = response.status().as_u16();
    let body = response.text().await?;
    Ok(HttpReply { status, body })
}

static SECRET_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"key-[0-9a-fA-F]{32}",
        r"[0-9a-f]{32}-[0-9a-f]{8}-[0-9a-f]{8}",
        r"(?:AC|SK)[0-9a-fA-F]{32}",
        r"(?:MA|SA)[A-Z0-9]{18}",
        r"[0-9a-fA-F]{32,}",
    ]
    .into_iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

/// Collapse whitespace, redact credential-shaped tokens and cap the length.
pub fn sanitize_http_error_body(raw: &str) -> String {
    let mut sanitized = raw.split_whitespace().collect::<Vec<_>>().join(" ");

    for regex in SECRET_PATTERNS.iter() {
        sanitized = regex.replace_all(&sanitized, "[REDACTED]").into_owned();
    }

    const MAX_ERROR_BODY_CHARS: usize = 256;
    if sanitized.chars().count() > MAX_ERROR_BODY_CHARS {
        let shortened = sanitized
            .chars()
            .take(MAX_ERROR_BODY_CHARS)
            .collect::<String>();
        return format!("{shortened}...[truncated]");
    }

    sanitized
}

/// Build an HTTP client with bounded connect and request timeouts.
///
/// Timeouts belong to the transport: the dispatch engine imposes no deadline
/// of its own beyond the retry budget.
pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(std::time::Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "failed to build HTTP client with timeouts, using default");
            reqwest::Client::default()
        })
}

/// HTTP connect timeout for vendor calls.
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// HTTP request timeout for vendor calls.
const REQUEST_TIMEOUT_SECS: u64 = 30;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Core delivery provider interface.
///
/// Implementations must be `Send + Sync`: one instance is shared by every
/// dispatch running against it.
#[async_trait]
pub trait DeliveryProvider: Send + Sync {
    /// Deliver `message` to a single recipient.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] on transport or decoding failure. Vendor
    /// rejections are reported as an unsuccessful [`SendOutcome`].
    async fn send_one(
        &self,
        recipient: &str,
        message: &OutboundMessage,
    ) -> Result<SendOutcome, ProviderError>;

    /// Deliver the same `message` to every recipient in one vendor call.
    ///
    /// The outcome covers the whole batch. Vendors that report one id per
    /// destination fill [`SendOutcome::recipient_message_ids`].
    ///
    /// # Errors
    ///
    /// Same as [`DeliveryProvider::send_one`].
    async fn send_many(
        &self,
        recipients: &[String],
        message: &OutboundMessage,
    ) -> Result<SendOutcome, ProviderError>;

    /// Verify credentials against the vendor without sending anything.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] when the vendor cannot be reached.
    async fn check_connection(&self) -> Result<ConnectionStatus, ProviderError>;

    /// Whether the vendor accepts several destinations in one call.
    ///
    /// The dispatch engine sends to providers answering `false` one
    /// recipient at a time, spaced by `delay_ms` and retried per recipient,
    /// instead of calling [`DeliveryProvider::send_many`].
    fn multi_destination(&self) -> bool {
        true
    }

    /// Lowercase provider name.
    fn name(&self) -> &str;

    /// Channel this provider delivers on.
    fn channel(&self) -> Channel;
}
