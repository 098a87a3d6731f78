//! Recipient address validation and normalization.
//!
//! Pure functions only: no DNS or carrier lookups, no I/O. Email addresses
//! must have a `local@domain.tld` shape; phone numbers must reduce to an
//! international number once everything but digits and a leading `+` is
//! stripped.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Country code assumed for bare 10-digit numbers when none is configured.
pub const DEFAULT_COUNTRY_CODE: &str = "1";

static EMAIL_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").ok());

static PHONE_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^\+?[1-9]\d{1,14}$").ok());

/// Message medium a dispatch goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Email with an optional subject line.
    Email,
    /// SMS text message; subjects are ignored.
    Sms,
}

impl Channel {
    /// Lowercase channel name as used in config and on the CLI.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Sms => "sms",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a channel name is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown channel '{0}', expected 'email' or 'sms'")]
pub struct UnknownChannel(pub String);

impl FromStr for Channel {
    type Err = UnknownChannel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "email" | "mail" => Ok(Self::Email),
            "sms" | "text" => Ok(Self::Sms),
            _ => Err(UnknownChannel(s.to_owned())),
        }
    }
}

/// Returns true when `address` is deliverable on `channel`.
pub fn is_valid(address: &str, channel: Channel) -> bool {
    match channel {
        Channel::Email => is_valid_email(address),
        Channel::Sms => is_valid_phone(address),
    }
}

/// Returns true for a conventional `local@domain.tld` address.
pub fn is_valid_email(address: &str) -> bool {
    EMAIL_PATTERN
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(address))
}

/// Returns true when the cleaned form of `address` is an international number.
pub fn is_valid_phone(address: &str) -> bool {
    let cleaned = clean_phone(address);
    PHONE_PATTERN
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(&cleaned))
}

/// Strip everything except digits and a single leading `+`.
pub fn clean_phone(address: &str) -> String {
    let trimmed = address.trim_start();
    let digits: String = trimmed.chars().filter(char::is_ascii_digit).collect();
    if trimmed.starts_with('+') {
        format!("+{digits}")
    } else {
        digits
    }
}

/// Coerce a phone number into `+<digits>` form.
///
/// Bare 10-digit numbers are assumed to be national numbers in
/// `default_country_code`. Anything else is taken to already include its
/// country code and only gains the `+` prefix.
pub fn normalize_phone(address: &str, default_country_code: &str) -> String {
    let cleaned = clean_phone(address);
    if cleaned.starts_with('+') {
        return cleaned;
    }

    if cleaned.len() == 10 {
        format!("+{default_country_code}{cleaned}")
    } else {
        format!("+{cleaned}")
    }
}

/// The form of `address` handed to a provider adapter.
///
/// Phone numbers are normalized; email addresses pass through untouched.
pub fn sendable_address(address: &str, channel: Channel, default_country_code: &str) -> String {
    match channel {
        Channel::Email => address.to_owned(),
        Channel::Sms => normalize_phone(address, default_country_code),
    }
}
