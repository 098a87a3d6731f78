//! Per-recipient outcome aggregation.
//!
//! [`ReportBuilder`] accumulates outcomes in processing order into three
//! disjoint lists. An address is recorded at most once across all of them.
//! [`DispatchReport`] is the immutable result; [`DispatchSummary`] is its
//! presentation form.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::providers::{ProviderError, SendOutcome};
use crate::recipient::Channel;

/// One delivery try against one recipient. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryAttempt {
    /// 1-based attempt number; the first attempt is not a retry.
    pub attempt: u32,
    /// Whether the vendor accepted the message.
    pub success: bool,
    /// Vendor message id on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_message_id: Option<String>,
    /// Failure description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Vendor error code or HTTP status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    /// When the attempt completed.
    pub at: DateTime<Utc>,
}

impl DeliveryAttempt {
    /// Record an adapter outcome.
    pub fn from_outcome(attempt: u32, outcome: &SendOutcome) -> Self {
        Self {
            attempt,
            success: outcome.success,
            provider_message_id: outcome.provider_message_id.clone(),
            error: outcome.error_message.clone(),
            error_code: outcome.error_code.clone(),
            at: Utc::now(),
        }
    }

    /// Record a transport or decoding failure.
    pub fn from_error(attempt: u32, error: &ProviderError) -> Self {
        Self {
            attempt,
            success: false,
            provider_message_id: None,
            error: Some(error.to_string()),
            error_code: None,
            at: Utc::now(),
        }
    }

    /// Retries consumed before this attempt.
    pub fn retry_index(&self) -> u32 {
        self.attempt.saturating_sub(1)
    }
}

/// A recipient the vendor accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuccessfulDelivery {
    /// Address as supplied by the caller.
    pub address: String,
    /// Vendor message id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_message_id: Option<String>,
    /// Retries needed before the successful attempt.
    pub retries: u32,
    /// Attempt history, oldest first.
    pub attempts: Vec<DeliveryAttempt>,
}

/// A recipient whose attempts were all rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedDelivery {
    /// Address as supplied by the caller.
    pub address: String,
    /// Error from the last attempt.
    pub error: String,
    /// Error code from the last attempt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    /// Attempts made.
    pub retries: u32,
    /// Attempt history, oldest first.
    pub attempts: Vec<DeliveryAttempt>,
}

/// Terminal aggregate of one dispatch.
///
/// `total` counts attempted recipients only:
/// `total == successful.len() + failed.len()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchReport {
    /// Dispatch identifier.
    pub id: Uuid,
    /// Provider the dispatch went through.
    pub provider: String,
    /// Delivery channel.
    pub channel: Channel,
    /// Recipients attempted.
    pub total: usize,
    /// Accepted recipients in input order.
    pub successful: Vec<SuccessfulDelivery>,
    /// Failed recipients in input order.
    pub failed: Vec<FailedDelivery>,
    /// Addresses rejected by validation, never attempted.
    pub invalid: Vec<String>,
    /// Dispatch start.
    pub started_at: DateTime<Utc>,
    /// Dispatch end.
    pub finished_at: DateTime<Utc>,
}

impl DispatchReport {
    /// Percentage of attempted recipients that succeeded; 0 when none were attempted.
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        let successful = u32::try_from(self.successful.len()).unwrap_or(u32::MAX);
        let total = u32::try_from(self.total).unwrap_or(u32::MAX);
        f64::from(successful) / f64::from(total) * 100.0
    }

    /// Wall-clock milliseconds between start and finish.
    pub fn duration_ms(&self) -> u64 {
        let elapsed = self
            .finished_at
            .signed_duration_since(self.started_at)
            .num_milliseconds();
        u64::try_from(elapsed).unwrap_or(0)
    }

    /// Presentation form with counts and rounded success rate.
    pub fn summary(&self) -> DispatchSummary {
        DispatchSummary {
            id: self.id,
            provider: self.provider.clone(),
            channel: self.channel,
            total: self.total,
            successful: self.successful.len(),
            failed: self.failed.len(),
            invalid: self.invalid.len(),
            success_rate: round_two_places(self.success_rate()),
            duration_ms: self.duration_ms(),
            start_time: self.started_at,
            end_time: self.finished_at,
            failed_recipients: self
                .failed
                .iter()
                .map(|entry| FailedSummary {
                    address: entry.address.clone(),
                    error: entry.error.clone(),
                    retries: entry.retries,
                })
                .collect(),
            invalid_recipients: self.invalid.clone(),
        }
    }
}

fn round_two_places(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Failed entry as presented to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedSummary {
    /// Address as supplied by the caller.
    pub address: String,
    /// Last error.
    pub error: String,
    /// Attempts made.
    pub retries: u32,
}

/// Serialized report returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchSummary {
    /// Dispatch identifier.
    pub id: Uuid,
    /// Provider name.
    pub provider: String,
    /// Delivery channel.
    pub channel: Channel,
    /// Recipients attempted.
    pub total: usize,
    /// Accepted count.
    pub successful: usize,
    /// Failed count.
    pub failed: usize,
    /// Invalid count.
    pub invalid: usize,
    /// Success percentage rounded to two decimals.
    pub success_rate: f64,
    /// Duration in milliseconds.
    pub duration_ms: u64,
    /// Dispatch start.
    pub start_time: DateTime<Utc>,
    /// Dispatch end.
    pub end_time: DateTime<Utc>,
    /// Failed recipients with their last error.
    pub failed_recipients: Vec<FailedSummary>,
    /// Raw invalid addresses.
    pub invalid_recipients: Vec<String>,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Append-only accumulator used while a dispatch runs.
#[derive(Debug)]
pub struct ReportBuilder {
    id: Uuid,
    provider: String,
    channel: Channel,
    started_at: DateTime<Utc>,
    seen: HashSet<String>,
    successful: Vec<SuccessfulDelivery>,
    failed: Vec<FailedDelivery>,
    invalid: Vec<String>,
}

impl ReportBuilder {
    /// Start a report now.
    pub fn start(provider: impl Into<String>, channel: Channel) -> Self {
        Self {
            id: Uuid::new_v4(),
            provider: provider.into(),
            channel,
            started_at: Utc::now(),
            seen: HashSet::new(),
            successful: Vec::new(),
            failed: Vec::new(),
            invalid: Vec::new(),
        }
    }

    /// Dispatch identifier assigned at start.
    pub fn id(&self) -> Uuid {
        self.id
    }

    fn claim(&mut self, address: &str) -> bool {
        let fresh = self.seen.insert(address.to_lowercase());
        if !fresh {
            tracing::warn!(address, "address already recorded, ignoring duplicate outcome");
        }
        fresh
    }

    /// Record an address rejected by validation. Returns false for duplicates.
    pub fn record_invalid(&mut self, address: &str) -> bool {
        if !self.claim(address) {
            return false;
        }
        self.invalid.push(address.to_owned());
        true
    }

    /// Record an accepted recipient. Returns false for duplicates.
    pub fn record_success(&mut self, address: &str, attempts: Vec<DeliveryAttempt>) -> bool {
        if !self.claim(address) {
            return false;
        }
        let last = attempts.last();
        let provider_message_id = last.and_then(|a| a.provider_message_id.clone());
        let retries = last.map_or(0, DeliveryAttempt::retry_index);
        self.successful.push(SuccessfulDelivery {
            address: address.to_owned(),
            provider_message_id,
            retries,
            attempts,
        });
        true
    }

    /// Record a recipient whose attempts all failed. Returns false for duplicates.
    pub fn record_failure(&mut self, address: &str, attempts: Vec<DeliveryAttempt>) -> bool {
        if !self.claim(address) {
            return false;
        }
        let last = attempts.last();
        let error = last
            .and_then(|a| a.error.clone())
            .unwrap_or_else(|| "no delivery attempt recorded".to_owned());
        let error_code = last.and_then(|a| a.error_code.clone());
        let retries = u32::try_from(attempts.len()).unwrap_or(u32::MAX);
        self.failed.push(FailedDelivery {
            address: address.to_owned(),
            error,
            error_code,
            retries,
            attempts,
        });
        true
    }

    /// Stamp the end time and freeze the report.
    pub fn finish(self) -> DispatchReport {
        DispatchReport {
            id: self.id,
            provider: self.provider,
            channel: self.channel,
            total: self.successful.len().saturating_add(self.failed.len()),
            successful: self.successful,
            failed: self.failed,
            invalid: self.invalid,
            started_at: self.started_at,
            finished_at: Utc::now(),
        }
    }
}
