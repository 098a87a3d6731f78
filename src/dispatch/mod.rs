//! Bulk dispatch engine.
//!
//! One [`Dispatcher::dispatch`] call takes a recipient list through
//! exclusion, de-duplication and validation, then delivers either one
//! personalized message per recipient (sequential, throttled, retried) or a
//! single batch call covering every valid recipient. Providers that take one
//! destination per call get the sequential treatment for unpersonalized
//! sends too.
//!
//! Sends are strictly sequential within a dispatch: a recipient's full
//! attempt sequence, retry waits included, finishes before the next
//! recipient starts, and `delay_ms` separates consecutive recipients. The
//! engine holds no shared mutable state, so independent dispatches may run
//! concurrently against the same [`Dispatcher`].

pub mod report;

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::ledger::SentRecorder;
use crate::providers::router::{ProviderRouter, RouterError};
use crate::providers::{DeliveryProvider, OutboundMessage};
use crate::recipient::{is_valid, sendable_address, Channel, DEFAULT_COUNTRY_CODE};
use crate::template::{placeholders, render, MessageTemplate, TemplateVars};

use self::report::{DeliveryAttempt, DispatchReport, ReportBuilder};

/// Per-call options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DispatchOptions {
    /// Pause between recipients on the personalized path, in milliseconds.
    pub delay_ms: u64,
    /// Retries after the first failed attempt.
    pub max_retries: u32,
    /// Pause between attempts for one recipient, in milliseconds.
    pub retry_delay_ms: u64,
    /// Send one rendered message per recipient.
    pub personalize: bool,
    /// Variables applied to every recipient.
    pub variables: TemplateVars,
    /// Variables keyed by recipient address; these win over shared ones.
    pub per_recipient_variables: BTreeMap<String, TemplateVars>,
    /// Sender identity replacing the provider default.
    pub from_override: Option<String>,
    /// Addresses dropped before validation (case-insensitive).
    pub excluded_addresses: Vec<String>,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            delay_ms: 1000,
            max_retries: 3,
            retry_delay_ms: 2000,
            personalize: false,
            variables: TemplateVars::new(),
            per_recipient_variables: BTreeMap::new(),
            from_override: None,
            excluded_addresses: Vec::new(),
        }
    }
}

impl DispatchOptions {
    /// Whether this call takes the per-recipient path.
    pub fn is_personalized(&self) -> bool {
        self.personalize && !self.per_recipient_variables.is_empty()
    }

    fn variables_for(&self, address: &str) -> TemplateVars {
        let mut vars = self.variables.clone();
        let own = self.per_recipient_variables.get(address).or_else(|| {
            self.per_recipient_variables
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(address))
                .map(|(_, vars)| vars)
        });
        if let Some(own) = own {
            vars.extend(own.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        vars
    }
}

/// One bulk send.
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    /// Addresses in caller order.
    pub recipients: Vec<String>,
    /// Unrendered subject/body.
    pub template: MessageTemplate,
    /// Delivery channel.
    pub channel: Channel,
    /// Provider name, resolved through the router.
    pub provider: String,
    /// Per-call options.
    pub options: DispatchOptions,
    /// Catalog key recorded against each successful recipient.
    pub template_key: Option<String>,
}

impl DispatchRequest {
    /// A request with default options.
    pub fn new(
        recipients: Vec<String>,
        template: MessageTemplate,
        channel: Channel,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            recipients,
            template,
            channel,
            provider: provider.into(),
            options: DispatchOptions::default(),
            template_key: None,
        }
    }

    /// Replace the options.
    #[must_use]
    pub fn with_options(mut self, options: DispatchOptions) -> Self {
        self.options = options;
        self
    }

    /// Record `key` for every successful recipient.
    #[must_use]
    pub fn with_template_key(mut self, key: impl Into<String>) -> Self {
        self.template_key = Some(key.into());
        self
    }
}

/// Configuration errors raised before any send.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Provider name could not be resolved.
    #[error(transparent)]
    Router(#[from] RouterError),
    /// Provider does not deliver on the requested channel.
    #[error("provider '{provider}' delivers {provider_channel}, not {requested}")]
    ChannelMismatch {
        /// Provider name.
        provider: String,
        /// Channel the provider serves.
        provider_channel: Channel,
        /// Channel the request asked for.
        requested: Channel,
    },
}

/// The dispatch engine.
#[derive(Clone)]
pub struct Dispatcher {
    router: Arc<ProviderRouter>,
    recorder: Option<Arc<dyn SentRecorder>>,
    default_country_code: String,
    excluded_addresses: Vec<String>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("router", &self.router)
            .field("recorder", &self.recorder.is_some())
            .field("default_country_code", &self.default_country_code)
            .field("excluded_addresses", &self.excluded_addresses.len())
            .finish()
    }
}

impl Dispatcher {
    /// Engine over `router` with no recorder and no global deny-list.
    pub fn new(router: Arc<ProviderRouter>) -> Self {
        Self {
            router,
            recorder: None,
            default_country_code: DEFAULT_COUNTRY_CODE.to_owned(),
            excluded_addresses: Vec::new(),
        }
    }

    /// Engine using the deny-list and country code from `config`.
    pub fn from_config(config: &Config, router: Arc<ProviderRouter>) -> Self {
        Self::new(router)
            .with_default_country_code(config.sms.default_country_code.clone())
            .with_excluded_addresses(config.dispatch.excluded_addresses.clone())
    }

    /// Record sent templates through `recorder`.
    #[must_use]
    pub fn with_recorder(mut self, recorder: Arc<dyn SentRecorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Country code assumed for bare 10-digit phone numbers.
    #[must_use]
    pub fn with_default_country_code(mut self, code: impl Into<String>) -> Self {
        self.default_country_code = code.into();
        self
    }

    /// Deny-list applied to every dispatch in addition to per-call exclusions.
    #[must_use]
    pub fn with_excluded_addresses(mut self, addresses: Vec<String>) -> Self {
        self.excluded_addresses = addresses;
        self
    }

    /// Run one bulk send to completion.
    ///
    /// Invalid addresses are reported, never attempted. An empty valid set
    /// yields a zero-total report.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError`] when the provider cannot be resolved or does
    /// not serve the requested channel. Nothing has been sent in that case.
    pub async fn dispatch(&self, request: DispatchRequest) -> Result<DispatchReport, DispatchError> {
        let provider = self.router.resolve(&request.provider)?;
        if provider.channel() != request.channel {
            return Err(DispatchError::ChannelMismatch {
                provider: provider.name().to_owned(),
                provider_channel: provider.channel(),
                requested: request.channel,
            });
        }

        let mut report = ReportBuilder::start(provider.name(), request.channel);
        info!(
            dispatch_id = %report.id(),
            provider = provider.name(),
            channel = %request.channel,
            recipients = request.recipients.len(),
            personalized = request.options.is_personalized(),
            "dispatch started"
        );

        let candidates = self.screen(
            &request.recipients,
            &request.options.excluded_addresses,
            request.channel,
        );
        let mut valid = Vec::with_capacity(candidates.len());
        for address in candidates {
            if is_valid(&address, request.channel) {
                valid.push(address);
            } else {
                debug!(address = %address, "invalid address, skipping");
                report.record_invalid(&address);
            }
        }

        if request.options.is_personalized() {
            self.send_sequential(provider.as_ref(), &request, &valid, None, &mut report)
                .await;
        } else if provider.multi_destination() {
            self.send_batch(provider.as_ref(), &request, &valid, &mut report)
                .await;
        } else {
            debug!(
                provider = provider.name(),
                "provider takes one destination per call, sending sequentially"
            );
            let shared = self.shared_message(&request);
            self.send_sequential(
                provider.as_ref(),
                &request,
                &valid,
                Some(&shared),
                &mut report,
            )
            .await;
        }

        let report = report.finish();
        info!(
            dispatch_id = %report.id,
            total = report.total,
            successful = report.successful.len(),
            failed = report.failed.len(),
            invalid = report.invalid.len(),
            success_rate = report.success_rate(),
            duration_ms = report.duration_ms(),
            "dispatch finished"
        );
        Ok(report)
    }

    /// Drop excluded addresses and later duplicates, keeping input order.
    ///
    /// Phone numbers are compared in their sendable form, so differently
    /// formatted spellings of one number count as duplicates.
    fn screen(
        &self,
        recipients: &[String],
        per_call_excluded: &[String],
        channel: Channel,
    ) -> Vec<String> {
        let excluded: HashSet<String> = self
            .excluded_addresses
            .iter()
            .chain(per_call_excluded)
            .map(|address| self.identity(address, channel))
            .collect();

        let mut seen = HashSet::new();
        let mut kept = Vec::with_capacity(recipients.len());
        for raw in recipients {
            let address = raw.trim();
            let key = self.identity(address, channel);
            if excluded.contains(&key) {
                debug!(address, "excluded address dropped");
                continue;
            }
            if !seen.insert(key) {
                debug!(address, "duplicate address dropped");
                continue;
            }
            kept.push(address.to_owned());
        }
        kept
    }

    /// Key two addresses share when they reach the same destination.
    fn identity(&self, address: &str, channel: Channel) -> String {
        let address = address.trim();
        match channel {
            Channel::Sms if is_valid(address, channel) => {
                sendable_address(address, channel, &self.default_country_code)
            }
            _ => address.to_lowercase(),
        }
    }

    fn outbound(&self, request: &DispatchRequest, rendered: MessageTemplate) -> OutboundMessage {
        let subject = match request.channel {
            Channel::Email => rendered.subject,
            Channel::Sms => None,
        };
        OutboundMessage {
            subject,
            body: rendered.body,
            from: request.options.from_override.clone(),
        }
    }

    /// The message every recipient receives when nothing is personalized.
    fn shared_message(&self, request: &DispatchRequest) -> OutboundMessage {
        let rendered = render(&request.template, &request.options.variables);
        let unfilled = placeholders(&rendered.body);
        if !unfilled.is_empty() {
            warn!(?unfilled, "shared message has unfilled placeholders");
        }
        self.outbound(request, rendered)
    }

    /// One recipient at a time, each retried, with `delay_ms` between them.
    ///
    /// `shared` is sent as-is when given; otherwise the template is rendered
    /// per recipient.
    async fn send_sequential(
        &self,
        provider: &dyn DeliveryProvider,
        request: &DispatchRequest,
        valid: &[String],
        shared: Option<&OutboundMessage>,
        report: &mut ReportBuilder,
    ) {
        let options = &request.options;
        let mut remaining = valid.len();

        for address in valid {
            remaining = remaining.saturating_sub(1);

            let message = match shared {
                Some(message) => message.clone(),
                None => {
                    let vars = options.variables_for(address);
                    let rendered = render(&request.template, &vars);
                    let unfilled = placeholders(&rendered.body);
                    if !unfilled.is_empty() {
                        debug!(address = %address, ?unfilled, "placeholders left unfilled");
                    }
                    self.outbound(request, rendered)
                }
            };
            let target = sendable_address(address, request.channel, &self.default_country_code);

            let attempts = deliver_with_retry(provider, &target, &message, options).await;
            if attempts.last().is_some_and(|a| a.success) {
                report.record_success(address, attempts);
                self.mark_sent(request.template_key.as_deref(), address).await;
            } else {
                report.record_failure(address, attempts);
            }

            if remaining > 0 && options.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(options.delay_ms)).await;
            }
        }
    }

    async fn send_batch(
        &self,
        provider: &dyn DeliveryProvider,
        request: &DispatchRequest,
        valid: &[String],
        report: &mut ReportBuilder,
    ) {
        if valid.is_empty() {
            debug!("no valid recipients, skipping batch send");
            return;
        }

        let message = self.shared_message(request);
        let targets: Vec<String> = valid
            .iter()
            .map(|address| sendable_address(address, request.channel, &self.default_country_code))
            .collect();

        let attempt = match provider.send_many(&targets, &message).await {
            Ok(outcome) if outcome.success => {
                debug!(recipients = valid.len(), "batch accepted");
                for (index, address) in valid.iter().enumerate() {
                    let mut attempt = DeliveryAttempt::from_outcome(1, &outcome);
                    attempt.provider_message_id = outcome.message_id_for(index).map(str::to_owned);
                    report.record_success(address, vec![attempt]);
                    self.mark_sent(request.template_key.as_deref(), address).await;
                }
                return;
            }
            Ok(outcome) => DeliveryAttempt::from_outcome(1, &outcome),
            Err(e) => DeliveryAttempt::from_error(1, &e),
        };

        warn!(
            recipients = valid.len(),
            error = attempt.error.as_deref().unwrap_or("unknown"),
            "batch rejected, marking every recipient failed"
        );
        for address in valid {
            report.record_failure(address, vec![attempt.clone()]);
        }
    }

    async fn mark_sent(&self, template_key: Option<&str>, address: &str) {
        let (Some(key), Some(recorder)) = (template_key, self.recorder.as_ref()) else {
            return;
        };
        if let Err(e) = recorder.mark_sent(address, key).await {
            warn!(address, template_key = key, error = %e, "failed to record sent template");
        }
    }
}

/// Deliver to one recipient, retrying up to `max_retries` times.
///
/// Returns the attempt history; the last entry is the final outcome.
async fn deliver_with_retry(
    provider: &dyn DeliveryProvider,
    destination: &str,
    message: &OutboundMessage,
    options: &DispatchOptions,
) -> Vec<DeliveryAttempt> {
    let max_attempts = options.max_retries.saturating_add(1);
    let mut attempts = Vec::new();

    for attempt in 1..=max_attempts {
        let record = match provider.send_one(destination, message).await {
            Ok(outcome) => DeliveryAttempt::from_outcome(attempt, &outcome),
            Err(e) => DeliveryAttempt::from_error(attempt, &e),
        };

        if record.success {
            debug!(destination, attempt, "delivered");
            attempts.push(record);
            break;
        }

        warn!(
            destination,
            attempt,
            max_attempts,
            error = record.error.as_deref().unwrap_or("unknown"),
            "delivery attempt failed"
        );
        attempts.push(record);

        if attempt < max_attempts && options.retry_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(options.retry_delay_ms)).await;
        }
    }

    attempts
}
