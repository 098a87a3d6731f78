//! Dispatch engine behavior against scripted providers.

use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bulkcast::dispatch::{DispatchError, DispatchOptions, DispatchRequest, Dispatcher};
use bulkcast::ledger::{MemoryLedger, SentRecorder};
use bulkcast::providers::router::{ProviderRouter, RouterError};
use bulkcast::providers::DeliveryProvider;
use bulkcast::recipient::Channel;
use bulkcast::template::{MessageTemplate, TemplateVars};

use crate::stub::{Behavior, StubProvider};

fn dispatcher_for(provider: StubProvider) -> Dispatcher {
    let name = provider.name().to_owned();
    Dispatcher::new(Arc::new(ProviderRouter::for_testing(&name, Arc::new(provider))))
}

fn quick_options() -> DispatchOptions {
    DispatchOptions {
        delay_ms: 0,
        retry_delay_ms: 0,
        ..DispatchOptions::default()
    }
}

fn vars(pairs: &[(&str, &str)]) -> TemplateVars {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect()
}

fn addresses(list: &[&str]) -> Vec<String> {
    list.iter().map(|a| (*a).to_owned()).collect()
}

fn email_request(recipients: &[&str], body: &str) -> DispatchRequest {
    DispatchRequest::new(
        addresses(recipients),
        MessageTemplate::new(body).with_subject("Notice"),
        Channel::Email,
        "stub",
    )
    .with_options(quick_options())
}

#[tokio::test]
async fn invalid_addresses_are_reported_not_attempted() {
    let stub = StubProvider::new("stub", Channel::Email, Behavior::AlwaysSucceed);
    let calls = stub.calls();
    let sent = stub.sent();
    let dispatcher = dispatcher_for(stub);

    let report = dispatcher
        .dispatch(email_request(&["a@x.com", "not-an-email"], "Hello"))
        .await
        .expect("dispatch should run");

    assert_eq!(report.total, 1);
    assert_eq!(report.successful.len(), 1);
    assert!(report.failed.is_empty());
    assert_eq!(report.invalid, vec!["not-an-email".to_owned()]);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let sent = sent.lock().expect("sent log lock");
    assert!(sent[0].batch);
    assert_eq!(sent[0].recipients, vec!["a@x.com".to_owned()]);
}

#[tokio::test]
async fn personalized_send_renders_per_recipient() {
    let stub = StubProvider::new("stub", Channel::Email, Behavior::AlwaysSucceed);
    let sent = stub.sent();
    let dispatcher = dispatcher_for(stub);

    let mut request = email_request(&["a@x.com"], "Hi {{name}}");
    request.options.personalize = true;
    request.options.per_recipient_variables =
        BTreeMap::from([("a@x.com".to_owned(), vars(&[("name", "Sam")]))]);

    let report = dispatcher.dispatch(request).await.expect("dispatch should run");
    assert_eq!(report.successful.len(), 1);

    let sent = sent.lock().expect("sent log lock");
    assert_eq!(sent.len(), 1);
    assert!(!sent[0].batch);
    assert_eq!(sent[0].message.body, "Hi Sam");
}

#[tokio::test]
async fn per_recipient_variables_override_shared_ones() {
    let stub = StubProvider::new("stub", Channel::Email, Behavior::AlwaysSucceed);
    let sent = stub.sent();
    let dispatcher = dispatcher_for(stub);

    let mut request = email_request(&["a@x.com", "b@x.com"], "{{greeting}} {{name}} from {{firm}}");
    request.options.personalize = true;
    request.options.variables = vars(&[("greeting", "Hello"), ("firm", "Acme"), ("name", "client")]);
    request.options.per_recipient_variables =
        BTreeMap::from([("A@X.com".to_owned(), vars(&[("name", "Ann")]))]);

    dispatcher.dispatch(request).await.expect("dispatch should run");

    let sent = sent.lock().expect("sent log lock");
    assert_eq!(sent[0].message.body, "Hello Ann from Acme");
    assert_eq!(sent[1].message.body, "Hello client from Acme");
}

#[tokio::test]
async fn personalize_without_variables_uses_batch_path() {
    let stub = StubProvider::new("stub", Channel::Email, Behavior::AlwaysSucceed);
    let sent = stub.sent();
    let dispatcher = dispatcher_for(stub);

    let mut request = email_request(&["a@x.com", "b@x.com"], "Hi {{firm}}");
    request.options.personalize = true;
    request.options.variables = vars(&[("firm", "Acme")]);

    let report = dispatcher.dispatch(request).await.expect("dispatch should run");
    assert_eq!(report.successful.len(), 2);

    let sent = sent.lock().expect("sent log lock");
    assert_eq!(sent.len(), 1);
    assert!(sent[0].batch);
    assert_eq!(sent[0].message.body, "Hi Acme");
}

#[tokio::test]
async fn success_after_two_failures_records_two_retries() {
    let stub = StubProvider::new("stub", Channel::Email, Behavior::RejectFirst(2));
    let calls = stub.calls();
    let dispatcher = dispatcher_for(stub);

    let mut request = email_request(&["a@x.com"], "Hi {{name}}");
    request.options.personalize = true;
    request.options.max_retries = 3;
    request.options.per_recipient_variables =
        BTreeMap::from([("a@x.com".to_owned(), vars(&[("name", "Sam")]))]);

    let report = dispatcher.dispatch(request).await.expect("dispatch should run");
    assert!(report.failed.is_empty());
    let entry = &report.successful[0];
    assert_eq!(entry.retries, 2);
    assert_eq!(entry.attempts.len(), 3);
    assert!(!entry.attempts[0].success);
    assert!(entry.attempts[2].success);
    assert_eq!(entry.provider_message_id.as_deref(), Some("msg-2"));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn exhausted_retries_keep_last_error() {
    let stub = StubProvider::new("stub", Channel::Email, Behavior::AlwaysReject);
    let calls = stub.calls();
    let dispatcher = dispatcher_for(stub);

    let mut request = email_request(&["a@x.com"], "Hi {{name}}");
    request.options.personalize = true;
    request.options.max_retries = 2;
    request.options.per_recipient_variables =
        BTreeMap::from([("a@x.com".to_owned(), vars(&[("name", "Sam")]))]);

    let report = dispatcher.dispatch(request).await.expect("dispatch should run");
    assert!(report.successful.is_empty());
    let entry = &report.failed[0];
    assert_eq!(entry.retries, 3);
    assert_eq!(entry.attempts.len(), 3);
    assert_eq!(entry.error, "HTTP 429: rate limited (call 2)");
    assert_eq!(entry.error_code.as_deref(), Some("429"));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn zero_retries_means_a_single_attempt() {
    let stub = StubProvider::new("stub", Channel::Email, Behavior::AlwaysReject);
    let calls = stub.calls();
    let dispatcher = dispatcher_for(stub);

    let mut request = email_request(&["a@x.com"], "Hi {{name}}");
    request.options.personalize = true;
    request.options.max_retries = 0;
    request.options.retry_delay_ms = 2000;
    request.options.per_recipient_variables =
        BTreeMap::from([("a@x.com".to_owned(), vars(&[("name", "Sam")]))]);

    let started = tokio::time::Instant::now();
    let report = dispatcher.dispatch(request).await.expect("dispatch should run");
    assert!(started.elapsed() < Duration::from_millis(2000));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let entry = &report.failed[0];
    assert_eq!(entry.retries, 1);
    assert_eq!(entry.attempts.len(), 1);
    assert_eq!(entry.error, "HTTP 429: rate limited (call 0)");
}

#[tokio::test]
async fn transport_errors_are_retried_like_rejections() {
    let stub = StubProvider::new("stub", Channel::Email, Behavior::TransportError);
    let calls = stub.calls();
    let dispatcher = dispatcher_for(stub);

    let mut request = email_request(&["a@x.com"], "Hi {{name}}");
    request.options.personalize = true;
    request.options.max_retries = 1;
    request.options.per_recipient_variables =
        BTreeMap::from([("a@x.com".to_owned(), vars(&[("name", "Sam")]))]);

    let report = dispatcher.dispatch(request).await.expect("dispatch should run");
    assert_eq!(report.failed.len(), 1);
    assert!(report.failed[0].error.contains("connection reset"));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn excluded_addresses_appear_nowhere() {
    let stub = StubProvider::new("stub", Channel::Email, Behavior::AlwaysSucceed);
    let dispatcher = dispatcher_for(stub);

    let mut request = email_request(&["blocked@x.com", "ok@x.com"], "Hello");
    request.options.excluded_addresses = vec!["BLOCKED@x.com".to_owned()];

    let report = dispatcher.dispatch(request).await.expect("dispatch should run");
    assert_eq!(report.total, 1);
    let mentioned = report
        .successful
        .iter()
        .map(|s| s.address.as_str())
        .chain(report.failed.iter().map(|f| f.address.as_str()))
        .chain(report.invalid.iter().map(String::as_str));
    for address in mentioned {
        assert!(!address.eq_ignore_ascii_case("blocked@x.com"));
    }
}

#[tokio::test]
async fn global_exclusions_merge_with_per_call_list() {
    let stub = StubProvider::new("stub", Channel::Email, Behavior::AlwaysSucceed);
    let dispatcher = dispatcher_for(stub).with_excluded_addresses(vec!["global@x.com".to_owned()]);

    let mut request = email_request(&["global@x.com", "call@x.com", "ok@x.com"], "Hello");
    request.options.excluded_addresses = vec!["call@x.com".to_owned()];

    let report = dispatcher.dispatch(request).await.expect("dispatch should run");
    assert_eq!(report.total, 1);
    assert_eq!(report.successful[0].address, "ok@x.com");
}

#[tokio::test]
async fn duplicate_addresses_are_sent_once() {
    let stub = StubProvider::new("stub", Channel::Email, Behavior::AlwaysSucceed);
    let sent = stub.sent();
    let dispatcher = dispatcher_for(stub);

    let report = dispatcher
        .dispatch(email_request(&["a@x.com", "A@X.COM", "b@x.com"], "Hello"))
        .await
        .expect("dispatch should run");
    assert_eq!(report.total, 2);

    let sent = sent.lock().expect("sent log lock");
    assert_eq!(sent[0].recipients, addresses(&["a@x.com", "b@x.com"]));
}

#[tokio::test]
async fn differently_formatted_phone_numbers_are_sent_once() {
    let stub = StubProvider::new("stub", Channel::Sms, Behavior::AlwaysSucceed);
    let sent = stub.sent();
    let dispatcher = dispatcher_for(stub);

    let request = DispatchRequest::new(
        addresses(&["555-123-4567", "(555) 123-4567", "+1 555 123 4567", "+44 7700 900123"]),
        MessageTemplate::new("Reminder"),
        Channel::Sms,
        "stub",
    )
    .with_options(quick_options());

    let report = dispatcher.dispatch(request).await.expect("dispatch should run");
    assert_eq!(report.total, 2);
    assert_eq!(report.successful[0].address, "555-123-4567");
    assert_eq!(report.successful[1].address, "+44 7700 900123");

    let sent = sent.lock().expect("sent log lock");
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipients, addresses(&["+15551234567", "+447700900123"]));
}

#[tokio::test]
async fn excluded_phone_number_matches_any_formatting() {
    let stub = StubProvider::new("stub", Channel::Sms, Behavior::AlwaysSucceed);
    let dispatcher = dispatcher_for(stub);

    let mut request = DispatchRequest::new(
        addresses(&["(555) 123-4567", "+447700900123"]),
        MessageTemplate::new("Reminder"),
        Channel::Sms,
        "stub",
    )
    .with_options(quick_options());
    request.options.excluded_addresses = addresses(&["+1 555 123 4567"]);

    let report = dispatcher.dispatch(request).await.expect("dispatch should run");
    assert_eq!(report.total, 1);
    assert_eq!(report.successful[0].address, "+447700900123");
    assert!(report.invalid.is_empty());
}

#[tokio::test]
async fn batch_success_gives_each_recipient_its_own_message_id() {
    let stub = StubProvider::new("stub", Channel::Email, Behavior::AlwaysSucceed);
    let dispatcher = dispatcher_for(stub);

    let report = dispatcher
        .dispatch(email_request(&["a@x.com", "b@x.com"], "Hello"))
        .await
        .expect("dispatch should run");

    let ids: Vec<Option<&str>> = report
        .successful
        .iter()
        .map(|entry| entry.provider_message_id.as_deref())
        .collect();
    assert_eq!(ids, vec![Some("msg-0-0"), Some("msg-0-1")]);
    assert_eq!(
        report.successful[1].attempts[0].provider_message_id.as_deref(),
        Some("msg-0-1")
    );
}

#[tokio::test]
async fn batch_failure_fails_every_recipient_with_same_error() {
    let stub = StubProvider::new("stub", Channel::Email, Behavior::AlwaysReject);
    let calls = stub.calls();
    let dispatcher = dispatcher_for(stub);

    let report = dispatcher
        .dispatch(email_request(&["a@x.com", "b@x.com", "bad"], "Hello"))
        .await
        .expect("dispatch should run");

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(report.total, 2);
    assert_eq!(report.failed.len(), 2);
    assert_eq!(report.failed[0].error, report.failed[1].error);
    assert_eq!(report.failed[0].retries, 1);
    assert_eq!(report.invalid, vec!["bad".to_owned()]);
    assert_eq!(report.success_rate(), 0.0);
}

#[tokio::test]
async fn no_valid_recipients_yields_empty_report() {
    let stub = StubProvider::new("stub", Channel::Email, Behavior::AlwaysSucceed);
    let calls = stub.calls();
    let dispatcher = dispatcher_for(stub);

    let report = dispatcher
        .dispatch(email_request(&["nope", "also nope"], "Hello"))
        .await
        .expect("empty dispatch is not an error");
    assert_eq!(report.total, 0);
    assert_eq!(report.invalid.len(), 2);
    assert_eq!(report.success_rate(), 0.0);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unknown_provider_fails_before_sending() {
    let stub = StubProvider::new("stub", Channel::Email, Behavior::AlwaysSucceed);
    let calls = stub.calls();
    let dispatcher = dispatcher_for(stub);

    let mut request = email_request(&["a@x.com"], "Hello");
    request.provider = "carrier-pigeon".to_owned();

    match dispatcher.dispatch(request).await {
        Err(DispatchError::Router(RouterError::UnsupportedProvider { provider })) => {
            assert_eq!(provider, "carrier-pigeon");
        }
        Err(other) => panic!("expected unsupported provider, got: {other}"),
        Ok(_) => panic!("dispatch should fail fast"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn channel_mismatch_is_a_configuration_error() {
    let stub = StubProvider::new("stub", Channel::Sms, Behavior::AlwaysSucceed);
    let dispatcher = dispatcher_for(stub);

    let result = dispatcher.dispatch(email_request(&["a@x.com"], "Hello")).await;
    assert!(matches!(result, Err(DispatchError::ChannelMismatch { .. })));
}

#[tokio::test]
async fn sms_sends_normalized_numbers_and_reports_originals() {
    let stub = StubProvider::new("stub", Channel::Sms, Behavior::AlwaysSucceed);
    let sent = stub.sent();
    let dispatcher = dispatcher_for(stub);

    let request = DispatchRequest::new(
        addresses(&["(555) 123-4567", "+44 7700 900123"]),
        MessageTemplate::new("Reminder").with_subject("dropped for sms"),
        Channel::Sms,
        "stub",
    )
    .with_options(quick_options());

    let report = dispatcher.dispatch(request).await.expect("dispatch should run");
    assert_eq!(report.successful[0].address, "(555) 123-4567");
    assert_eq!(report.successful[1].address, "+44 7700 900123");

    let sent = sent.lock().expect("sent log lock");
    assert_eq!(sent[0].recipients, addresses(&["+15551234567", "+447700900123"]));
    assert_eq!(sent[0].message.subject, None);
}

#[tokio::test]
async fn configured_country_code_applies_to_bare_numbers() {
    let stub = StubProvider::new("stub", Channel::Sms, Behavior::AlwaysSucceed);
    let sent = stub.sent();
    let dispatcher = dispatcher_for(stub).with_default_country_code("61");

    let request = DispatchRequest::new(
        addresses(&["4123456789"]),
        MessageTemplate::new("Reminder"),
        Channel::Sms,
        "stub",
    )
    .with_options(quick_options());

    dispatcher.dispatch(request).await.expect("dispatch should run");
    let sent = sent.lock().expect("sent log lock");
    assert_eq!(sent[0].recipients, addresses(&["+614123456789"]));
}

#[tokio::test]
async fn from_override_reaches_the_adapter() {
    let stub = StubProvider::new("stub", Channel::Email, Behavior::AlwaysSucceed);
    let sent = stub.sent();
    let dispatcher = dispatcher_for(stub);

    let mut request = email_request(&["a@x.com"], "Hello");
    request.options.from_override = Some("Partner <partner@x.com>".to_owned());

    dispatcher.dispatch(request).await.expect("dispatch should run");
    let sent = sent.lock().expect("sent log lock");
    assert_eq!(sent[0].message.from.as_deref(), Some("Partner <partner@x.com>"));
}

#[tokio::test]
async fn successful_recipients_are_marked_sent() {
    let stub = StubProvider::new("stub", Channel::Email, Behavior::AlwaysSucceed);
    let ledger = Arc::new(MemoryLedger::new());
    let dispatcher = dispatcher_for(stub).with_recorder(Arc::clone(&ledger) as Arc<dyn SentRecorder>);

    let request = email_request(&["a@x.com", "b@x.com", "broken"], "Hello")
        .with_template_key("welcomeEmail");
    dispatcher.dispatch(request).await.expect("dispatch should run");

    assert!(ledger.was_sent("a@x.com", "welcomeEmail").await);
    assert!(ledger.was_sent("b@x.com", "welcomeEmail").await);
    assert_eq!(ledger.snapshot().await.len(), 2);
}

#[tokio::test]
async fn failed_recipients_are_not_marked_sent() {
    let stub = StubProvider::new("stub", Channel::Email, Behavior::AlwaysReject);
    let ledger = Arc::new(MemoryLedger::new());
    let dispatcher = dispatcher_for(stub).with_recorder(Arc::clone(&ledger) as Arc<dyn SentRecorder>);

    let request = email_request(&["a@x.com"], "Hello").with_template_key("welcomeEmail");
    dispatcher.dispatch(request).await.expect("dispatch should run");

    assert!(ledger.snapshot().await.is_empty());
}

struct BrokenLedger;

#[async_trait]
impl SentRecorder for BrokenLedger {
    async fn mark_sent(&self, _address: &str, _template_key: &str) -> anyhow::Result<()> {
        Err(anyhow::anyhow!("record store offline"))
    }
}

#[tokio::test]
async fn recorder_failures_do_not_fail_the_dispatch() {
    let stub = StubProvider::new("stub", Channel::Email, Behavior::AlwaysSucceed);
    let dispatcher = dispatcher_for(stub).with_recorder(Arc::new(BrokenLedger));

    let request = email_request(&["a@x.com"], "Hello").with_template_key("welcomeEmail");
    let report = dispatcher.dispatch(request).await.expect("dispatch should run");
    assert_eq!(report.successful.len(), 1);
}

#[tokio::test]
async fn outcomes_keep_input_order_and_partition_totals() {
    let stub = StubProvider::new("stub", Channel::Email, Behavior::RejectFirst(4));
    let dispatcher = dispatcher_for(stub);

    let mut request = email_request(&["c@x.com", "bad", "a@x.com", "b@x.com"], "Hi {{name}}");
    request.options.personalize = true;
    request.options.max_retries = 1;
    request.options.per_recipient_variables =
        BTreeMap::from([("a@x.com".to_owned(), vars(&[("name", "Ann")]))]);

    let report = dispatcher.dispatch(request).await.expect("dispatch should run");
    assert_eq!(report.total, report.successful.len() + report.failed.len());
    assert_eq!(report.total, 3);
    let failed: Vec<&str> = report.failed.iter().map(|f| f.address.as_str()).collect();
    assert_eq!(failed, vec!["c@x.com", "a@x.com"]);
    assert_eq!(report.successful[0].address, "b@x.com");
    assert_eq!(report.invalid, vec!["bad".to_owned()]);
}

#[tokio::test(start_paused = true)]
async fn throttle_waits_between_recipients_but_not_after_last() {
    let stub = StubProvider::new("stub", Channel::Email, Behavior::AlwaysSucceed);
    let dispatcher = dispatcher_for(stub);

    let mut request = email_request(&["a@x.com", "b@x.com", "c@x.com"], "Hi {{name}}");
    request.options.personalize = true;
    request.options.delay_ms = 1000;
    request.options.per_recipient_variables =
        BTreeMap::from([("a@x.com".to_owned(), vars(&[("name", "Ann")]))]);

    let started = tokio::time::Instant::now();
    dispatcher.dispatch(request).await.expect("dispatch should run");
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(2000));
    assert!(elapsed < Duration::from_millis(2500));
}

#[tokio::test(start_paused = true)]
async fn retry_delay_separates_attempts() {
    let stub = StubProvider::new("stub", Channel::Email, Behavior::AlwaysReject);
    let dispatcher = dispatcher_for(stub);

    let mut request = email_request(&["a@x.com"], "Hi {{name}}");
    request.options.personalize = true;
    request.options.max_retries = 2;
    request.options.retry_delay_ms = 2000;
    request.options.per_recipient_variables =
        BTreeMap::from([("a@x.com".to_owned(), vars(&[("name", "Ann")]))]);

    let started = tokio::time::Instant::now();
    let report = dispatcher.dispatch(request).await.expect("dispatch should run");
    let elapsed = started.elapsed();
    assert_eq!(report.failed[0].retries, 3);
    assert!(elapsed >= Duration::from_millis(4000));
    assert!(elapsed < Duration::from_millis(4500));
}

#[tokio::test(start_paused = true)]
async fn batch_path_does_not_throttle() {
    let stub = StubProvider::new("stub", Channel::Email, Behavior::AlwaysSucceed);
    let dispatcher = dispatcher_for(stub);

    let mut request = email_request(&["a@x.com", "b@x.com", "c@x.com"], "Hello");
    request.options.delay_ms = 1000;

    let started = tokio::time::Instant::now();
    dispatcher.dispatch(request).await.expect("dispatch should run");
    assert!(started.elapsed() < Duration::from_millis(1000));
}

#[tokio::test(start_paused = true)]
async fn single_destination_provider_is_throttled_per_recipient() {
    let stub =
        StubProvider::new("stub", Channel::Sms, Behavior::AlwaysSucceed).single_destination();
    let calls = stub.calls();
    let sent = stub.sent();
    let dispatcher = dispatcher_for(stub);

    let mut request = DispatchRequest::new(
        addresses(&["+15551230001", "+15551230002", "+15551230003"]),
        MessageTemplate::new("Hi {{name}}"),
        Channel::Sms,
        "stub",
    )
    .with_options(quick_options());
    request.options.delay_ms = 1000;
    request.options.variables = vars(&[("name", "all")]);

    let started = tokio::time::Instant::now();
    let report = dispatcher.dispatch(request).await.expect("dispatch should run");
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(2000));
    assert!(elapsed < Duration::from_millis(2500));

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(report.successful.len(), 3);
    let sent = sent.lock().expect("sent log lock");
    assert!(sent.iter().all(|call| !call.batch && call.recipients.len() == 1));
    assert!(sent.iter().all(|call| call.message.body == "Hi all"));
}

#[tokio::test]
async fn single_destination_provider_reports_each_recipient() {
    let stub =
        StubProvider::new("stub", Channel::Sms, Behavior::RejectFirst(1)).single_destination();
    let dispatcher = dispatcher_for(stub);

    let mut request = DispatchRequest::new(
        addresses(&["+15551230001", "+15551230002"]),
        MessageTemplate::new("Reminder"),
        Channel::Sms,
        "stub",
    )
    .with_options(quick_options());
    request.options.max_retries = 0;

    let report = dispatcher.dispatch(request).await.expect("dispatch should run");
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].address, "+15551230001");
    assert_eq!(report.successful.len(), 1);
    assert_eq!(report.successful[0].address, "+15551230002");
    assert_eq!(report.successful[0].provider_message_id.as_deref(), Some("msg-1"));
}
