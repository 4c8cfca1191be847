//! Action pipeline tests

use super::fast_context;
use crate::core::config::BrokerSettings;
use crate::core::retry::RetryPolicy;
use crate::core::shutdown::ShutdownSignal;
use crate::listener::{ActionProcessor, ActionResult, Dispatcher, Disposition, WorkerId};
use crate::queue::tests::stub_relay::StubRelay;
use crate::queue::GridBroker;
use crate::services::{QueueName, Service};
use crate::thought::Action;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn q(name: &str) -> QueueName {
    QueueName::new(name).unwrap()
}

fn worker() -> WorkerId {
    WorkerId {
        service: Service::Loader,
        queue: q("webloader_00"),
        slot: 0,
    }
}

fn dispatcher(broker: &Arc<GridBroker>, processor: impl ActionProcessor + 'static) -> Dispatcher {
    Dispatcher::new(
        Service::Loader,
        broker.clone(),
        Arc::new(processor),
        RetryPolicy::with_delay(Duration::from_millis(10)),
        ShutdownSignal::new(),
    )
}

fn always(result: ActionResult) -> impl ActionProcessor {
    move |_: &Action, _: &[Value], _: &WorkerId| result
}

/// Drain a queue with auto-ack, returning the decoded payloads
fn drain(broker: &GridBroker, service: Service, queue: &str) -> Vec<Value> {
    let queue = q(queue);
    std::iter::from_fn(|| {
        broker
            .receive(service, &queue, Duration::from_millis(20), true)
            .unwrap()
    })
    .map(|m| serde_json::from_slice(m.payload()).unwrap())
    .collect()
}

#[test]
fn test_success_forwards_nested_action() {
    let dir = TempDir::new().unwrap();
    let context = fast_context(&dir, |_| {});
    let broker = context.broker();
    let dispatcher = dispatcher(broker, always(ActionResult::Success));

    let payload = json!({
        "data": [],
        "actions": [{
            "type": "loader",
            "queue": "webloader_00",
            "actions": [{"type": "parser", "queue": "yacyparser_00"}]
        }]
    });
    let outcome = dispatcher
        .handle_payload(payload.to_string().as_bytes(), &worker())
        .unwrap();

    assert_eq!(outcome.result, ActionResult::Success);
    assert!(!outcome.target_limited);
    assert_eq!(
        drain(broker, Service::Parser, "yacyparser_00"),
        vec![json!({"data": [], "actions": [{"type": "parser", "queue": "yacyparser_00"}]})]
    );
}

#[test]
fn test_processor_sees_action_and_shared_data() {
    let dir = TempDir::new().unwrap();
    let context = fast_context(&dir, |_| {});
    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let record = seen.clone();
    let dispatcher = dispatcher(
        context.broker(),
        move |action: &Action, data: &[Value], worker: &WorkerId| {
            record
                .lock()
                .unwrap()
                .push((action.attribute("id").cloned(), data.to_vec(), worker.slot));
            ActionResult::Success
        },
    );

    let payload = json!({
        "data": [{"url": "http://example.org/"}],
        "actions": [{"type": "loader", "queue": "webloader_00", "id": "doc-1"}]
    });
    dispatcher
        .handle_payload(payload.to_string().as_bytes(), &worker())
        .unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, Some(json!("doc-1")));
    assert_eq!(seen[0].1, vec![json!({"url": "http://example.org/"})]);
}

#[test]
fn test_misrouted_action_is_forwarded_unchanged() {
    let dir = TempDir::new().unwrap();
    let context = fast_context(&dir, |_| {});
    let broker = context.broker();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let dispatcher = dispatcher(broker, move |_: &Action, _: &[Value], _: &WorkerId| {
        counter.fetch_add(1, Ordering::SeqCst);
        ActionResult::Success
    });

    let misrouted = json!({
        "type": "indexer",
        "queue": "elasticsearch_00",
        "id": 7,
        "actions": [{"type": "crawler", "queue": "crawler_webcrawler_00"}]
    });
    let payload = json!({"data": [1, 2], "actions": [misrouted.clone()]});
    let outcome = dispatcher
        .handle_payload(payload.to_string().as_bytes(), &worker())
        .unwrap();

    assert_eq!(outcome.result, ActionResult::Success);
    assert_eq!(calls.load(Ordering::SeqCst), 0, "processor not called");
    assert_eq!(
        drain(broker, Service::Indexer, "elasticsearch_00"),
        vec![json!({"data": [1, 2], "actions": [misrouted]})]
    );
    assert!(drain(broker, Service::Crawler, "crawler_webcrawler_00").is_empty());
}

#[test]
fn test_failed_processing_does_not_forward() {
    let dir = TempDir::new().unwrap();
    let context = fast_context(&dir, |_| {});
    let broker = context.broker();
    let dispatcher = dispatcher(broker, always(ActionResult::FailRetry));

    let payload = json!({
        "data": [],
        "actions": [{
            "type": "loader",
            "queue": "webloader_00",
            "actions": [{"type": "parser", "queue": "yacyparser_00"}]
        }]
    });
    let outcome = dispatcher
        .handle_payload(payload.to_string().as_bytes(), &worker())
        .unwrap();

    assert_eq!(outcome.result, ActionResult::FailRetry);
    assert!(!outcome.target_limited);
    assert!(drain(broker, Service::Parser, "yacyparser_00").is_empty());
}

#[test]
fn test_worst_result_wins() {
    let dir = TempDir::new().unwrap();
    let context = fast_context(&dir, |_| {});
    let dispatcher = dispatcher(
        context.broker(),
        |action: &Action, _: &[Value], _: &WorkerId| match action.attribute("fail") {
            Some(Value::String(kind)) if kind == "hard" => ActionResult::FailIrreversible,
            Some(_) => ActionResult::FailRetry,
            None => ActionResult::Success,
        },
    );

    let payload = json!({
        "data": [],
        "actions": [
            {"type": "loader", "queue": "webloader_00", "fail": "soft"},
            {"type": "loader", "queue": "webloader_00", "fail": "hard"},
            {"type": "loader", "queue": "webloader_00"}
        ]
    });
    let outcome = dispatcher
        .handle_payload(payload.to_string().as_bytes(), &worker())
        .unwrap();
    assert_eq!(outcome.result, ActionResult::FailIrreversible);
}

#[test]
fn test_bad_actions_are_skipped() {
    let dir = TempDir::new().unwrap();
    let context = fast_context(&dir, |_| {});
    let broker = context.broker();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let dispatcher = dispatcher(broker, move |_: &Action, _: &[Value], _: &WorkerId| {
        counter.fetch_add(1, Ordering::SeqCst);
        ActionResult::Success
    });

    let payload = json!({
        "data": [],
        "actions": [
            {"queue": "webloader_00"},
            {"type": "", "queue": "webloader_00"},
            {"type": "nobody", "queue": "webloader_00"},
            {"type": "loader"},
            {
                "type": "loader",
                "queue": "webloader_00",
                "actions": [{"type": "parser"}, {"type": "parser", "queue": "yacyparser_00"}]
            }
        ]
    });
    let outcome = dispatcher
        .handle_payload(payload.to_string().as_bytes(), &worker())
        .unwrap();

    assert_eq!(outcome.result, ActionResult::Success);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(drain(broker, Service::Parser, "yacyparser_00").len(), 1);
}

#[test]
fn test_full_target_aborts_message() {
    let dir = TempDir::new().unwrap();
    let context = fast_context(&dir, |s| s.queue_limit = 1);
    let broker = context.broker();
    broker
        .send(Service::Parser, &q("yacyparser_00"), b"{}")
        .unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let dispatcher = dispatcher(broker, move |_: &Action, _: &[Value], _: &WorkerId| {
        counter.fetch_add(1, Ordering::SeqCst);
        ActionResult::Success
    });

    let payload = json!({
        "data": [],
        "actions": [
            {
                "type": "loader",
                "queue": "webloader_00",
                "actions": [{"type": "parser", "queue": "yacyparser_00"}]
            },
            {"type": "loader", "queue": "webloader_00"}
        ]
    });
    let outcome = dispatcher
        .handle_payload(payload.to_string().as_bytes(), &worker())
        .unwrap();

    assert_eq!(outcome.result, ActionResult::FailRetry);
    assert!(outcome.target_limited);
    assert_eq!(calls.load(Ordering::SeqCst), 1, "later actions are not run");
    assert_eq!(broker.available(Service::Parser, &q("yacyparser_00")).unwrap(), 1);
}

#[test]
fn test_failed_follow_up_is_retried_once_then_dropped() {
    let relay = StubRelay::start(|path| {
        if path.contains("/send.json") {
            r#"{"success":false,"comment":"queue unavailable"}"#.to_string()
        } else {
            r#"{"success":true,"available":0}"#.to_string()
        }
    });
    let broker = Arc::new(
        GridBroker::new(&BrokerSettings {
            mcp_addresses: vec![relay.base_url.clone()],
            lazy: true,
            ..BrokerSettings::default()
        })
        .unwrap(),
    );
    let dispatcher = dispatcher(&broker, always(ActionResult::Success));

    let payload = json!({
        "data": [],
        "actions": [{
            "type": "loader",
            "queue": "webloader_00",
            "actions": [{"type": "parser", "queue": "yacyparser_00"}]
        }]
    });
    let outcome = dispatcher
        .handle_payload(payload.to_string().as_bytes(), &worker())
        .unwrap();

    let sends = relay
        .requests()
        .iter()
        .filter(|r| r.starts_with("/yacy/grid/mcp/messages/send.json"))
        .count();
    assert_eq!(sends, 2, "one attempt plus one retry");
    assert_eq!(outcome.result, ActionResult::Success);
    assert!(!outcome.target_limited);
    assert!(matches!(
        Disposition::for_outcome(&outcome, true),
        Disposition::Acknowledge
    ));
}

#[test]
fn test_full_target_for_misrouted_action_aborts() {
    let dir = TempDir::new().unwrap();
    let context = fast_context(&dir, |s| s.queue_limit = 1);
    let broker = context.broker();
    broker
        .send(Service::Indexer, &q("elasticsearch_00"), b"{}")
        .unwrap();
    let dispatcher = dispatcher(broker, always(ActionResult::Success));

    let payload = json!({
        "data": [],
        "actions": [{"type": "indexer", "queue": "elasticsearch_00"}]
    });
    let outcome = dispatcher
        .handle_payload(payload.to_string().as_bytes(), &worker())
        .unwrap();
    assert!(outcome.target_limited);
}

#[test]
fn test_panicking_processor_is_irreversible() {
    let dir = TempDir::new().unwrap();
    let context = fast_context(&dir, |_| {});
    let dispatcher = dispatcher(
        context.broker(),
        |_: &Action, _: &[Value], _: &WorkerId| -> ActionResult { panic!("processor bug") },
    );

    let payload = json!({
        "data": [],
        "actions": [{"type": "loader", "queue": "webloader_00"}]
    });
    let outcome = dispatcher
        .handle_payload(payload.to_string().as_bytes(), &worker())
        .unwrap();
    assert_eq!(outcome.result, ActionResult::FailIrreversible);
}

#[test]
fn test_undecodable_payload_is_error() {
    let dir = TempDir::new().unwrap();
    let context = fast_context(&dir, |_| {});
    let dispatcher = dispatcher(context.broker(), always(ActionResult::Success));
    assert!(dispatcher.handle_payload(b"{\"data\":", &worker()).is_err());
}
