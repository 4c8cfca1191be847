//! Depth limit and throttling tests

use crate::common::{context_with, fast_settings, q, recording_registry, wait_until};
use crawlgrid::listener::{downstream_fill, BrokerListener};
use crawlgrid::services::Service;
use serde_json::json;
use std::time::Duration;
use tempfile::TempDir;

fn loader_message(id: usize) -> Vec<u8> {
    json!({
        "data": [],
        "actions": [{
            "type": "loader",
            "queue": "webloader_00",
            "id": id,
            "actions": [{"type": "parser", "queue": "yacyparser_00"}]
        }]
    })
    .to_string()
    .into_bytes()
}

#[test]
fn test_full_target_holds_work_until_drained() {
    let dir = TempDir::new().unwrap();
    let mut settings = fast_settings(&dir);
    settings.queue_limit = 2;
    let context = context_with(settings);
    let broker = context.broker().clone();
    let (registry, visits) = recording_registry(&[Service::Loader]);
    let parser_queue = q("yacyparser_00");

    broker.send(Service::Parser, &parser_queue, b"{}").unwrap();
    broker.send(Service::Parser, &parser_queue, b"{}").unwrap();
    for id in 0..2 {
        broker.send(Service::Loader, &q("webloader_00"), &loader_message(id)).unwrap();
    }
    let handle = BrokerListener::new(context, Service::Loader, &registry)
        .unwrap()
        .start()
        .unwrap();

    assert!(wait_until(|| visits.lock().unwrap().len() >= 2));
    std::thread::sleep(Duration::from_millis(300));
    assert_eq!(broker.available(Service::Parser, &parser_queue).unwrap(), 2, "limit holds");

    broker.clear(Service::Parser, &parser_queue).unwrap();
    assert!(wait_until(|| broker.available(Service::Parser, &parser_queue).unwrap() == 2));
    handle.stop();

    assert_eq!(broker.recover(Service::Loader, &q("webloader_00")).unwrap(), 0);
    assert_eq!(broker.available(Service::Loader, &q("webloader_00")).unwrap(), 0);
}

#[test]
fn test_downstream_fill_sums_target_queues() {
    let dir = TempDir::new().unwrap();
    let context = context_with(fast_settings(&dir));
    let broker = context.broker();

    broker.send(Service::Indexer, &q("elasticsearch_00"), b"{}").unwrap();
    broker.send(Service::Crawler, &q("crawler_webcrawler_00"), b"{}").unwrap();
    broker.send(Service::Crawler, &q("crawler_webcrawler_01"), b"{}").unwrap();
    broker.send(Service::Loader, &q("webloader_00"), b"{}").unwrap();

    assert_eq!(downstream_fill(broker, Service::Parser), 3);
    assert_eq!(downstream_fill(broker, Service::Crawler), 1);
    assert_eq!(downstream_fill(broker, Service::Indexer), 0);
}

#[test]
fn test_throttled_worker_stops_promptly() {
    let dir = TempDir::new().unwrap();
    let mut settings = fast_settings(&dir);
    settings.queue_throttling = 1;
    let context = context_with(settings);
    let broker = context.broker().clone();
    let (registry, visits) = recording_registry(&[Service::Loader]);

    // fill 5 against threshold 1 gives the longest throttle delay
    for _ in 0..5 {
        broker.send(Service::Parser, &q("yacyparser_00"), b"{}").unwrap();
    }
    broker.send(Service::Loader, &q("webloader_00"), &loader_message(0)).unwrap();
    let handle = BrokerListener::new(context, Service::Loader, &registry)
        .unwrap()
        .start()
        .unwrap();
    assert!(wait_until(|| handle.target_fill() == 5));
    std::thread::sleep(Duration::from_millis(300));

    let start = std::time::Instant::now();
    handle.stop();
    assert!(start.elapsed() < Duration::from_secs(3));
    assert!(visits.lock().unwrap().len() <= 1);
}
