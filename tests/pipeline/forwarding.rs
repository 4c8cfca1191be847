//! Multi-hop forwarding tests

use crate::common::{context_with, fast_settings, q, recording_registry, wait_until};
use crawlgrid::listener::BrokerListener;
use crawlgrid::services::Service;
use crawlgrid::thought::{Action, Thought};
use serde_json::json;
use tempfile::TempDir;

#[test]
fn test_actions_travel_through_every_stage() {
    let dir = TempDir::new().unwrap();
    let context = context_with(fast_settings(&dir));
    let stages = [Service::Crawler, Service::Loader, Service::Parser, Service::Indexer];
    let (registry, visits) = recording_registry(&stages);

    let index = Action::new(Service::Indexer, q("elasticsearch_00")).with_attribute("id", "index");
    let parse = Action::new(Service::Parser, q("yacyparser_00"))
        .with_attribute("id", "parse")
        .with_action(&index);
    let load = Action::new(Service::Loader, q("webloader_00"))
        .with_attribute("id", "load")
        .with_action(&parse);
    let crawl = Action::new(Service::Crawler, q("crawler_webcrawler_01"))
        .with_attribute("id", "crawl")
        .with_action(&load);
    let data = vec![json!({"url": "http://example.org/"})];
    let thought = Thought::new(data.clone(), &[crawl]).unwrap();
    context
        .broker()
        .send(Service::Crawler, &q("crawler_webcrawler_01"), &thought.encode().unwrap())
        .unwrap();

    let handles: Vec<_> = stages
        .iter()
        .map(|&s| BrokerListener::new(context.clone(), s, &registry).unwrap().start().unwrap())
        .collect();
    assert!(wait_until(|| visits.lock().unwrap().len() == 4));
    for handle in handles {
        handle.stop();
    }

    let visits = visits.lock().unwrap();
    let order: Vec<_> = visits.iter().map(|v| v.service).collect();
    assert_eq!(order, stages.to_vec());
    assert_eq!(visits[3].id, Some(json!("index")));
    assert!(visits.iter().all(|v| v.data == data), "data travels unchanged");
}

#[test]
fn test_fan_out_to_two_targets() {
    let dir = TempDir::new().unwrap();
    let context = context_with(fast_settings(&dir));
    let (registry, visits) = recording_registry(&[Service::Loader]);
    let broker = context.broker().clone();

    let payload = json!({
        "data": [],
        "actions": [{
            "type": "loader",
            "queue": "webloader_00",
            "actions": [
                {"type": "parser", "queue": "yacyparser_00"},
                {"type": "warcmanager", "queue": "warcmanager_00"}
            ]
        }]
    });
    broker
        .send(Service::Loader, &q("webloader_00"), payload.to_string().as_bytes())
        .unwrap();
    let handle = BrokerListener::new(context, Service::Loader, &registry)
        .unwrap()
        .start()
        .unwrap();

    assert!(wait_until(|| {
        broker.available(Service::Parser, &q("yacyparser_00")).unwrap() == 1
            && broker.available(Service::Warcmanager, &q("warcmanager_00")).unwrap() == 1
    }));
    handle.stop();
    assert_eq!(visits.lock().unwrap().len(), 1);
}

#[test]
fn test_misrouted_action_reaches_its_service() {
    let dir = TempDir::new().unwrap();
    let context = context_with(fast_settings(&dir));
    let (registry, visits) = recording_registry(&[Service::Parser, Service::Indexer]);

    // an indexer action dropped on the parser queue
    let payload = json!({
        "data": [7],
        "actions": [{"type": "indexer", "queue": "elasticsearch_00", "id": "stray"}]
    });
    context
        .broker()
        .send(Service::Parser, &q("yacyparser_00"), payload.to_string().as_bytes())
        .unwrap();

    let parser = BrokerListener::new(context.clone(), Service::Parser, &registry)
        .unwrap()
        .start()
        .unwrap();
    let indexer = BrokerListener::new(context.clone(), Service::Indexer, &registry)
        .unwrap()
        .start()
        .unwrap();
    assert!(wait_until(|| visits.lock().unwrap().len() == 1));
    parser.stop();
    indexer.stop();

    let visits = visits.lock().unwrap();
    assert_eq!(visits[0].service, Service::Indexer);
    assert_eq!(visits[0].id, Some(json!("stray")));
    assert_eq!(visits[0].data, vec![json!(7)]);
}
