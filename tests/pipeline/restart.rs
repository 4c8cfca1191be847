//! Durability across broker restarts

use crate::common::{context_with, fast_settings, q, recording_registry, wait_until};
use crawlgrid::listener::BrokerListener;
use crawlgrid::queue::GridBroker;
use crawlgrid::services::Service;
use serde_json::json;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_unacknowledged_delivery_is_processed_after_restart() {
    let dir = TempDir::new().unwrap();
    let queue = q("elasticsearch_00");
    let payload = json!({
        "data": [],
        "actions": [{"type": "indexer", "queue": "elasticsearch_00", "id": "survivor"}]
    });

    {
        let broker = GridBroker::new(&fast_settings(&dir)).unwrap();
        broker
            .send(Service::Indexer, &queue, payload.to_string().as_bytes())
            .unwrap();
        let taken = broker
            .receive(Service::Indexer, &queue, Duration::from_millis(50), false)
            .unwrap();
        assert!(taken.is_some());
        assert_eq!(broker.available(Service::Indexer, &queue).unwrap(), 0);
        // dropped without acknowledging, as if the process had died
    }

    let context = context_with(fast_settings(&dir));
    let (registry, visits) = recording_registry(&[Service::Indexer]);
    let handle = BrokerListener::new(context.clone(), Service::Indexer, &registry)
        .unwrap()
        .start()
        .unwrap();
    assert!(wait_until(|| visits.lock().unwrap().len() == 1));
    handle.stop();

    assert_eq!(visits.lock().unwrap()[0].id, Some(json!("survivor")));
    assert_eq!(context.broker().recover(Service::Indexer, &queue).unwrap(), 0);
}

#[test]
fn test_waiting_messages_survive_restart() {
    let dir = TempDir::new().unwrap();
    let queue = q("warcmanager_00");
    {
        let broker = GridBroker::new(&fast_settings(&dir)).unwrap();
        for i in 0..3 {
            broker
                .send(Service::Warcmanager, &queue, format!("{{\"n\":{}}}", i).as_bytes())
                .unwrap();
        }
    }

    let broker = GridBroker::new(&fast_settings(&dir)).unwrap();
    assert_eq!(broker.available(Service::Warcmanager, &queue).unwrap(), 3);
    let first = broker
        .receive(Service::Warcmanager, &queue, Duration::from_millis(50), true)
        .unwrap()
        .unwrap();
    assert_eq!(first.payload(), b"{\"n\":0}");
}
