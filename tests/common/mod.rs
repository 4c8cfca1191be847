//! Common test utilities and helpers
//!
//! Builds grid contexts on temporary embedded storage and records what the
//! processors of each stage saw.

#![allow(dead_code)]

use crawlgrid::core::config::{BrokerSettings, GridConfig};
use crawlgrid::core::context::GridContext;
use crawlgrid::listener::{ActionResult, ProcessorRegistry, WorkerId};
use crawlgrid::queue::GridBroker;
use crawlgrid::services::{QueueName, Service};
use crawlgrid::thought::Action;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::TempDir;

pub fn q(name: &str) -> QueueName {
    QueueName::new(name).unwrap()
}

pub fn fast_settings(dir: &TempDir) -> BrokerSettings {
    BrokerSettings {
        storage_path: Some(dir.path().to_path_buf()),
        poll_interval: Duration::from_millis(200),
        backoff: Duration::from_millis(50),
        caretaker_interval: Duration::from_millis(50),
        ..BrokerSettings::default()
    }
}

pub fn context_with(settings: BrokerSettings) -> Arc<GridContext> {
    let broker = Arc::new(GridBroker::new(&settings).unwrap());
    Arc::new(GridContext::from_parts(GridConfig::new(), settings, broker))
}

pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    false
}

/// One processed action as seen by a stage
#[derive(Debug, Clone, PartialEq)]
pub struct Visit {
    pub service: Service,
    pub id: Option<Value>,
    pub data: Vec<Value>,
}

/// Registry whose processors record every visit and succeed
pub fn recording_registry(services: &[Service]) -> (ProcessorRegistry, Arc<Mutex<Vec<Visit>>>) {
    let visits = Arc::new(Mutex::new(Vec::new()));
    let mut registry = ProcessorRegistry::new();
    for &service in services {
        let log = visits.clone();
        registry.register(service, move |action: &Action, data: &[Value], _: &WorkerId| {
            log.lock().unwrap().push(Visit {
                service: action.service(),
                id: action.attribute("id").cloned(),
                data: data.to_vec(),
            });
            ActionResult::Success
        });
    }
    (registry, visits)
}
