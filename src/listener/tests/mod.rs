//! Test modules for the listener engine

mod dispatch;

use crate::core::config::{BrokerSettings, GridConfig};
use crate::core::context::GridContext;
use crate::queue::GridBroker;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Context on an embedded store with intervals short enough for tests
pub(super) fn fast_context(dir: &TempDir, tweak: impl FnOnce(&mut BrokerSettings)) -> Arc<GridContext> {
    let mut settings = BrokerSettings {
        storage_path: Some(dir.path().to_path_buf()),
        poll_interval: Duration::from_millis(200),
        backoff: Duration::from_millis(50),
        caretaker_interval: Duration::from_millis(50),
        ..BrokerSettings::default()
    };
    tweak(&mut settings);
    let broker = Arc::new(GridBroker::new(&settings).unwrap());
    Arc::new(GridContext::from_parts(GridConfig::new(), settings, broker))
}

pub(super) fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    false
}
