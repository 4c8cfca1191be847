//! Periodic downstream fill and throughput report

use crate::core::shutdown::ShutdownSignal;
use crate::queue::GridBroker;
use crate::services::Service;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub struct Caretaker {
    service: Service,
    broker: Arc<GridBroker>,
    target_fill: Arc<AtomicU64>,
    throughput: Vec<Arc<AtomicUsize>>,
    interval: Duration,
    shutdown: ShutdownSignal,
}

impl Caretaker {
    pub fn new(
        service: Service,
        broker: Arc<GridBroker>,
        target_fill: Arc<AtomicU64>,
        throughput: Vec<Arc<AtomicUsize>>,
        interval: Duration,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            service,
            broker,
            target_fill,
            throughput,
            interval,
            shutdown,
        }
    }

    pub fn run(self) {
        loop {
            self.tick();
            if !self.shutdown.sleep(self.interval) {
                break;
            }
        }
        log::debug!("Caretaker for {} terminated", self.service);
    }

    /// Publish the downstream fill and log throughput
    pub fn tick(&self) -> u64 {
        let fill = downstream_fill(&self.broker, self.service);
        self.target_fill.store(fill, Ordering::Release);
        log::info!(
            "Listener {} operates with {} messages per minute; target queues size: {}",
            self.service,
            messages_per_minute(&self.throughput),
            fill
        );
        fill
    }
}

/// Waiting messages across the source queues of every downstream service
///
/// Queues that cannot be read count as empty.
pub fn downstream_fill(broker: &GridBroker, service: Service) -> u64 {
    let mut fill = 0u64;
    for target in service.target_services() {
        for queue in target.source_queues() {
            match broker.available(*target, &queue) {
                Ok(available) => fill += available as u64,
                Err(e) => log::debug!("Cannot read size of {}/{}: {}", target, queue, e),
            }
        }
    }
    fill
}

pub fn messages_per_minute(counters: &[Arc<AtomicUsize>]) -> usize {
    counters.iter().map(|c| c.load(Ordering::Relaxed)).sum()
}
