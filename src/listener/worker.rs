//! Queue worker thread
//!
//! One worker serves one (queue, slot). Each turn of the loop:
//!
//! 1. wait while the broker has no backend
//! 2. clear caches if memory is short
//! 3. sleep off downstream backpressure
//! 4. receive, dispatch, then acknowledge or reject

use crate::core::context::GridContext;
use crate::core::shutdown::ShutdownSignal;
use crate::listener::dispatch::{Dispatcher, Disposition};
use crate::listener::processor::{ActionResult, WorkerId};
use crate::listener::throttle::throttle_delay;
use crate::listener::throughput::ThroughputWindow;
use crate::queue::{BrokerError, MessageContainer};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const NOT_READY_PAUSE: Duration = Duration::from_secs(1);
/// Longest single receive, bounding how long shutdown waits on a worker
pub const RECEIVE_SLICE: Duration = Duration::from_millis(500);

pub struct Worker {
    id: WorkerId,
    context: Arc<GridContext>,
    dispatcher: Arc<Dispatcher>,
    target_fill: Arc<AtomicU64>,
    window: ThroughputWindow,
    shutdown: ShutdownSignal,
}

impl Worker {
    pub fn new(
        id: WorkerId,
        context: Arc<GridContext>,
        dispatcher: Arc<Dispatcher>,
        target_fill: Arc<AtomicU64>,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            id,
            context,
            dispatcher,
            target_fill,
            window: ThroughputWindow::new(),
            shutdown,
        }
    }

    /// Shared counter of completions in the last minute
    pub fn throughput_counter(&self) -> Arc<AtomicUsize> {
        self.window.counter()
    }

    pub fn run(mut self) {
        let broker = self.context.broker().clone();
        match broker.available(self.id.service, &self.id.queue) {
            Ok(available) => log::info!("Started worker {}: {} entries", self.id, available),
            Err(e) => log::warn!("Started worker {}; queue size unknown: {}", self.id, e),
        }

        while !self.shutdown.is_triggered() {
            if !broker.is_ready() {
                self.shutdown.sleep(NOT_READY_PAUSE);
                continue;
            }

            self.context.check_memory();

            let threshold = self.context.settings().queue_throttling;
            let delay = throttle_delay(self.target_fill.load(Ordering::Acquire), threshold);
            if !delay.is_zero() {
                log::info!(
                    "{}: downstream fill {} near threshold {}, sleeping {:?}",
                    self.id,
                    self.target_fill.load(Ordering::Relaxed),
                    threshold,
                    delay
                );
                if !self.shutdown.sleep(delay) {
                    break;
                }
            }

            match self.poll() {
                Ok(Some(message)) => self.handle(message),
                Ok(None) => self.window.expire(Instant::now()),
                Err(BrokerError::Closed) => break,
                Err(e) => {
                    log::warn!("{}: receive failed: {}", self.id, e);
                    self.backoff();
                }
            }
        }
        log::info!("Worker {} terminated", self.id);
    }

    /// Receive in short slices until a message arrives, the poll interval
    /// ends or shutdown is requested
    fn poll(&self) -> Result<Option<MessageContainer>, BrokerError> {
        let settings = self.context.settings();
        let deadline = Instant::now() + settings.poll_interval;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let slice = remaining.min(RECEIVE_SLICE);
            let received = self.context.broker().receive(
                self.id.service,
                &self.id.queue,
                slice,
                settings.auto_ack,
            )?;
            if received.is_some() || self.shutdown.is_triggered() || remaining <= RECEIVE_SLICE {
                return Ok(received);
            }
        }
    }

    fn handle(&mut self, message: MessageContainer) {
        if message.is_empty() {
            self.settle(&message, Disposition::Acknowledge);
            return;
        }

        let outcome = match self.dispatcher.handle_payload(message.payload(), &self.id) {
            Ok(outcome) => outcome,
            Err(e) => {
                log::warn!(
                    "{}: message syntax error, dropping '{}': {}",
                    self.id,
                    String::from_utf8_lossy(message.payload()),
                    e
                );
                self.backoff();
                self.settle(&message, Disposition::Acknowledge);
                return;
            }
        };
        self.window.record(Instant::now());

        if outcome.result == ActionResult::FailIrreversible {
            log::warn!("{}: message failed irreversibly and is dropped", self.id);
        }

        let disposition = Disposition::for_outcome(&outcome, self.context.settings().requeue_on_retry);
        self.settle(&message, disposition);
        if disposition == Disposition::Reject {
            if outcome.target_limited {
                log::info!("{}: downstream queue full, message requeued", self.id);
            }
            self.backoff();
        }
    }

    fn settle(&self, message: &MessageContainer, disposition: Disposition) {
        if !message.requires_ack() {
            return;
        }
        let broker = self.context.broker();
        let result = match disposition {
            Disposition::Acknowledge => broker.acknowledge(self.id.service, &self.id.queue, message),
            Disposition::Reject => broker.reject(self.id.service, &self.id.queue, message),
        };
        if let Err(e) = result {
            log::warn!("{}: cannot {:?} delivery {}: {}", self.id, disposition, message.delivery_tag(), e);
        }
    }

    fn backoff(&self) {
        self.shutdown.sleep(self.context.settings().backoff);
    }
}
