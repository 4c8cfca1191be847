//! Action pipeline for one message
//!
//! Actions run in order. An action for another service is forwarded as-is;
//! an action for this service is processed and, on success, its nested
//! follow-ups are forwarded. A full downstream queue aborts the message so
//! it can be requeued and tried again later.

use crate::core::retry::{retry_blocking, RetryPolicy};
use crate::core::shutdown::ShutdownSignal;
use crate::listener::processor::{ActionProcessor, ActionResult, WorkerId};
use crate::queue::{BrokerError, BrokerResult, GridBroker};
use crate::services::Service;
use crate::thought::{Action, Thought, ThoughtError};
use serde_json::Value;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Result of one message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    pub result: ActionResult,
    /// A forward hit a downstream depth limit; the message must be requeued
    pub target_limited: bool,
}

impl Outcome {
    fn completed(result: ActionResult) -> Self {
        Self {
            result,
            target_limited: false,
        }
    }

    fn target_limited() -> Self {
        Self {
            result: ActionResult::FailRetry,
            target_limited: true,
        }
    }
}

/// What to do with a delivery once it has been handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Acknowledge,
    Reject,
}

impl Disposition {
    pub fn for_outcome(outcome: &Outcome, requeue_on_retry: bool) -> Self {
        if outcome.target_limited
            || (requeue_on_retry && outcome.result == ActionResult::FailRetry)
        {
            Disposition::Reject
        } else {
            Disposition::Acknowledge
        }
    }
}

pub struct Dispatcher {
    service: Service,
    broker: Arc<GridBroker>,
    processor: Arc<dyn ActionProcessor>,
    retry: RetryPolicy,
    shutdown: ShutdownSignal,
}

impl Dispatcher {
    pub fn new(
        service: Service,
        broker: Arc<GridBroker>,
        processor: Arc<dyn ActionProcessor>,
        retry: RetryPolicy,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            service,
            broker,
            processor,
            retry,
            shutdown,
        }
    }

    /// Decode `payload` and run its actions
    ///
    /// Only an undecodable payload is an error; everything else is folded
    /// into the [`Outcome`].
    pub fn handle_payload(&self, payload: &[u8], worker: &WorkerId) -> Result<Outcome, ThoughtError> {
        let thought = Thought::decode(payload)?;
        Ok(self.handle_thought(&thought, worker))
    }

    pub fn handle_thought(&self, thought: &Thought, worker: &WorkerId) -> Outcome {
        let data = thought.data();
        let mut worst = ActionResult::Success;

        for (raw, parsed) in thought.actions() {
            let action = match parsed {
                Ok(action) => action,
                Err(e) => {
                    log::info!("{}: skipping bad action: {}", worker, e);
                    continue;
                }
            };

            if action.service() != self.service {
                log::info!(
                    "{}: action for {} in wrong queue, forwarding to {}",
                    worker,
                    action.service(),
                    action.queue()
                );
                match self.forward(data, raw, &action) {
                    Ok(()) => {}
                    Err(e) if e.is_target_limit() => return Outcome::target_limited(),
                    Err(e) => log::warn!("{}: cannot forward misrouted action: {}", worker, e),
                }
                continue;
            }

            let result = self.process(&action, data, worker);
            if result == ActionResult::Success && self.forward_follow_ups(data, &action, worker) {
                return Outcome::target_limited();
            }
            worst = worst.worst(result);
        }

        Outcome::completed(worst)
    }

    fn process(&self, action: &Action, data: &[Value], worker: &WorkerId) -> ActionResult {
        match catch_unwind(AssertUnwindSafe(|| self.processor.process(action, data, worker))) {
            Ok(result) => result,
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                log::error!("{}: processor panicked: {}", worker, reason);
                ActionResult::FailIrreversible
            }
        }
    }

    /// Forward the nested actions of a completed action; true if a
    /// downstream queue is full
    fn forward_follow_ups(&self, data: &[Value], action: &Action, worker: &WorkerId) -> bool {
        for raw in action.actions() {
            let next = match Action::from_value(raw) {
                Ok(next) => next,
                Err(e) => {
                    log::warn!("{}: dropping bad follow-up action: {}", worker, e);
                    continue;
                }
            };
            let operation = format!("forward to {}/{}", next.service(), next.queue());
            match retry_blocking(&operation, &self.retry, &self.shutdown, || {
                self.forward(data, raw, &next)
            }) {
                Ok(()) => {}
                Err(e) if e.is_target_limit() => return true,
                Err(e) => log::warn!("{}: follow-up to {} lost: {}", worker, next.service(), e),
            }
        }
        false
    }

    fn forward(&self, data: &[Value], raw: &Value, target: &Action) -> BrokerResult<()> {
        let payload = Thought::for_forward(data, raw.clone())
            .encode()
            .map_err(|e| BrokerError::Codec {
                message: e.to_string(),
            })?;
        self.broker.send(target.service(), target.queue(), &payload)
    }
}
