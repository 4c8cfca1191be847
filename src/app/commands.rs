//! Subcommand implementations
//!
//! Each command works on an initialized [`GridContext`]; printing and exit
//! codes are left to the startup code.

use crate::app::error::{AppError, AppResult};
use crate::core::context::GridContext;
use crate::listener::{ActionResult, BrokerListener, ProcessorRegistry, WorkerId};
use crate::queue::GridBroker;
use crate::services::{QueueName, Service};
use crate::thought::{Action, Thought};
use serde_json::Value;

/// Waiting messages on one source queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueStatus {
    pub service: Service,
    pub queue: QueueName,
    pub available: usize,
}

impl std::fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:<12} {:<24} {:>8}", self.service, self.queue, self.available)
    }
}

/// Processors used by the binary: log each action and report success
///
/// The business step of a service is supplied by embedding applications
/// through their own [`ProcessorRegistry`].
pub fn default_registry() -> ProcessorRegistry {
    let mut registry = ProcessorRegistry::new();
    for service in Service::all().filter(|s| !s.source_queues().is_empty()) {
        registry.register(service, log_action);
    }
    registry
}

fn log_action(action: &Action, data: &[Value], worker: &WorkerId) -> ActionResult {
    log::info!(
        "{}: processed {} action with {} attributes on {} data items",
        worker,
        action.service(),
        action.attributes().len(),
        data.len()
    );
    ActionResult::Success
}

/// Run `listener` until shutdown, then close the broker
pub fn run(context: &GridContext, listener: BrokerListener) -> AppResult<()> {
    log::info!("Listener for {} running; stop with SIGINT or SIGTERM", listener.service());
    let result = listener.run();
    context.shutdown();
    Ok(result?)
}

/// Message bytes for `send`: the given Thought, or one bare action for the
/// target queue
pub fn message_for(service: Service, queue: &QueueName, payload: Option<&str>) -> AppResult<Vec<u8>> {
    let thought = match payload {
        Some(json) => Thought::decode(json.as_bytes()).map_err(AppError::Payload)?,
        None => Thought::new(Vec::new(), &[Action::new(service, queue.clone())])
            .map_err(AppError::Payload)?,
    };
    thought.encode().map_err(AppError::Payload)
}

pub fn send(broker: &GridBroker, service: Service, queue: &QueueName, payload: Option<&str>) -> AppResult<()> {
    let message = message_for(service, queue, payload)?;
    broker.send(service, queue, &message)?;
    log::info!("Sent {} bytes to {}/{}", message.len(), service, queue);
    Ok(())
}

/// Sizes of every source queue of `services`
pub fn status(broker: &GridBroker, services: &[Service]) -> AppResult<Vec<QueueStatus>> {
    let mut report = Vec::new();
    for &service in services {
        let queues = service.source_queues();
        let sizes = broker.available_many(service, &queues)?;
        report.extend(queues.into_iter().zip(sizes).map(|(queue, available)| QueueStatus {
            service,
            queue,
            available,
        }));
    }
    Ok(report)
}

pub fn clear(broker: &GridBroker, service: Service, queue: &QueueName) -> AppResult<()> {
    broker.clear(service, queue)?;
    log::info!("Cleared {}/{}", service, queue);
    Ok(())
}
