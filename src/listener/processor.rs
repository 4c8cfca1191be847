//! Local processing step of a service
//!
//! Each service registers one [`ActionProcessor`]. The listener calls it for
//! every action addressed to that service; what the processor does (fetch a
//! page, parse a document, write an index entry) is outside this crate.

use crate::services::{QueueName, Service};
use crate::thought::Action;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use strum_macros::{AsRefStr, Display};

/// Outcome of processing one action, ordered by severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, AsRefStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionResult {
    Success,
    /// Failed, but the same action may succeed later
    FailRetry,
    /// Failed for good; the action is dropped
    FailIrreversible,
}

impl ActionResult {
    pub fn worst(self, other: ActionResult) -> ActionResult {
        self.max(other)
    }
}

/// Which worker thread is processing
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkerId {
    pub service: Service,
    pub queue: QueueName,
    pub slot: usize,
}

impl WorkerId {
    /// Thread name, e.g. `webloader_00-2`
    pub fn thread_name(&self) -> String {
        format!("{}-{}", self.queue, self.slot)
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}-{}", self.service, self.queue, self.slot)
    }
}

/// The business step of one service
///
/// Implementations must be callable from several worker threads at once.
/// A panic is caught by the listener and counted as
/// [`ActionResult::FailIrreversible`].
pub trait ActionProcessor: Send + Sync {
    fn process(&self, action: &Action, data: &[Value], worker: &WorkerId) -> ActionResult;
}

impl<F> ActionProcessor for F
where
    F: Fn(&Action, &[Value], &WorkerId) -> ActionResult + Send + Sync,
{
    fn process(&self, action: &Action, data: &[Value], worker: &WorkerId) -> ActionResult {
        self(action, data, worker)
    }
}

/// Processors keyed by service
#[derive(Default, Clone)]
pub struct ProcessorRegistry {
    processors: HashMap<Service, Arc<dyn ActionProcessor>>,
}

impl fmt::Debug for ProcessorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessorRegistry")
            .field("services", &self.services())
            .finish()
    }
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `processor` for `service`, replacing any previous one
    pub fn register(&mut self, service: Service, processor: impl ActionProcessor + 'static) {
        if self.processors.insert(service, Arc::new(processor)).is_some() {
            log::debug!("Replaced processor for {}", service);
        }
    }

    pub fn get(&self, service: Service) -> Option<Arc<dyn ActionProcessor>> {
        self.processors.get(&service).cloned()
    }

    pub fn contains(&self, service: Service) -> bool {
        self.processors.contains_key(&service)
    }

    pub fn services(&self) -> Vec<Service> {
        let mut services: Vec<_> = self.processors.keys().copied().collect();
        services.sort();
        services
    }
}
