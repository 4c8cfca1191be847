//! Broker listener: the per-service dispatch engine
//!
//! A [`BrokerListener`] consumes every source queue of its service with a
//! fixed set of OS threads and one caretaker:
//!
//! ```text
//!              ┌───────────── BrokerListener(parser) ─────────────┐
//!  yacyparser_00 ──▶ worker-0 ─┐                                   │
//!  yacyparser_00 ──▶ worker-1 ─┼─▶ Dispatcher ─▶ ActionProcessor   │
//!                              │       │                           │
//!                              │       └─▶ forward ─▶ indexer/...  │
//!                 caretaker ── targetFill ◀── downstream sizes     │
//!              └───────────────────────────────────────────────────┘
//! ```
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use crawlgrid::core::config::GridConfig;
//! use crawlgrid::core::context::GridContext;
//! use crawlgrid::listener::{ActionResult, BrokerListener, ProcessorRegistry, WorkerId};
//! use crawlgrid::services::Service;
//! use crawlgrid::thought::Action;
//! use serde_json::Value;
//! use std::sync::Arc;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let context = Arc::new(GridContext::init(GridConfig::new())?);
//! let mut registry = ProcessorRegistry::new();
//! registry.register(Service::Indexer, |action: &Action, _data: &[Value], _worker: &WorkerId| {
//!     log::info!("indexing {:?}", action.attribute("id"));
//!     ActionResult::Success
//! });
//!
//! let handle = BrokerListener::new(context, Service::Indexer, &registry)?.start()?;
//! // ...
//! handle.stop();
//! # Ok(())
//! # }
//! ```

mod broker_listener;
mod caretaker;
mod dispatch;
mod error;
mod processor;
mod throttle;
mod throughput;
mod worker;

pub use broker_listener::{threads_per_queue, BrokerListener, ListenerHandle};
pub use caretaker::downstream_fill;
pub use dispatch::{Dispatcher, Disposition, Outcome};
pub use error::{ListenerError, ListenerResult};
pub use processor::{ActionProcessor, ActionResult, ProcessorRegistry, WorkerId};
pub use throttle::throttle_delay;
pub use worker::RECEIVE_SLICE;

#[cfg(test)]
mod tests;
