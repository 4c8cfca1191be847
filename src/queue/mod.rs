//! Durable work queues
//!
//! Services exchange work over named queues scoped to a service. Two
//! backends implement the same [`Queue`]/[`QueueFactory`] traits:
//!
//! - **embedded**: SQLite databases under a local storage root
//! - **relay**: the coordinator's HTTP messages API
//!
//! ```text
//!                 ┌──────────────────────────────┐
//!  send/receive ─▶│          GridBroker          │
//!                 │  depth limit · fallback      │
//!                 └──────┬───────────────┬───────┘
//!                  first │               │ when no relay answers
//!                        ▼               ▼
//!              ┌──────────────┐   ┌───────────────┐
//!              │ RelayQueue   │   │ EmbeddedQueue │
//!              │ (HTTP GET)   │   │ (SQLite)      │
//!              └──────────────┘   └───────────────┘
//! ```
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use crawlgrid::core::config::BrokerSettings;
//! use crawlgrid::queue::GridBroker;
//! use crawlgrid::services::{QueueName, Service};
//! use std::time::Duration;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = BrokerSettings {
//!     storage_path: Some("/var/lib/crawlgrid".into()),
//!     ..BrokerSettings::default()
//! };
//! let broker = GridBroker::new(&settings)?;
//! let queue = QueueName::new("webloader_00")?;
//!
//! broker.send(Service::Loader, &queue, br#"{"data":[],"actions":[]}"#)?;
//! if let Some(message) = broker.receive(Service::Loader, &queue, Duration::from_secs(1), false)? {
//!     broker.acknowledge(Service::Loader, &queue, &message)?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod broker;
pub mod embedded;
pub mod error;
mod journal;
pub mod message;
pub mod relay;
pub mod traits;

pub use broker::GridBroker;
pub use embedded::{EmbeddedQueue, EmbeddedQueueFactory};
pub use error::{BrokerError, BrokerResult, TARGET_LIMIT_MESSAGE};
pub use message::MessageContainer;
pub use relay::{RelayQueue, RelayQueueFactory, RelayResponse};
pub use traits::{Delivery, Queue, QueueFactory};

#[cfg(test)]
pub(crate) mod tests;
