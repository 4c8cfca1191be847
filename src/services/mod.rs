//! Service identities and queue names
//!
//! The pipeline is a fixed registry of stages. Each [`Service`] knows its
//! default port, the queues it consumes and the services it forwards to:
//!
//! ```text
//! crawler ──▶ loader ──▶ parser ──▶ indexer
//!    ▲           │          │
//!    │           ▼          │
//!    │      warcmanager     │
//!    └──────────────────────┘
//! ```

mod queue_name;
mod service;

pub use queue_name::{InvalidQueueName, QueueName};
pub use service::Service;
