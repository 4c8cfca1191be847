//! crawlgrid: coordination layer of a distributed crawl and index pipeline
//!
//! Service instances exchange [`thought::Thought`] messages over durable
//! queues. [`queue::GridBroker`] routes each queue to an embedded SQLite
//! store or a remote relay, and [`listener::BrokerListener`] runs the per-service
//! dispatch engine on top of it.

pub mod app;
pub mod core;
pub mod listener;
pub mod queue;
pub mod services;
pub mod thought;

include!(concat!(env!("OUT_DIR"), "/version.rs"));
