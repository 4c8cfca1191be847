//! Traits for the queue backends
//!
//! A backend provides a [`QueueFactory`] per service, which hands out
//! [`Queue`] handles by name. The broker only talks to these traits, so the
//! embedded journal store and the HTTP relay are interchangeable.

use crate::queue::error::BrokerResult;
use crate::services::{QueueName, Service};
use std::sync::Arc;
use std::time::Duration;

/// A message taken off a queue
///
/// `tag` is 0 for auto-acknowledged deliveries; explicit acknowledgement
/// requires the non-zero tag handed out here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub payload: Vec<u8>,
    pub tag: u64,
}

/// A durable FIFO channel with explicit acknowledgement
pub trait Queue: Send + Sync {
    fn name(&self) -> &QueueName;

    /// Durably enqueue `payload` at the tail
    fn send(&self, payload: &[u8]) -> BrokerResult<()>;

    /// Block up to `timeout` for the next message
    ///
    /// Returns `Ok(None)` when nothing arrived in time. With `auto_ack` the
    /// message is final on return and the delivery tag is 0.
    fn receive(&self, timeout: Duration, auto_ack: bool) -> BrokerResult<Option<Delivery>>;

    fn acknowledge(&self, tag: u64) -> BrokerResult<()>;

    /// Return an unacknowledged delivery to the head of the queue
    fn reject(&self, tag: u64) -> BrokerResult<()>;

    /// Return every unacknowledged delivery to the queue; yields the count
    fn recover(&self) -> BrokerResult<usize>;

    /// Messages waiting for delivery, excluding in-flight deliveries
    fn available(&self) -> BrokerResult<usize>;

    /// Drop every waiting message
    fn clear(&self) -> BrokerResult<()>;
}

/// Owns the queues of one service on one backend
pub trait QueueFactory: Send + Sync {
    fn service(&self) -> Service;

    /// Where this factory's queues live, e.g. `file:///var/lib/grid/parser`
    fn connection_url(&self) -> String;

    /// Fetch or lazily create the named queue
    fn get_queue(&self, name: &QueueName) -> BrokerResult<Arc<dyn Queue>>;

    /// Release all queues; later calls fail with `BrokerError::Closed`
    fn close(&self);
}
