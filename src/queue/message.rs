//! Delivered message container

use crate::queue::traits::Delivery;

/// A received message together with where it came from
///
/// The connection URL lets the broker route the acknowledgement back to the
/// backend that handed out the delivery, even if the broker has since
/// switched between relay and embedded storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageContainer {
    payload: Vec<u8>,
    delivery_tag: u64,
    connection_url: String,
}

impl MessageContainer {
    pub fn new(delivery: Delivery, connection_url: impl Into<String>) -> Self {
        Self {
            payload: delivery.payload,
            delivery_tag: delivery.tag,
            connection_url: connection_url.into(),
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn delivery_tag(&self) -> u64 {
        self.delivery_tag
    }

    pub fn connection_url(&self) -> &str {
        &self.connection_url
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Needs an explicit acknowledge or reject
    pub fn requires_ack(&self) -> bool {
        self.delivery_tag > 0
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }
}
