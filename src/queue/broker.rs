//! Grid broker: backend selection and depth limits
//!
//! The broker owns one [`QueueFactory`] per service and backend. Every call
//! tries the configured relays in order and falls back to the embedded
//! store when none answers; the relays are tried again on the next call, so
//! a coordinator that comes back is picked up without a restart.
//!
//! Messages accepted by the embedded store during an outage stay visible
//! after the relay returns: an empty relay receive drains the embedded
//! queue, and `available`/`recover` cover both backends.

use crate::core::config::BrokerSettings;
use crate::core::sync::{handle_rwlock_read, handle_rwlock_write};
use crate::queue::embedded::EmbeddedQueueFactory;
use crate::queue::error::{BrokerError, BrokerResult};
use crate::queue::message::MessageContainer;
use crate::queue::relay::{http_client, probe_relay, relay_base_url, RelayQueueFactory};
use crate::queue::traits::{Queue, QueueFactory};
use crate::services::{QueueName, Service};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum FactoryKey {
    Relay(Service, usize),
    Embedded(Service),
}

pub struct GridBroker {
    relay_urls: Vec<String>,
    client: Option<reqwest::blocking::Client>,
    storage_root: Option<PathBuf>,
    queue_limit: usize,
    factories: RwLock<HashMap<FactoryKey, Arc<dyn QueueFactory>>>,
    relay_online: AtomicBool,
    closed: AtomicBool,
}

impl std::fmt::Debug for GridBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GridBroker")
            .field("relay_urls", &self.relay_urls)
            .field("storage_root", &self.storage_root)
            .field("queue_limit", &self.queue_limit)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

impl GridBroker {
    /// Build a broker from resolved settings
    ///
    /// Unless `lazy` is set, each relay is probed once and the outcome logged;
    /// an unreachable relay is not an error here.
    pub fn new(settings: &BrokerSettings) -> BrokerResult<Self> {
        let relay_urls: Vec<String> = settings
            .mcp_addresses
            .iter()
            .map(|a| relay_base_url(a))
            .collect();
        let client = if relay_urls.is_empty() {
            None
        } else {
            Some(http_client()?)
        };

        let broker = Self {
            relay_urls,
            client,
            storage_root: settings.storage_path.clone(),
            queue_limit: settings.queue_limit,
            factories: RwLock::new(HashMap::new()),
            relay_online: AtomicBool::new(true),
            closed: AtomicBool::new(false),
        };

        if !settings.lazy {
            broker.probe_relays();
        }
        if let Some(root) = &broker.storage_root {
            log::info!("Embedded queue storage at {}", root.display());
        }
        Ok(broker)
    }

    fn probe_relays(&self) {
        let Some(client) = &self.client else {
            return;
        };
        let mut any_online = false;
        for url in &self.relay_urls {
            match probe_relay(client, url) {
                Ok(()) => {
                    log::info!("Connected to relay {}", url);
                    any_online = true;
                }
                Err(e) => log::warn!("Relay {} not reachable: {}", url, e),
            }
        }
        self.relay_online.store(any_online, Ordering::Release);
    }

    pub fn queue_limit(&self) -> usize {
        self.queue_limit
    }

    /// A backend is available: embedded storage, or a relay that answered
    /// the last call
    pub fn is_ready(&self) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        self.storage_root.is_some()
            || (!self.relay_urls.is_empty() && self.relay_online.load(Ordering::Acquire))
    }

    /// Description of the backend the next call for `service` would try first
    pub fn connection_url(&self, service: Service) -> Option<String> {
        if !self.relay_urls.is_empty() && self.relay_online.load(Ordering::Acquire) {
            return self.relay_urls.first().cloned();
        }
        self.storage_root
            .as_ref()
            .map(|root| format!("file://{}", root.join(service.as_ref()).display()))
    }

    pub fn send(&self, service: Service, queue: &QueueName, payload: &[u8]) -> BrokerResult<()> {
        let limit = self.queue_limit;
        self.route(service, queue, |_, q| {
            if limit > 0 && q.available()? >= limit {
                return Err(BrokerError::TargetLimit {
                    service,
                    queue: queue.clone(),
                });
            }
            q.send(payload)
        })
    }

    pub fn receive(
        &self,
        service: Service,
        queue: &QueueName,
        timeout: Duration,
        auto_ack: bool,
    ) -> BrokerResult<Option<MessageContainer>> {
        let (message, key) = self.route_keyed(service, queue, |factory, q| {
            Ok(q.receive(timeout, auto_ack)?
                .map(|delivery| MessageContainer::new(delivery, factory.connection_url())))
        })?;
        if message.is_some() || matches!(key, FactoryKey::Embedded(_)) {
            return Ok(message);
        }
        match self.embedded_queue(service, queue)? {
            Some((factory, q)) => Ok(q
                .receive(Duration::ZERO, auto_ack)?
                .map(|delivery| MessageContainer::new(delivery, factory.connection_url()))),
            None => Ok(None),
        }
    }

    /// Acknowledge on the backend that handed out `message`
    pub fn acknowledge(
        &self,
        service: Service,
        queue: &QueueName,
        message: &MessageContainer,
    ) -> BrokerResult<()> {
        if !message.requires_ack() {
            return Ok(());
        }
        let tag = message.delivery_tag();
        match self.origin_factory(service, message.connection_url())? {
            Some(factory) => factory.get_queue(queue)?.acknowledge(tag),
            None => self.route(service, queue, |_, q| q.acknowledge(tag)),
        }
    }

    /// Requeue `message` at the head of its queue
    pub fn reject(
        &self,
        service: Service,
        queue: &QueueName,
        message: &MessageContainer,
    ) -> BrokerResult<()> {
        if !message.requires_ack() {
            return Ok(());
        }
        let tag = message.delivery_tag();
        match self.origin_factory(service, message.connection_url())? {
            Some(factory) => factory.get_queue(queue)?.reject(tag),
            None => self.route(service, queue, |_, q| q.reject(tag)),
        }
    }

    /// Requeue unacknowledged deliveries on the routed backend and, behind a
    /// live relay, in the embedded store as well
    pub fn recover(&self, service: Service, queue: &QueueName) -> BrokerResult<usize> {
        self.sum_backends(service, queue, |q| q.recover())
    }

    pub fn available(&self, service: Service, queue: &QueueName) -> BrokerResult<usize> {
        self.sum_backends(service, queue, |q| q.available())
    }

    pub fn available_many(&self, service: Service, queues: &[QueueName]) -> BrokerResult<Vec<usize>> {
        queues.iter().map(|q| self.available(service, q)).collect()
    }

    pub fn clear(&self, service: Service, queue: &QueueName) -> BrokerResult<()> {
        self.route(service, queue, |_, q| q.clear())
    }

    /// Close every factory; later calls fail with `BrokerError::Closed`
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Ok(mut factories) = self.factories.write() {
            for factory in factories.values() {
                factory.close();
            }
            factories.clear();
        }
        log::debug!("Broker closed");
    }

    fn route<T>(
        &self,
        service: Service,
        queue: &QueueName,
        operation: impl Fn(&dyn QueueFactory, &dyn Queue) -> BrokerResult<T>,
    ) -> BrokerResult<T> {
        self.route_keyed(service, queue, operation).map(|(value, _)| value)
    }

    fn sum_backends(
        &self,
        service: Service,
        queue: &QueueName,
        operation: impl Fn(&dyn Queue) -> BrokerResult<usize>,
    ) -> BrokerResult<usize> {
        let (routed, key) = self.route_keyed(service, queue, |_, q| operation(q))?;
        if matches!(key, FactoryKey::Embedded(_)) {
            return Ok(routed);
        }
        match self.embedded_queue(service, queue)? {
            Some((_, q)) => Ok(routed + operation(q.as_ref())?),
            None => Ok(routed),
        }
    }

    /// The embedded queue, when a storage root is configured
    fn embedded_queue(
        &self,
        service: Service,
        queue: &QueueName,
    ) -> BrokerResult<Option<(Arc<dyn QueueFactory>, Arc<dyn Queue>)>> {
        if self.storage_root.is_none() {
            return Ok(None);
        }
        let factory = self.factory(FactoryKey::Embedded(service))?;
        let q = factory.get_queue(queue)?;
        Ok(Some((factory, q)))
    }

    /// Run `operation` on the first backend that answers; yields the backend used
    fn route_keyed<T>(
        &self,
        service: Service,
        queue: &QueueName,
        operation: impl Fn(&dyn QueueFactory, &dyn Queue) -> BrokerResult<T>,
    ) -> BrokerResult<(T, FactoryKey)> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BrokerError::Closed);
        }

        for index in 0..self.relay_urls.len() {
            let key = FactoryKey::Relay(service, index);
            let factory = self.factory(key)?;
            let result = factory
                .get_queue(queue)
                .and_then(|q| operation(factory.as_ref(), q.as_ref()));
            match result {
                Ok(value) => {
                    if !self.relay_online.swap(true, Ordering::AcqRel) {
                        log::info!("Relay {} is back", factory.connection_url());
                    }
                    return Ok((value, key));
                }
                Err(e) if e.is_relay_failure() => {
                    if self.relay_online.swap(false, Ordering::AcqRel) {
                        log::warn!(
                            "Relay {} failed for {}/{}, falling back: {}",
                            factory.connection_url(),
                            service,
                            queue,
                            e
                        );
                    } else {
                        log::debug!("Relay {} still unavailable: {}", factory.connection_url(), e);
                    }
                }
                Err(e) => return Err(e),
            }
        }

        if self.storage_root.is_none() {
            return Err(BrokerError::NoLocalQueue { service });
        }
        let key = FactoryKey::Embedded(service);
        let factory = self.factory(key)?;
        let q = factory.get_queue(queue)?;
        Ok((operation(factory.as_ref(), q.as_ref())?, key))
    }

    fn origin_factory(
        &self,
        service: Service,
        connection_url: &str,
    ) -> BrokerResult<Option<Arc<dyn QueueFactory>>> {
        let factories = handle_rwlock_read(self.factories.read(), BrokerError::poisoned)?;
        Ok(factories
            .iter()
            .filter(|(key, _)| match key {
                FactoryKey::Relay(s, _) | FactoryKey::Embedded(s) => *s == service,
            })
            .map(|(_, factory)| factory)
            .find(|factory| factory.connection_url() == connection_url)
            .cloned())
    }

    fn factory(&self, key: FactoryKey) -> BrokerResult<Arc<dyn QueueFactory>> {
        {
            let factories = handle_rwlock_read(self.factories.read(), BrokerError::poisoned)?;
            if let Some(factory) = factories.get(&key) {
                return Ok(factory.clone());
            }
        }
        let mut factories = handle_rwlock_write(self.factories.write(), BrokerError::poisoned)?;
        if self.closed.load(Ordering::Acquire) {
            return Err(BrokerError::Closed);
        }
        if let Some(factory) = factories.get(&key) {
            return Ok(factory.clone());
        }
        let factory = self.create_factory(key)?;
        factories.insert(key, factory.clone());
        Ok(factory)
    }

    fn create_factory(&self, key: FactoryKey) -> BrokerResult<Arc<dyn QueueFactory>> {
        match key {
            FactoryKey::Relay(service, index) => {
                let client = self.client.clone().ok_or(BrokerError::NoLocalQueue { service })?;
                Ok(Arc::new(RelayQueueFactory::new(
                    client,
                    self.relay_urls[index].clone(),
                    service,
                )))
            }
            FactoryKey::Embedded(service) => {
                let root = self
                    .storage_root
                    .as_ref()
                    .ok_or(BrokerError::NoLocalQueue { service })?;
                Ok(Arc::new(EmbeddedQueueFactory::open(root, service)?))
            }
        }
    }
}

impl Drop for GridBroker {
    fn drop(&mut self) {
        self.close();
    }
}
