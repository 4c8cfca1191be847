//! Embedded queue backend
//!
//! Queues live in a directory per service under the storage root, one
//! SQLite database per queue. A process owns its storage root exclusively.

use crate::core::sync::{handle_condvar_wait, handle_mutex_poison, handle_rwlock_read, handle_rwlock_write};
use crate::queue::error::{BrokerError, BrokerResult};
use crate::queue::journal::Journal;
use crate::queue::traits::{Delivery, Queue, QueueFactory};
use crate::services::{QueueName, Service};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, RwLock};
use std::time::{Duration, Instant};

#[derive(Debug)]
struct QueueState {
    journal: Journal,
    closed: bool,
}

/// One database-backed queue
#[derive(Debug)]
pub struct EmbeddedQueue {
    name: QueueName,
    state: Mutex<QueueState>,
    arrived: Condvar,
}

impl EmbeddedQueue {
    fn open(directory: &Path, name: QueueName) -> BrokerResult<Self> {
        let journal = Journal::open(&directory.join(format!("{}.db", name)))?;
        if journal.unacked() > 0 {
            log::info!(
                "Queue {} reopened with {} unacknowledged deliveries awaiting recover",
                name,
                journal.unacked()
            );
        }
        Ok(Self {
            name,
            state: Mutex::new(QueueState {
                journal,
                closed: false,
            }),
            arrived: Condvar::new(),
        })
    }

    fn lock(&self) -> BrokerResult<MutexGuard<'_, QueueState>> {
        let state = handle_mutex_poison(self.state.lock(), BrokerError::poisoned)?;
        if state.closed {
            return Err(BrokerError::Closed);
        }
        Ok(state)
    }

    fn mark_closed(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.closed = true;
        }
        self.arrived.notify_all();
    }
}

impl Queue for EmbeddedQueue {
    fn name(&self) -> &QueueName {
        &self.name
    }

    fn send(&self, payload: &[u8]) -> BrokerResult<()> {
        let mut state = self.lock()?;
        state.journal.push(payload)?;
        drop(state);
        self.arrived.notify_one();
        Ok(())
    }

    fn receive(&self, timeout: Duration, auto_ack: bool) -> BrokerResult<Option<Delivery>> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock()?;
        loop {
            if state.closed {
                return Err(BrokerError::Closed);
            }
            if !state.journal.is_pending_empty() {
                return state.journal.deliver(auto_ack);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let (guard, _) = handle_condvar_wait(
                self.arrived.wait_timeout(state, deadline - now),
                BrokerError::poisoned,
            )?;
            state = guard;
        }
    }

    fn acknowledge(&self, tag: u64) -> BrokerResult<()> {
        if self.lock()?.journal.acknowledge(tag)? {
            Ok(())
        } else {
            Err(BrokerError::UnknownDelivery {
                queue: self.name.clone(),
                tag,
            })
        }
    }

    fn reject(&self, tag: u64) -> BrokerResult<()> {
        let mut state = self.lock()?;
        if !state.journal.reject(tag)? {
            return Err(BrokerError::UnknownDelivery {
                queue: self.name.clone(),
                tag,
            });
        }
        drop(state);
        self.arrived.notify_one();
        Ok(())
    }

    fn recover(&self) -> BrokerResult<usize> {
        let count = self.lock()?.journal.recover()?;
        if count > 0 {
            self.arrived.notify_all();
        }
        Ok(count)
    }

    fn available(&self) -> BrokerResult<usize> {
        Ok(self.lock()?.journal.available())
    }

    fn clear(&self) -> BrokerResult<()> {
        self.lock()?.journal.clear()
    }
}

/// Database-backed queues of one service
#[derive(Debug)]
pub struct EmbeddedQueueFactory {
    service: Service,
    directory: PathBuf,
    queues: RwLock<HashMap<QueueName, Arc<EmbeddedQueue>>>,
    closed: AtomicBool,
}

impl EmbeddedQueueFactory {
    /// Open (creating if needed) `<root>/<service>`
    pub fn open(root: &Path, service: Service) -> BrokerResult<Self> {
        let directory = root.join(service.as_ref());
        std::fs::create_dir_all(&directory).map_err(|e| BrokerError::io(&directory, e))?;
        log::debug!("Embedded queues for {} at {}", service, directory.display());
        Ok(Self {
            service,
            directory,
            queues: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

impl QueueFactory for EmbeddedQueueFactory {
    fn service(&self) -> Service {
        self.service
    }

    fn connection_url(&self) -> String {
        format!("file://{}", self.directory.display())
    }

    fn get_queue(&self, name: &QueueName) -> BrokerResult<Arc<dyn Queue>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BrokerError::Closed);
        }
        {
            let queues = handle_rwlock_read(self.queues.read(), BrokerError::poisoned)?;
            if let Some(queue) = queues.get(name) {
                return Ok(queue.clone());
            }
        }
        let mut queues = handle_rwlock_write(self.queues.write(), BrokerError::poisoned)?;
        if let Some(queue) = queues.get(name) {
            return Ok(queue.clone());
        }
        let queue = Arc::new(EmbeddedQueue::open(&self.directory, name.clone())?);
        queues.insert(name.clone(), queue.clone());
        Ok(queue)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        if let Ok(mut queues) = self.queues.write() {
            for queue in queues.values() {
                queue.mark_closed();
            }
            queues.clear();
        }
    }
}
