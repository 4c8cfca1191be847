//! Listener orchestration: recover, fan out workers, run the caretaker

use crate::core::context::GridContext;
use crate::core::retry::RetryPolicy;
use crate::core::shutdown::ShutdownSignal;
use crate::listener::caretaker::{messages_per_minute, Caretaker};
use crate::listener::dispatch::Dispatcher;
use crate::listener::error::{ListenerError, ListenerResult};
use crate::listener::processor::{ActionProcessor, ProcessorRegistry, WorkerId};
use crate::listener::worker::Worker;
use crate::services::{QueueName, Service};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Worker threads per source queue for a configured thread count
///
/// Every queue gets at least one worker, so the total exceeds `threads`
/// when there are more queues than threads.
pub fn threads_per_queue(threads: usize, queue_count: usize) -> usize {
    (threads / queue_count.max(1)).max(1)
}

/// Consumes the source queues of one service
pub struct BrokerListener {
    context: Arc<GridContext>,
    service: Service,
    queues: Vec<QueueName>,
    processor: Arc<dyn ActionProcessor>,
    shutdown: ShutdownSignal,
}

impl std::fmt::Debug for BrokerListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerListener")
            .field("service", &self.service)
            .field("queues", &self.queues)
            .finish_non_exhaustive()
    }
}

impl BrokerListener {
    /// Listener for `service` using the processor registered for it
    pub fn new(
        context: Arc<GridContext>,
        service: Service,
        registry: &ProcessorRegistry,
    ) -> ListenerResult<Self> {
        let queues = service.source_queues();
        if queues.is_empty() {
            return Err(ListenerError::NoSourceQueues(service));
        }
        let processor = registry
            .get(service)
            .ok_or(ListenerError::NoProcessor(service))?;
        let shutdown = context.shutdown_signal().child();
        Ok(Self {
            context,
            service,
            queues,
            processor,
            shutdown,
        })
    }

    /// Use a separate shutdown signal instead of a child of the context's
    pub fn with_shutdown(mut self, shutdown: ShutdownSignal) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn service(&self) -> Service {
        self.service
    }

    /// Start all threads and block until they have finished
    pub fn run(self) -> ListenerResult<()> {
        self.start()?.join();
        Ok(())
    }

    /// Start all threads and return a handle to stop them
    pub fn start(self) -> ListenerResult<ListenerHandle> {
        let broker = self.context.broker().clone();
        let settings = self.context.settings().clone();

        for queue in &self.queues {
            match broker.recover(self.service, queue) {
                Ok(0) => {}
                Ok(count) => log::info!("Service {}, queue {}: recovered {} deliveries", self.service, queue, count),
                Err(e) => log::error!("Service {}: recover of {} not possible: {}", self.service, queue, e),
            }
        }
        match broker.available_many(self.service, &self.queues) {
            Ok(sizes) => {
                for (queue, size) in self.queues.iter().zip(sizes) {
                    log::info!("Service {}, queue {}: {} entries", self.service, queue, size);
                }
            }
            Err(e) => log::error!("Service {}: queue sizes not available: {}", self.service, e),
        }

        let dispatcher = Arc::new(Dispatcher::new(
            self.service,
            broker.clone(),
            self.processor.clone(),
            RetryPolicy::with_delay(settings.backoff),
            self.shutdown.clone(),
        ));
        let target_fill = Arc::new(AtomicU64::new(0));
        let per_queue = threads_per_queue(settings.threads, self.queues.len());
        log::info!(
            "Listener {}: starting {} threads for each of the {} queues",
            self.service,
            per_queue,
            self.queues.len()
        );

        let mut handle = ListenerHandle {
            service: self.service,
            shutdown: self.shutdown.clone(),
            workers: Vec::new(),
            caretaker: None,
            throughput: Vec::new(),
            target_fill: target_fill.clone(),
        };

        for queue in &self.queues {
            for slot in 0..per_queue {
                let id = WorkerId {
                    service: self.service,
                    queue: queue.clone(),
                    slot,
                };
                let name = id.thread_name();
                let worker = Worker::new(
                    id,
                    self.context.clone(),
                    dispatcher.clone(),
                    target_fill.clone(),
                    self.shutdown.clone(),
                );
                handle.throughput.push(worker.throughput_counter());
                let spawned = thread::Builder::new()
                    .name(name.clone())
                    .spawn(move || worker.run());
                match spawned {
                    Ok(join) => handle.workers.push((name, join)),
                    Err(source) => {
                        handle.stop();
                        return Err(ListenerError::Spawn { name, source });
                    }
                }
            }
        }

        let caretaker = Caretaker::new(
            self.service,
            broker,
            target_fill,
            handle.throughput.clone(),
            settings.caretaker_interval,
            self.shutdown.clone(),
        );
        let name = format!("{}-caretaker", self.service);
        match thread::Builder::new().name(name.clone()).spawn(move || caretaker.run()) {
            Ok(join) => handle.caretaker = Some(join),
            Err(source) => {
                handle.stop();
                return Err(ListenerError::Spawn { name, source });
            }
        }

        Ok(handle)
    }
}

/// Running listener threads
pub struct ListenerHandle {
    service: Service,
    shutdown: ShutdownSignal,
    workers: Vec<(String, JoinHandle<()>)>,
    caretaker: Option<JoinHandle<()>>,
    throughput: Vec<Arc<AtomicUsize>>,
    target_fill: Arc<AtomicU64>,
}

impl ListenerHandle {
    pub fn service(&self) -> Service {
        self.service
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Completions over the last minute, summed over all workers
    pub fn messages_per_minute(&self) -> usize {
        messages_per_minute(&self.throughput)
    }

    /// Downstream fill as last published by the caretaker
    pub fn target_fill(&self) -> u64 {
        self.target_fill.load(Ordering::Acquire)
    }

    pub fn shutdown_signal(&self) -> &ShutdownSignal {
        &self.shutdown
    }

    /// Stop this listener and wait for every thread
    ///
    /// Other listeners on the same context keep running; the context's
    /// signal stops all of them.
    pub fn stop(self) {
        self.shutdown.trigger();
        self.join();
    }

    /// Wait for every thread without requesting shutdown
    pub fn join(self) {
        for (name, worker) in self.workers {
            if worker.join().is_err() {
                log::warn!("Listener thread {} panicked", name);
            }
        }
        if let Some(caretaker) = self.caretaker {
            if caretaker.join().is_err() {
                log::warn!("Caretaker of {} panicked", self.service);
            }
        }
        log::info!("Listener {} terminated", self.service);
    }
}
