//! Explicit runtime context
//!
//! Everything a service instance shares between its threads is built once
//! at startup and handed around as `Arc<GridContext>`: resolved settings,
//! the broker, the memory monitor and the cache-clear hooks run under
//! memory pressure.

use crate::core::config::{BrokerSettings, ConfigError, GridConfig};
use crate::core::error_handling::ContextualError;
use crate::core::memory::{MemoryMonitor, MemoryStatus};
use crate::core::shutdown::ShutdownSignal;
use crate::core::sync::{handle_rwlock_read, handle_rwlock_write};
use crate::queue::{BrokerError, GridBroker};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

pub type CacheHook = Box<dyn Fn() + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Broker(#[from] BrokerError),
}

impl ContextualError for ContextError {
    fn is_user_actionable(&self) -> bool {
        match self {
            ContextError::Config(e) => e.is_user_actionable(),
            ContextError::Broker(e) => e.is_user_actionable(),
        }
    }

    fn user_message(&self) -> Option<String> {
        match self {
            ContextError::Config(e) => e.user_message(),
            ContextError::Broker(e) => e.user_message(),
        }
    }
}

pub struct GridContext {
    config: GridConfig,
    settings: BrokerSettings,
    broker: Arc<GridBroker>,
    memory: MemoryMonitor,
    memory_short: AtomicBool,
    cache_hooks: RwLock<Vec<CacheHook>>,
    shutdown: ShutdownSignal,
}

impl std::fmt::Debug for GridContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GridContext")
            .field("settings", &self.settings)
            .field("broker", &self.broker)
            .finish_non_exhaustive()
    }
}

impl GridContext {
    /// Resolve settings from `config` and connect the broker
    pub fn init(config: GridConfig) -> Result<Self, ContextError> {
        let settings = config.broker_settings()?;
        let broker = Arc::new(GridBroker::new(&settings)?);
        Ok(Self::from_parts(config, settings, broker))
    }

    pub fn from_parts(config: GridConfig, settings: BrokerSettings, broker: Arc<GridBroker>) -> Self {
        let context = Self {
            memory: MemoryMonitor::new(settings.memory_limit),
            memory_short: AtomicBool::new(false),
            config,
            settings,
            broker,
            cache_hooks: RwLock::new(Vec::new()),
            shutdown: ShutdownSignal::new(),
        };
        context.register_cache_hook(crate::core::logging::flush_logging);
        context
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    pub fn settings(&self) -> &BrokerSettings {
        &self.settings
    }

    pub fn broker(&self) -> &Arc<GridBroker> {
        &self.broker
    }

    pub fn shutdown_signal(&self) -> &ShutdownSignal {
        &self.shutdown
    }

    pub fn memory(&self) -> &MemoryMonitor {
        &self.memory
    }

    pub fn register_cache_hook(&self, hook: impl Fn() + Send + Sync + 'static) {
        match handle_rwlock_write(self.cache_hooks.write(), BrokerError::poisoned) {
            Ok(mut hooks) => hooks.push(Box::new(hook)),
            Err(e) => log::error!("Cannot register cache hook: {}", e),
        }
    }

    /// Run every cache-clear hook; returns how many ran
    pub fn clear_caches(&self) -> usize {
        match handle_rwlock_read(self.cache_hooks.read(), BrokerError::poisoned) {
            Ok(hooks) => {
                for hook in hooks.iter() {
                    hook();
                }
                hooks.len()
            }
            Err(e) => {
                log::error!("Cannot run cache hooks: {}", e);
                0
            }
        }
    }

    /// Clear caches if memory is short; returns the status that triggered it
    ///
    /// Warns once when memory becomes short and logs at info level when it
    /// has recovered.
    pub fn check_memory(&self) -> Option<MemoryStatus> {
        let Some(status) = self.memory.short_status() else {
            if self.mark_memory_short(false) {
                log::info!("Memory usage back below the limit");
            }
            return None;
        };
        if self.mark_memory_short(true) {
            log::warn!(
                "Memory short: {} of {} bytes resident, clearing caches",
                status.resident_bytes,
                status.limit_bytes
            );
        } else {
            log::debug!("Memory still short: {} bytes resident", status.resident_bytes);
        }
        self.clear_caches();
        Some(status)
    }

    pub fn is_memory_short(&self) -> bool {
        self.memory_short.load(Ordering::Acquire)
    }

    /// Record the memory state; true if it changed
    pub(crate) fn mark_memory_short(&self, short: bool) -> bool {
        self.memory_short.swap(short, Ordering::AcqRel) != short
    }

    /// Stop all listeners sharing this context and close the broker
    pub fn shutdown(&self) {
        self.shutdown.trigger();
        self.broker.close();
    }
}
