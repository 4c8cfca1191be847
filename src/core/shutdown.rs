//! Shutdown Coordination
//!
//! Listener threads are plain OS threads, so cancellation is a shared flag
//! paired with a condition variable: every pause a worker takes (throttling,
//! poison-message backoff, forward retry) goes through [`ShutdownSignal::sleep`]
//! and wakes the moment shutdown is triggered.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct SignalState {
    requested: AtomicBool,
    lock: Mutex<()>,
    wakeup: Condvar,
    children: Mutex<Vec<Weak<SignalState>>>,
}

impl SignalState {
    fn trigger(&self) {
        // Release pairs with the Acquire load in is_triggered
        self.requested.store(true, Ordering::Release);
        {
            let _guard = self.lock.lock();
            self.wakeup.notify_all();
        }
        let children = match self.children.lock() {
            Ok(mut children) => std::mem::take(&mut *children),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        for child in children.iter().filter_map(Weak::upgrade) {
            child.trigger();
        }
    }
}

/// Cloneable cancellation handle shared by a listener and all its threads
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    state: Arc<SignalState>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// A signal of its own that is also triggered when `self` is
    ///
    /// Triggering the child leaves the parent untouched.
    pub fn child(&self) -> Self {
        let child = Self::new();
        {
            let mut children = match self.state.children.lock() {
                Ok(children) => children,
                Err(poisoned) => poisoned.into_inner(),
            };
            children.retain(|c| c.strong_count() > 0);
            children.push(Arc::downgrade(&child.state));
        }
        if self.is_triggered() {
            child.trigger();
        }
        child
    }

    /// Request shutdown and wake every thread parked in [`sleep`](Self::sleep)
    pub fn trigger(&self) {
        self.state.trigger();
    }

    pub fn is_triggered(&self) -> bool {
        self.state.requested.load(Ordering::Acquire)
    }

    /// Sleep for `duration` unless shutdown is requested first
    ///
    /// Returns `true` when the full duration elapsed and `false` when the
    /// sleep was cut short by shutdown.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let mut guard = match self.state.lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        loop {
            if self.is_triggered() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            guard = match self.state.wakeup.wait_timeout(guard, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }
}

/// Install SIGINT/SIGTERM/SIGHUP/SIGQUIT handlers that trigger `signal`
///
/// Handlers run on a dedicated thread with a current-thread tokio runtime so
/// the listener threads stay free of any async executor. A second signal
/// forces an immediate exit.
pub fn install_signal_handlers(signal: ShutdownSignal) -> std::io::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    std::thread::Builder::new()
        .name("signal-handler".to_string())
        .spawn(move || runtime.block_on(wait_for_signals(signal)))?;
    Ok(())
}

async fn wait_for_signals(signal: ShutdownSignal) {
    let signal_count = Arc::new(AtomicUsize::new(0));

    #[cfg(unix)]
    {
        unsafe {
            libc::signal(libc::SIGPIPE, libc::SIG_DFL);
        }

        use tokio::signal::unix::{signal as unix_signal, SignalKind};
        let kinds = [
            SignalKind::interrupt(),
            SignalKind::terminate(),
            SignalKind::hangup(),
            SignalKind::quit(),
        ];

        for kind in kinds {
            let shutdown = signal.clone();
            let counter = signal_count.clone();
            tokio::spawn(async move {
                match unix_signal(kind) {
                    Ok(mut stream) => {
                        while stream.recv().await.is_some() {
                            record_signal(&shutdown, &counter);
                        }
                    }
                    Err(e) => log::warn!("Cannot install handler for {:?}: {}", kind, e),
                }
            });
        }
    }

    #[cfg(not(unix))]
    {
        let shutdown = signal.clone();
        let counter = signal_count.clone();
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                record_signal(&shutdown, &counter);
            }
        });
    }

    std::future::pending::<()>().await
}

fn record_signal(signal: &ShutdownSignal, counter: &AtomicUsize) {
    let previous = counter.fetch_add(1, Ordering::AcqRel);
    signal.trigger();
    if previous >= 1 {
        log::warn!("Second shutdown signal received; exiting");
        std::process::exit(130);
    }
    log::info!("Shutdown requested; waiting for listener threads to finish");
}
