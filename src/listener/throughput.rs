//! Per-worker completion window

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const WINDOW: Duration = Duration::from_secs(60);

/// Completions within the last minute, owned by one worker
///
/// Only the worker touches the window; the current count is published
/// through a shared counter the caretaker reads.
#[derive(Debug)]
pub struct ThroughputWindow {
    completions: VecDeque<Instant>,
    published: Arc<AtomicUsize>,
}

impl ThroughputWindow {
    pub fn new() -> Self {
        Self {
            completions: VecDeque::new(),
            published: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn counter(&self) -> Arc<AtomicUsize> {
        self.published.clone()
    }

    pub fn record(&mut self, now: Instant) {
        self.completions.push_back(now);
        self.expire(now);
    }

    /// Drop completions older than the window and publish the count
    pub fn expire(&mut self, now: Instant) {
        while let Some(first) = self.completions.front() {
            if now.duration_since(*first) > WINDOW {
                self.completions.pop_front();
            } else {
                break;
            }
        }
        self.published.store(self.completions.len(), Ordering::Relaxed);
    }

    pub fn len(&self) -> usize {
        self.completions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.completions.is_empty()
    }
}

impl Default for ThroughputWindow {
    fn default() -> Self {
        Self::new()
    }
}
