// SPDX-License-Identifier: GPL-3.0-only

//! Main-thread marshaling and app lifecycle notifications
//!
//! Capture callbacks arrive on whatever thread the native side picks. Work
//! that touches GPU or UI-adjacent state is posted to a [`MainContext`] and
//! runs when the owning thread calls [`MainContext::pump`].
//!
//! [`Lifecycle`] carries pause and quit notifications to running sessions.
//! While paused, incoming buffers are dropped instead of queued.

use crate::sync::lock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread::ThreadId;
use tokio::sync::mpsc;
use tracing::{debug, warn};

type Job = Box<dyn FnOnce() + Send>;

/// Handle to the thread that owns GPU and UI state
#[derive(Clone)]
pub struct MainContext {
    inner: Arc<MainInner>,
}

struct MainInner {
    thread: ThreadId,
    sender: mpsc::UnboundedSender<Job>,
    receiver: Mutex<mpsc::UnboundedReceiver<Job>>,
    pending: AtomicUsize,
}

impl MainContext {
    /// Bind a main context to the calling thread
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(MainInner {
                thread: std::thread::current().id(),
                sender,
                receiver: Mutex::new(receiver),
                pending: AtomicUsize::new(0),
            }),
        }
    }

    /// Whether the calling thread is the main thread
    pub fn is_current(&self) -> bool {
        std::thread::current().id() == self.inner.thread
    }

    /// Queue a job for the next pump
    pub fn post(&self, job: impl FnOnce() + Send + 'static) {
        self.inner.pending.fetch_add(1, Ordering::AcqRel);
        if self.inner.sender.send(Box::new(job)).is_err() {
            self.inner.pending.fetch_sub(1, Ordering::AcqRel);
            warn!("Main context queue closed, dropping job");
        }
    }

    /// Run in place on the main thread, otherwise post
    pub fn run_or_post(&self, job: impl FnOnce() + Send + 'static) {
        if self.is_current() {
            job();
        } else {
            self.post(job);
        }
    }

    /// Run every queued job; returns how many ran
    ///
    /// Must be called on the main thread. Jobs posted while pumping run on
    /// the next pump.
    pub fn pump(&self) -> usize {
        if !self.is_current() {
            warn!("MainContext::pump called off the main thread, ignoring");
            return 0;
        }

        let jobs: Vec<Job> = {
            let mut receiver = lock(&self.inner.receiver);
            let mut jobs = Vec::new();
            while let Ok(job) = receiver.try_recv() {
                jobs.push(job);
            }
            jobs
        };

        let count = jobs.len();
        for job in jobs {
            self.inner.pending.fetch_sub(1, Ordering::AcqRel);
            job();
        }
        if count > 0 {
            debug!(count, "Pumped main context jobs");
        }
        count
    }

    /// Number of jobs waiting for a pump
    pub fn pending(&self) -> usize {
        self.inner.pending.load(Ordering::Acquire)
    }
}

impl Default for MainContext {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MainContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MainContext")
            .field("thread", &self.inner.thread)
            .field("pending", &self.pending())
            .finish()
    }
}

type PauseListener = Arc<dyn Fn(bool) + Send + Sync>;
type QuitListener = Arc<dyn Fn() + Send + Sync>;

/// App lifecycle hub (pause/resume and quit)
#[derive(Clone, Default)]
pub struct Lifecycle {
    inner: Arc<LifecycleInner>,
}

#[derive(Default)]
struct LifecycleInner {
    paused: AtomicBool,
    next_id: AtomicU64,
    listeners: Mutex<HashMap<u64, (PauseListener, QuitListener)>>,
}

/// Listener registration; dropping it unsubscribes
pub struct LifecycleSubscription {
    id: u64,
    hub: Weak<LifecycleInner>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register pause and quit listeners
    pub fn subscribe(
        &self,
        on_pause: impl Fn(bool) + Send + Sync + 'static,
        on_quit: impl Fn() + Send + Sync + 'static,
    ) -> LifecycleSubscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.inner.listeners).insert(id, (Arc::new(on_pause), Arc::new(on_quit)));
        LifecycleSubscription {
            id,
            hub: Arc::downgrade(&self.inner),
        }
    }

    /// Notify listeners that the app was paused or resumed
    pub fn set_paused(&self, paused: bool) {
        if self.inner.paused.swap(paused, Ordering::AcqRel) == paused {
            return;
        }
        debug!(paused, "App lifecycle pause changed");
        for (on_pause, _) in self.snapshot() {
            on_pause(paused);
        }
    }

    /// Notify listeners that the app is exiting
    pub fn quit(&self) {
        debug!("App lifecycle quit");
        for (_, on_quit) in self.snapshot() {
            on_quit();
        }
    }

    pub fn is_paused(&self) -> bool {
        self.inner.paused.load(Ordering::Acquire)
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        lock(&self.inner.listeners).len()
    }

    // Listeners run outside the lock so they may unsubscribe themselves
    fn snapshot(&self) -> Vec<(PauseListener, QuitListener)> {
        lock(&self.inner.listeners).values().cloned().collect()
    }
}

impl Drop for LifecycleSubscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            lock(&hub.listeners).remove(&self.id);
        }
    }
}
