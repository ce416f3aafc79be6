//! In-process broker
//!
//! Each queue is a `VecDeque` of payloads plus a `Notify` that poppers park on.
//! The map lock is only held for constant-time queue operations and never
//! across an await.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

use crate::{Broker, BrokerError, Popped};

#[derive(Debug, Default)]
struct Queue {
    items: VecDeque<Vec<u8>>,
    notify: Arc<Notify>,
    waiters: usize,
}

impl Queue {
    fn is_idle(&self) -> bool {
        self.items.is_empty() && self.waiters == 0
    }
}

/// Broker whose queues live in this process
///
/// Queues spring into existence on first use and are pruned once they are
/// empty and nobody waits on them, so one-shot queue names do not pile up.
#[derive(Debug, Default)]
pub struct MemoryBroker {
    queues: Mutex<HashMap<String, Queue>>,
}

/// Deregisters a parked popper, including when its future is dropped mid-wait
struct WaiterGuard<'a> {
    broker: &'a MemoryBroker,
    queue: &'a str,
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        self.broker.unregister_waiter(self.queue);
    }
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a broker ready to be shared between a server and local users
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Put a payload back at the head of `queue`
    ///
    /// Used when a popped payload could not be delivered, so it is not lost.
    pub fn requeue(&self, queue: &str, payload: Vec<u8>) {
        debug!(%queue, len = payload.len(), "MemoryBroker::requeue: called");
        let mut queues = self.queues();
        let entry = queues.entry(queue.to_string()).or_default();
        entry.items.push_front(payload);
        entry.notify.notify_waiters();
    }

    /// Number of queues currently tracked (non-empty or awaited)
    pub fn queue_count(&self) -> usize {
        self.queues().len()
    }

    fn queues(&self) -> MutexGuard<'_, HashMap<String, Queue>> {
        self.queues.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn try_pop(&self, queue: &str) -> Option<Vec<u8>> {
        let mut queues = self.queues();
        let entry = queues.get_mut(queue)?;
        let item = entry.items.pop_front();
        if entry.is_idle() {
            queues.remove(queue);
        }
        item
    }

    fn register_waiter(&self, queue: &str) -> Arc<Notify> {
        let mut queues = self.queues();
        let entry = queues.entry(queue.to_string()).or_default();
        entry.waiters += 1;
        entry.notify.clone()
    }

    fn unregister_waiter(&self, queue: &str) {
        let mut queues = self.queues();
        if let Some(entry) = queues.get_mut(queue) {
            entry.waiters = entry.waiters.saturating_sub(1);
            if entry.is_idle() {
                queues.remove(queue);
            }
        }
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn push(&self, queue: &str, payload: Vec<u8>) -> Result<(), BrokerError> {
        debug!(%queue, len = payload.len(), "MemoryBroker::push: called");
        let mut queues = self.queues();
        let entry = queues.entry(queue.to_string()).or_default();
        entry.items.push_back(payload);
        entry.notify.notify_waiters();
        Ok(())
    }

    async fn blocking_pop(&self, queue: &str, timeout: Option<Duration>) -> Result<Popped, BrokerError> {
        debug!(%queue, ?timeout, "MemoryBroker::blocking_pop: called");
        // A deadline past the end of representable time is no deadline
        let deadline = timeout.and_then(|limit| Instant::now().checked_add(limit));

        if let Some(item) = self.try_pop(queue) {
            return Ok(Popped::Item(item));
        }

        let notify = self.register_waiter(queue);
        let _guard = WaiterGuard { broker: self, queue };

        loop {
            // Created before the check so a push landing in between still wakes us
            let notified = notify.notified();

            if let Some(item) = self.try_pop(queue) {
                debug!(%queue, "MemoryBroker::blocking_pop: item after wait");
                return Ok(Popped::Item(item));
            }

            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        let popped = self.try_pop(queue).map_or(Popped::Timeout, Popped::Item);
                        debug!(%queue, timeout = popped.is_timeout(), "MemoryBroker::blocking_pop: deadline reached");
                        return Ok(popped);
                    }
                }
                None => notified.await,
            }
        }
    }

    async fn delete(&self, queue: &str) -> Result<bool, BrokerError> {
        debug!(%queue, "MemoryBroker::delete: called");
        let mut queues = self.queues();
        let Some(entry) = queues.get_mut(queue) else {
            return Ok(false);
        };
        let existed = !entry.items.is_empty();
        entry.items.clear();
        // Parked poppers keep their Notify, so the entry stays while they wait
        if entry.is_idle() {
            queues.remove(queue);
        }
        Ok(existed)
    }

    async fn len(&self, queue: &str) -> Result<usize, BrokerError> {
        Ok(self.queues().get(queue).map_or(0, |entry| entry.items.len()))
    }

    async fn ping(&self) -> Result<bool, BrokerError> {
        Ok(true)
    }
}
