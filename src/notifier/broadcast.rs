//! Non-blocking fan-out of stored events to live subscribers
//!
//! Each subscriber owns a bounded channel. Publishing uses `try_send`: a full
//! channel drops that message for that subscriber only, a closed channel
//! unregisters the subscriber. Ingestion never waits on a consumer.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::{self, error::TrySendError};

use super::events::EventRecord;

pub struct Subscription {
    pub id: u64,
    pub events: mpsc::Receiver<EventRecord>,
}

pub struct Broadcaster {
    buffer: usize,
    next_id: AtomicU64,
    subscribers: Mutex<HashMap<u64, mpsc::Sender<EventRecord>>>,
}

impl Broadcaster {
    pub fn new(buffer: usize) -> Self {
        Self {
            buffer: buffer.max(1),
            next_id: AtomicU64::new(1),
            subscribers: Mutex::new(HashMap::new()),
        }
    }

    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(self.buffer);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.lock().insert(id, tx);
        log::debug!("📡 Subscriber {} attached", id);
        Subscription { id, events: rx }
    }

    pub fn unsubscribe(&self, id: u64) {
        if self.subscribers.lock().remove(&id).is_some() {
            log::debug!("📡 Subscriber {} detached", id);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Offer `event` to every subscriber; returns how many accepted it.
    pub fn publish(&self, event: &EventRecord) -> usize {
        let mut subscribers = self.subscribers.lock();
        let mut delivered = 0;
        let mut closed = Vec::new();

        for (id, tx) in subscribers.iter() {
            match tx.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    log::debug!("Subscriber {} is full, dropping {}", id, event.event_key);
                }
                Err(TrySendError::Closed(_)) => closed.push(*id),
            }
        }

        for id in closed {
            subscribers.remove(&id);
            log::debug!("📡 Subscriber {} closed, removed", id);
        }

        delivered
    }
}
