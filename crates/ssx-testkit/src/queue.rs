//! At-least-once queue held in memory.
//!
//! `receive` leases messages; a lease ends with `ack` (gone), `nack`
//! (visible again) or [`InMemoryQueue::expire_leases`], which stands in for
//! an ack deadline passing after a consumer crash.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use ssx_runtime::{Delivery, QueueError, QueueMessage, QueuePublisher, QueueSource};

struct Entry {
    id: u64,
    message: QueueMessage,
    delivery_count: u32,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    pending: VecDeque<Entry>,
    leased: BTreeMap<u64, Entry>,
    published: Vec<QueueMessage>,
    acked: usize,
}

#[derive(Default)]
pub struct InMemoryQueue {
    inner: Mutex<Inner>,
    fail_publish_for: Mutex<Vec<String>>,
    fail_next_publishes: AtomicUsize,
    fail_next_acks: AtomicUsize,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes of shipment `shipment_id` are rejected until cleared.
    pub fn reject_shipment(&self, shipment_id: &str) {
        if let Ok(mut f) = self.fail_publish_for.lock() {
            f.push(shipment_id.to_string());
        }
    }

    pub fn clear_rejections(&self) {
        if let Ok(mut f) = self.fail_publish_for.lock() {
            f.clear();
        }
    }

    pub fn fail_next_publishes(&self, n: usize) {
        self.fail_next_publishes.store(n, Ordering::SeqCst);
    }

    /// The next `n` acks fail and leave their lease in place.
    pub fn fail_next_acks(&self, n: usize) {
        self.fail_next_acks.store(n, Ordering::SeqCst);
    }

    /// Put the same message on the queue again, as a duplicate delivery.
    pub fn duplicate(&self, message: QueueMessage) {
        if let Ok(mut g) = self.inner.lock() {
            g.next_id += 1;
            let id = g.next_id;
            g.pending.push_back(Entry {
                id,
                message,
                delivery_count: 0,
            });
        }
    }

    /// Every leased message becomes visible again.
    pub fn expire_leases(&self) -> usize {
        let Ok(mut g) = self.inner.lock() else {
            return 0;
        };
        let leased = std::mem::take(&mut g.leased);
        let n = leased.len();
        for (_, e) in leased {
            g.pending.push_back(e);
        }
        n
    }

    /// Accepted publishes, in order.
    pub fn published(&self) -> Vec<QueueMessage> {
        self.inner
            .lock()
            .map(|g| g.published.clone())
            .unwrap_or_default()
    }

    pub fn pending_len(&self) -> usize {
        self.inner.lock().map(|g| g.pending.len()).unwrap_or(0)
    }

    pub fn leased_len(&self) -> usize {
        self.inner.lock().map(|g| g.leased.len()).unwrap_or(0)
    }

    pub fn acked(&self) -> usize {
        self.inner.lock().map(|g| g.acked).unwrap_or(0)
    }

    fn rejects(&self, message: &QueueMessage) -> bool {
        let scripted = self
            .fail_next_publishes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if scripted {
            return true;
        }
        let Some(id) = message.shipment_id_hint() else {
            return false;
        };
        self.fail_publish_for
            .lock()
            .map(|f| f.iter().any(|x| x == id))
            .unwrap_or(false)
    }

    fn poisoned() -> QueueError {
        QueueError::Transport("in-memory queue lock poisoned".into())
    }
}

fn receipt_id(delivery: &Delivery) -> Result<u64, QueueError> {
    delivery
        .receipt
        .parse()
        .map_err(|_| QueueError::Transport(format!("unknown receipt {}", delivery.receipt)))
}

#[async_trait]
impl QueuePublisher for InMemoryQueue {
    async fn publish(&self, message: QueueMessage) -> Result<String, QueueError> {
        if self.rejects(&message) {
            tracing::debug!(shipment_id = ?message.shipment_id_hint(), "rejecting publish");
            return Err(QueueError::Publish("scripted publish rejection".into()));
        }
        let mut g = self.inner.lock().map_err(|_| Self::poisoned())?;
        g.next_id += 1;
        let id = g.next_id;
        g.published.push(message.clone());
        g.pending.push_back(Entry {
            id,
            message,
            delivery_count: 0,
        });
        Ok(id.to_string())
    }
}

#[async_trait]
impl QueueSource for InMemoryQueue {
    async fn receive(&self, max: usize) -> Result<Vec<Delivery>, QueueError> {
        let mut g = self.inner.lock().map_err(|_| Self::poisoned())?;
        let mut out = Vec::new();
        while out.len() < max {
            let Some(mut e) = g.pending.pop_front() else {
                break;
            };
            e.delivery_count += 1;
            out.push(Delivery {
                receipt: e.id.to_string(),
                message: e.message.clone(),
                delivery_count: e.delivery_count,
            });
            g.leased.insert(e.id, e);
        }
        Ok(out)
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let id = receipt_id(delivery)?;
        if self
            .fail_next_acks
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(QueueError::Transport("scripted ack failure".into()));
        }
        let mut g = self.inner.lock().map_err(|_| Self::poisoned())?;
        if g.leased.remove(&id).is_some() {
            g.acked += 1;
        }
        Ok(())
    }

    async fn nack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let id = receipt_id(delivery)?;
        let mut g = self.inner.lock().map_err(|_| Self::poisoned())?;
        if let Some(e) = g.leased.remove(&id) {
            g.pending.push_back(e);
        }
        Ok(())
    }
}
