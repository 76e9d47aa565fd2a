// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Per-instance bounded FIFO of `RefBuffer`s (spec.md §3 "Queue", §4.1).
//!
//! The original source wakes every instance thread off one global condition
//! variable broadcast by the producer. We keep the same broadcast shape with
//! a `tokio::sync::Notify` per queue: the producer enqueues into every live
//! instance's queue for one input chunk, then calls [`InstanceQueue::notify`]
//! on each of them (spec.md §4.5 step 8, §5 "broadcast on the condition
//! happens after all enqueues of one input chunk").

use std::collections::VecDeque;
use std::sync::Mutex;

use ices_core::RefBuffer;
use tokio::sync::Notify;

pub struct InstanceQueue {
    items: Mutex<VecDeque<RefBuffer>>,
    notify: Notify,
    max_len: usize,
}

impl InstanceQueue {
    pub fn new(max_len: usize) -> Self {
        Self { items: Mutex::new(VecDeque::new()), notify: Notify::new(), max_len: max_len.max(1) }
    }

    /// Appends one buffer, dropping the oldest non-critical entry if the
    /// queue is already at `max_len` (bounding queue growth the way
    /// `maxqueuelength` does in the original).
    #[allow(clippy::unwrap_used)]
    pub fn enqueue(&self, buf: RefBuffer) {
        let mut items = self.items.lock().unwrap();
        if items.len() >= self.max_len {
            if let Some(pos) = items.iter().position(|b| !b.is_critical()) {
                items.remove(pos);
            }
        }
        items.push_back(buf);
    }

    #[allow(clippy::unwrap_used)]
    pub fn dequeue(&self) -> Option<RefBuffer> {
        self.items.lock().unwrap().pop_front()
    }

    #[allow(clippy::unwrap_used)]
    pub fn len(&self) -> usize {
        self.items.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every buffered item; when `keep_critical` is set, critical
    /// buffers survive the flush so streaming can resume from the next
    /// restart point without losing it (spec.md §4.6 send-error handling).
    #[allow(clippy::unwrap_used)]
    pub fn flush(&self, keep_critical: bool) {
        let mut items = self.items.lock().unwrap();
        if keep_critical {
            items.retain(RefBuffer::is_critical);
        } else {
            items.clear();
        }
    }

    pub fn notify(&self) {
        self.notify.notify_one();
    }

    /// Waits until a buffer is available, a manual notification is posted,
    /// or `shutdown` resolves.
    pub async fn wait_for_data(&self) {
        if !self.is_empty() {
            return;
        }
        self.notify.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use ices_core::BufferAux;

    fn buf(critical: bool) -> RefBuffer {
        RefBuffer::new(Bytes::from_static(b"x"), BufferAux::None, critical)
    }

    #[test]
    fn fifo_order_preserved() {
        let q = InstanceQueue::new(10);
        q.enqueue(buf(false));
        q.enqueue(buf(true));
        assert_eq!(q.len(), 2);
        assert!(!q.dequeue().unwrap().is_critical());
        assert!(q.dequeue().unwrap().is_critical());
        assert!(q.dequeue().is_none());
    }

    #[test]
    fn flush_keep_critical_drops_only_noncritical() {
        let q = InstanceQueue::new(10);
        q.enqueue(buf(false));
        q.enqueue(buf(true));
        q.enqueue(buf(false));
        q.flush(true);
        assert_eq!(q.len(), 1);
        assert!(q.dequeue().unwrap().is_critical());
    }

    #[test]
    fn flush_without_keep_critical_clears_everything() {
        let q = InstanceQueue::new(10);
        q.enqueue(buf(true));
        q.flush(false);
        assert!(q.is_empty());
    }

    #[test]
    fn bounded_queue_evicts_oldest_noncritical() {
        let q = InstanceQueue::new(2);
        q.enqueue(buf(false));
        q.enqueue(buf(true));
        q.enqueue(buf(false));
        assert_eq!(q.len(), 2);
        assert!(q.dequeue().unwrap().is_critical());
    }
}
