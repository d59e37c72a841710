//! Job queue shared by the download workers.
//!
//! A FIFO of pending [`Item`]s behind a mutex. Every dequeue happens under the
//! lock, so each item is handed to exactly one worker and none is lost.
//! Exhaustion is reported as `None`, which is how workers know to stop.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use crate::provider::Item;

/// Pending download jobs for one playlist.
#[derive(Debug, Default)]
pub struct JobQueue {
    items: Mutex<VecDeque<Item>>,
}

impl JobQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a queue holding `items` in order.
    #[must_use]
    pub fn from_items(items: impl IntoIterator<Item = Item>) -> Self {
        Self {
            items: Mutex::new(items.into_iter().collect()),
        }
    }

    /// Add an item to the back of the queue.
    pub fn enqueue(&self, item: Item) {
        self.lock().push_back(item);
    }

    /// Take the next item, or `None` once the queue is drained.
    pub fn try_dequeue(&self) -> Option<Item> {
        self.lock().pop_front()
    }

    /// Number of items still pending.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no items are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // A panicking holder can only have been mid push/pop, both of which leave
    // the deque consistent, so a poisoned lock is safe to reuse.
    fn lock(&self) -> MutexGuard<'_, VecDeque<Item>> {
        self.items
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use super::*;

    fn item(n: usize) -> Item {
        Item::new(format!("Track {n}"), format!("https://example.com/{n}"))
    }

    #[test]
    fn test_fifo_order() {
        let queue = JobQueue::new();
        queue.enqueue(item(1));
        queue.enqueue(item(2));

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.try_dequeue(), Some(item(1)));
        assert_eq!(queue.try_dequeue(), Some(item(2)));
        assert_eq!(queue.try_dequeue(), None);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_empty_queue_keeps_returning_none() {
        let queue = JobQueue::new();
        assert!(queue.try_dequeue().is_none());
        assert!(queue.try_dequeue().is_none());
    }

    #[test]
    fn test_concurrent_dequeue_hands_out_each_item_once() {
        let queue = Arc::new(JobQueue::from_items((0..500).map(item)));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let queue = Arc::clone(&queue);
                std::thread::spawn(move || {
                    let mut taken = Vec::new();
                    while let Some(item) = queue.try_dequeue() {
                        taken.push(item.title);
                    }
                    taken
                })
            })
            .collect();

        let mut seen = HashSet::new();
        let mut total = 0;
        for handle in handles {
            for title in handle.join().unwrap() {
                total += 1;
                assert!(seen.insert(title), "item dequeued twice");
            }
        }

        assert_eq!(total, 500);
        assert!(queue.is_empty());
    }
}
