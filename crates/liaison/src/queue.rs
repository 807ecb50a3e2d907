//! Bounded inbound queues between the transport callbacks and the dispatch
//! loops.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TrySendError};
use thiserror::Error;

/// Errors returned when handing an inbound message to the core.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    /// The queue is at capacity; the message was dropped.
    #[error("{queue} queue is full ({capacity} entries)")]
    Full {
        /// Which queue rejected the message.
        queue: &'static str,
        /// Configured capacity.
        capacity: usize,
    },
    /// The manager is not running; the message was dropped.
    #[error("{queue} queue is not accepting messages")]
    Stopped {
        /// Which queue rejected the message.
        queue: &'static str,
    },
}

/// Bounded multi-producer queue drained by one dispatch loop.
#[derive(Debug)]
pub(crate) struct InboundQueue<T> {
    label: &'static str,
    capacity: usize,
    sender: Sender<T>,
    receiver: Receiver<T>,
    accepting: AtomicBool,
}

impl<T> InboundQueue<T> {
    pub(crate) fn new(label: &'static str, capacity: usize) -> Self {
        let (sender, receiver) = channel::bounded(capacity);
        Self {
            label,
            capacity,
            sender,
            receiver,
            accepting: AtomicBool::new(false),
        }
    }

    pub(crate) fn push(&self, item: T) -> Result<(), QueueError> {
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(QueueError::Stopped { queue: self.label });
        }
        match self.sender.try_send(item) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(QueueError::Full {
                queue: self.label,
                capacity: self.capacity,
            }),
            Err(TrySendError::Disconnected(_)) => Err(QueueError::Stopped { queue: self.label }),
        }
    }

    /// Waits up to `timeout` for the next item.
    pub(crate) fn pop(&self, timeout: Duration) -> Option<T> {
        match self.receiver.recv_timeout(timeout) {
            Ok(item) => Some(item),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    pub(crate) fn open(&self) {
        self.accepting.store(true, Ordering::SeqCst);
    }

    pub(crate) fn close(&self) {
        self.accepting.store(false, Ordering::SeqCst);
    }

    /// Drops everything currently queued, returning how many items were lost.
    pub(crate) fn discard(&self) -> usize {
        self.receiver.try_iter().count()
    }

    pub(crate) fn len(&self) -> usize {
        self.receiver.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_pushes_until_opened() {
        let queue = InboundQueue::new("command", 2);
        assert_eq!(queue.push(1), Err(QueueError::Stopped { queue: "command" }));
        queue.open();
        assert_eq!(queue.push(1), Ok(()));
    }

    #[test]
    fn reports_full_queue() {
        let queue = InboundQueue::new("response", 1);
        queue.open();
        queue.push(1).expect("first push");
        assert_eq!(
            queue.push(2),
            Err(QueueError::Full {
                queue: "response",
                capacity: 1
            })
        );
    }

    #[test]
    fn discard_empties_queue() {
        let queue = InboundQueue::new("command", 4);
        queue.open();
        for item in 0..3 {
            queue.push(item).expect("push");
        }
        assert_eq!(queue.discard(), 3);
        assert_eq!(queue.len(), 0);
        assert_eq!(queue.pop(Duration::from_millis(1)), None);
    }

    #[test]
    fn pop_returns_items_in_order() {
        let queue = InboundQueue::new("command", 4);
        queue.open();
        queue.push("a").expect("push a");
        queue.push("b").expect("push b");
        assert_eq!(queue.pop(Duration::from_millis(5)), Some("a"));
        assert_eq!(queue.pop(Duration::from_millis(5)), Some("b"));
    }
}
