use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use nowmsg_frame::{Message, Tag};

/// FIFO of inbound messages.
///
/// Filled from the link's notification context and drained by the
/// application. Every operation holds the lock only for O(1) work.
#[derive(Debug, Default)]
pub struct DeliveryQueue {
    entries: Mutex<VecDeque<Message>>,
}

impl DeliveryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Message>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, msg: Message) {
        self.lock().push_back(msg);
    }

    /// Remove and return the head, or `None` when empty.
    pub fn pop(&self) -> Option<Message> {
        self.lock().pop_front()
    }

    /// Decode the head with `decode` and remove it only if decoding
    /// succeeds. A failed decode leaves the message in place.
    pub fn pop_with<R, E>(
        &self,
        decode: impl FnOnce(&Message) -> std::result::Result<R, E>,
    ) -> Option<std::result::Result<R, E>> {
        let mut entries = self.lock();
        let result = decode(entries.front()?);
        if result.is_ok() {
            entries.pop_front();
        }
        Some(result)
    }

    pub fn peek_is_array(&self) -> Option<bool> {
        self.lock().front().map(Message::is_array)
    }

    pub fn peek_tag(&self) -> Option<Tag> {
        self.lock().front().map(Message::tag)
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Drop every queued message, returning how many were discarded.
    pub fn clear(&self) -> usize {
        let mut entries = self.lock();
        let discarded = entries.len();
        entries.clear();
        discarded
    }
}

#[cfg(test)]
mod tests {
    use nowmsg_frame::FrameError;

    use super::*;

    #[test]
    fn fifo_order() {
        let queue = DeliveryQueue::new();
        for i in 0..5i32 {
            queue.push(Message::scalar(i));
        }
        assert_eq!(queue.len(), 5);
        for i in 0..5i32 {
            assert_eq!(queue.pop().unwrap().value::<i32>(), Ok(i));
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn empty_is_explicit() {
        let queue = DeliveryQueue::new();
        assert!(queue.pop().is_none());
        assert_eq!(queue.peek_is_array(), None);
        assert_eq!(queue.peek_tag(), None);
        assert!(queue.pop_with(|msg| msg.value::<i32>()).is_none());
    }

    #[test]
    fn peek_does_not_consume() {
        let queue = DeliveryQueue::new();
        queue.push(Message::array(&[1.0f32, 2.0]).unwrap());
        assert_eq!(queue.peek_is_array(), Some(true));
        assert_eq!(queue.peek_tag(), Some(Tag::Float));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn failed_decode_keeps_head() {
        let queue = DeliveryQueue::new();
        queue.push(Message::scalar(3i16));
        queue.push(Message::scalar(4i16));

        let mismatch = queue.pop_with(|msg| msg.value::<i32>()).unwrap();
        assert_eq!(
            mismatch,
            Err(FrameError::TagMismatch {
                expected: Tag::Int,
                found: Tag::Short
            })
        );
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.pop_with(|msg| msg.value::<i16>()), Some(Ok(3)));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn clear_reports_discarded() {
        let queue = DeliveryQueue::new();
        queue.push(Message::scalar(true));
        queue.push(Message::scalar(false));
        assert_eq!(queue.clear(), 2);
        assert!(queue.is_empty());
    }

    #[test]
    fn concurrent_producer_keeps_order() {
        let queue = std::sync::Arc::new(DeliveryQueue::new());
        let producer = {
            let queue = queue.clone();
            std::thread::spawn(move || {
                for i in 0..1000i32 {
                    queue.push(Message::scalar(i));
                }
            })
        };

        let mut seen = Vec::new();
        while seen.len() < 1000 {
            match queue.pop() {
                Some(msg) => seen.push(msg.value::<i32>().unwrap()),
                None => std::thread::yield_now(),
            }
        }
        producer.join().unwrap();
        assert_eq!(seen, (0..1000).collect::<Vec<_>>());
    }
}
