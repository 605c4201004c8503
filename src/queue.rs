//! In-memory message queues, one per peer, plus the two small record types
//! the deadlock protocol keeps.
//!
//! Everything here is plain data behind the runtime's single mutex. The
//! queues are bounded by the messages in flight from one peer, so they
//! stay short and linear matching is the right tool.

use std::collections::VecDeque;

use crate::tag::{self, Tag};

/// An inbound message as decoded by a reader worker. `data` is empty for
/// metadata-only frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Message {
    pub source: i32,
    pub tag: Tag,
    pub count: i32,
    pub data: Vec<u8>,
}

/// What a receive call is looking for. Source and count match exactly;
/// [`ANY_TAG`](crate::ANY_TAG) matches any user tag and nothing else.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Filter {
    pub source: i32,
    pub tag: Tag,
    pub count: i32,
}

impl Filter {
    pub fn matches(&self, msg: &Message) -> bool {
        msg.source == self.source
            && msg.count == self.count
            && if self.tag == tag::ANY_TAG {
                msg.tag >= 0
            } else {
                msg.tag == self.tag
            }
    }
}

/// FIFO of undelivered messages from one peer.
#[derive(Debug, Default)]
pub(crate) struct MessageQueue(VecDeque<Message>);

impl MessageQueue {
    pub fn new() -> MessageQueue {
        MessageQueue(VecDeque::new())
    }

    pub fn push_back(&mut self, msg: Message) {
        self.0.push_back(msg);
    }

    /// Dequeues the oldest message matching `filter`, skipping over
    /// non-matching ones.
    pub fn take_first(&mut self, filter: &Filter) -> Option<Message> {
        let at = self.0.iter().position(|m| filter.matches(m))?;
        self.0.remove(at)
    }
}

/// A WAITING notification from a peer: it blocks on a message with this
/// `(count, tag)` from us.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct WaitNote {
    pub tag: Tag,
    pub count: i32,
}

/// A send this process performed whose RECEIVED acknowledgment is still
/// outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SendRecord {
    pub destination: i32,
    pub tag: Tag,
    pub count: i32,
}

impl SendRecord {
    /// Whether this in-flight send is the message a peer's note refers to.
    /// Notes from an `ANY_TAG` receive name the wildcard, so they are
    /// answered by any user-tagged send of the right size.
    pub fn answers(&self, destination: i32, note: WaitNote) -> bool {
        self.destination == destination
            && self.count == note.count
            && if note.tag == tag::ANY_TAG {
                self.tag >= 0
            } else {
                self.tag == note.tag
            }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::ANY_TAG;

    fn msg(tag: Tag, count: i32) -> Message {
        let data = if count > 0 { vec![0xAB; count as usize] } else { Vec::new() };
        Message { source: 2, tag, count, data }
    }

    #[test]
    fn exact_filter_ignores_other_tags_and_counts() {
        let mut q = MessageQueue::new();
        q.push_back(msg(1, 4));
        q.push_back(msg(2, 4));
        q.push_back(msg(2, 8));

        let filter = Filter { source: 2, tag: 2, count: 4 };
        assert_eq!(q.take_first(&filter).unwrap().tag, 2);
        assert!(q.take_first(&filter).is_none());
    }

    #[test]
    fn source_must_match() {
        let mut q = MessageQueue::new();
        q.push_back(msg(1, 4));
        assert!(q.take_first(&Filter { source: 3, tag: 1, count: 4 }).is_none());
    }

    #[test]
    fn wildcard_takes_user_messages_in_channel_order() {
        let mut q = MessageQueue::new();
        q.push_back(msg(7, 1));
        q.push_back(msg(3, 1));
        q.push_back(msg(7, 1));

        let filter = Filter { source: 2, tag: ANY_TAG, count: 1 };
        let tags: Vec<Tag> = (0..3).map(|_| q.take_first(&filter).unwrap().tag).collect();
        assert_eq!(tags, [7, 3, 7]);
    }

    #[test]
    fn wildcard_never_matches_internal_carriers() {
        let mut q = MessageQueue::new();
        q.push_back(msg(crate::tag::BROADCAST, 4));
        assert!(q.take_first(&Filter { source: 2, tag: ANY_TAG, count: 4 }).is_none());
        // An exact internal filter still finds it (the collectives' case).
        assert!(q
            .take_first(&Filter { source: 2, tag: crate::tag::BROADCAST, count: 4 })
            .is_some());
    }

    #[test]
    fn records_answer_wildcard_notes() {
        let record = SendRecord { destination: 1, tag: 5, count: 4 };
        assert!(record.answers(1, WaitNote { tag: 5, count: 4 }));
        assert!(record.answers(1, WaitNote { tag: ANY_TAG, count: 4 }));
        assert!(!record.answers(1, WaitNote { tag: 6, count: 4 }));
        assert!(!record.answers(1, WaitNote { tag: 5, count: 8 }));
        assert!(!record.answers(0, WaitNote { tag: 5, count: 4 }));
    }
}
