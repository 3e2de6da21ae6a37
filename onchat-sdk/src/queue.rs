//! Outbound queue for envelopes sent while the connection is down.

use std::collections::VecDeque;
use std::time::Instant;

use crate::config::QueuePolicy;
use crate::event::EventName;

/// One envelope waiting for a connection.
#[derive(Debug)]
pub struct Queued {
    pub event: EventName,
    pub json: String,
    queued_at: Instant,
}

/// FIFO of serialized envelopes, flushed in insertion order on open.
#[derive(Debug)]
pub struct OutboundQueue {
    policy: QueuePolicy,
    items: VecDeque<Queued>,
}

impl OutboundQueue {
    pub fn new(policy: QueuePolicy) -> Self {
        Self {
            policy,
            items: VecDeque::new(),
        }
    }

    /// Append an envelope. Returns the event of the envelope dropped to
    /// make room, if the queue was full.
    pub fn push(&mut self, event: EventName, json: String) -> Option<EventName> {
        let dropped = if self.items.len() >= self.policy.capacity {
            self.items.pop_front().map(|q| q.event)
        } else {
            None
        };
        self.items.push_back(Queued {
            event,
            json,
            queued_at: Instant::now(),
        });
        dropped
    }

    /// Put envelopes taken by [`drain_ready`](Self::drain_ready) but never
    /// written back at the head, keeping their order and enqueue times.
    pub fn requeue_front(&mut self, unsent: Vec<Queued>) {
        for item in unsent.into_iter().rev() {
            self.items.push_front(item);
        }
    }

    /// Take everything queued, oldest first, leaving the queue empty.
    /// Envelopes older than the policy's `max_age` are discarded; their
    /// events are returned alongside so the caller can log them.
    pub fn drain_ready(&mut self, now: Instant) -> (Vec<Queued>, Vec<EventName>) {
        let mut ready = Vec::with_capacity(self.items.len());
        let mut expired = Vec::new();
        for item in self.items.drain(..) {
            let stale = self
                .policy
                .max_age
                .is_some_and(|age| now.saturating_duration_since(item.queued_at) > age);
            if stale {
                expired.push(item.event);
            } else {
                ready.push(item);
            }
        }
        (ready, expired)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn texts(items: &[Queued]) -> Vec<&str> {
        items.iter().map(|q| q.json.as_str()).collect()
    }

    #[test]
    fn drains_in_insertion_order() {
        let mut q = OutboundQueue::new(QueuePolicy::default());
        q.push(EventName::Login, "a".into());
        q.push(EventName::JoinRoom, "b".into());
        q.push(EventName::SendChat, "c".into());
        let (ready, expired) = q.drain_ready(Instant::now());
        assert_eq!(texts(&ready), ["a", "b", "c"]);
        assert!(expired.is_empty());
        assert!(q.is_empty());
    }

    #[test]
    fn overflow_drops_oldest() {
        let mut q = OutboundQueue::new(QueuePolicy::default().capacity(2));
        assert_eq!(q.push(EventName::Login, "a".into()), None);
        assert_eq!(q.push(EventName::JoinRoom, "b".into()), None);
        assert_eq!(q.push(EventName::SendChat, "c".into()), Some(EventName::Login));
        assert_eq!(q.len(), 2);
        let (ready, _) = q.drain_ready(Instant::now());
        assert_eq!(texts(&ready), ["b", "c"]);
    }

    #[test]
    fn requeued_envelopes_go_back_ahead_of_newer_ones() {
        let mut q = OutboundQueue::new(QueuePolicy::default());
        q.push(EventName::Login, "a".into());
        q.push(EventName::JoinRoom, "b".into());
        let (unsent, _) = q.drain_ready(Instant::now());
        q.push(EventName::SendChat, "c".into());
        q.requeue_front(unsent);

        let (ready, _) = q.drain_ready(Instant::now());
        assert_eq!(texts(&ready), ["a", "b", "c"]);
        assert_eq!(ready[0].event, EventName::Login);
    }

    #[test]
    fn expired_entries_are_discarded() {
        let mut q = OutboundQueue::new(QueuePolicy::default().max_age(Duration::from_secs(5)));
        q.push(EventName::SendChat, "old".into());
        let later = Instant::now() + Duration::from_secs(10);
        let (ready, expired) = q.drain_ready(later);
        assert!(ready.is_empty());
        assert_eq!(expired, vec![EventName::SendChat]);
    }
}
