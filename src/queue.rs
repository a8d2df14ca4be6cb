//! Pending tracks for one session.

use std::collections::VecDeque;

use rand::seq::SliceRandom;
use rand::thread_rng;
use serde::Serialize;

use crate::ids::UserId;
use crate::track::Track;

/// A queued track together with the member who asked for it.
#[derive(Debug)]
pub struct QueueEntry {
    pub track: Track,
    pub requester: UserId,
}

impl QueueEntry {
    pub fn new(track: Track, requester: UserId) -> Self {
        Self { track, requester }
    }
}

/// What the presentation layer sees of a queued entry.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct QueuedSummary {
    pub title: String,
    pub url: String,
    pub duration: Option<String>,
    pub requester: UserId,
}

impl From<&QueueEntry> for QueuedSummary {
    fn from(entry: &QueueEntry) -> Self {
        Self {
            title: entry.track.title().to_string(),
            url: entry.track.source_url().to_string(),
            duration: entry.track.duration_label(),
            requester: entry.requester,
        }
    }
}

/// FIFO queue. Nothing here blocks.
#[derive(Debug, Default)]
pub struct Queue {
    entries: VecDeque<QueueEntry>,
}

impl Queue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the back. Returns the 1-based position of the new entry.
    pub fn enqueue(&mut self, entry: QueueEntry) -> usize {
        self.entries.push_back(entry);
        self.entries.len()
    }

    /// Put an entry ahead of everything else (repeat reload).
    pub fn push_front(&mut self, entry: QueueEntry) {
        self.entries.push_front(entry);
    }

    /// Remove and return the earliest entry, `None` when empty.
    pub fn pop_front(&mut self) -> Option<QueueEntry> {
        self.entries.pop_front()
    }

    /// Uniformly random permutation of the remaining entries.
    pub fn shuffle(&mut self) {
        let mut rng = thread_rng();
        self.entries.make_contiguous().shuffle(&mut rng);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueueEntry> {
        self.entries.iter()
    }

    /// Take every entry out, leaving the queue empty.
    pub fn drain(&mut self) -> Vec<QueueEntry> {
        self.entries.drain(..).collect()
    }

    pub fn summaries(&self) -> Vec<QueuedSummary> {
        self.entries.iter().map(QueuedSummary::from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(title: &str) -> QueueEntry {
        let url = format!("https://youtube.com/watch?v={title}");
        QueueEntry::new(Track::new(title, url), UserId(1))
    }

    fn titles(queue: &Queue) -> Vec<String> {
        queue.iter().map(|e| e.track.title().to_string()).collect()
    }

    #[test]
    fn new_queue_is_empty() {
        let mut queue = Queue::new();
        assert!(queue.is_empty());
        assert!(queue.pop_front().is_none());
    }

    #[test]
    fn pops_in_insertion_order() {
        let mut queue = Queue::new();
        for t in ["a", "b", "c", "d"] {
            queue.enqueue(entry(t));
        }
        let popped: Vec<String> = std::iter::from_fn(|| queue.pop_front())
            .map(|e| e.track.title().to_string())
            .collect();
        assert_eq!(popped, ["a", "b", "c", "d"]);
    }

    #[test]
    fn enqueue_reports_position() {
        let mut queue = Queue::new();
        assert_eq!(queue.enqueue(entry("a")), 1);
        assert_eq!(queue.enqueue(entry("b")), 2);
    }

    #[test]
    fn push_front_goes_ahead_of_queued() {
        let mut queue = Queue::new();
        queue.enqueue(entry("b"));
        queue.enqueue(entry("c"));
        queue.push_front(entry("a"));
        assert_eq!(titles(&queue), ["a", "b", "c"]);
    }

    #[test]
    fn shuffle_is_a_permutation() {
        let mut queue = Queue::new();
        let names: Vec<String> = (0..20).map(|i| format!("t{i}")).collect();
        for n in &names {
            queue.enqueue(entry(n));
        }
        queue.shuffle();
        let mut after = titles(&queue);
        assert_eq!(after.len(), names.len());
        after.sort();
        let mut expected = names.clone();
        expected.sort();
        assert_eq!(after, expected);
    }

    #[test]
    fn drain_empties_queue() {
        let mut queue = Queue::new();
        queue.enqueue(entry("a"));
        queue.enqueue(entry("b"));
        let drained = queue.drain();
        assert_eq!(drained.len(), 2);
        assert!(queue.is_empty());
    }

    #[test]
    fn summaries_carry_requester_and_duration() {
        let mut queue = Queue::new();
        queue.enqueue(QueueEntry::new(Track::new("a", "u").with_duration(90), UserId(7)));
        let summaries = queue.summaries();
        assert_eq!(summaries[0].requester, UserId(7));
        assert_eq!(summaries[0].duration.as_deref(), Some("1:30"));
    }
}
