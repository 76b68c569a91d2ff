//! Bounded, ordered buffer of notifications waiting for the Studio.
//!
//! Every pushed notification gets the next sequence number and stays in the
//! outbox until the Studio acknowledges it (or it is pushed out by newer
//! entries when the outbox is full).  Entries are handed to the session in
//! push order; after a reconnect the session rewinds and sends everything
//! that is still unacknowledged again, with `replay = true` on entries that
//! already went out once.
//!
//! ```text
//!  acked, removed │ sent, awaiting ack │ not sent yet
//! ────────────────┼────────────────────┼──────────────►
//!                 front             cursor          back
//! ```

use std::collections::VecDeque;

use tracing::warn;

use table_core::protocol::studio::{Outbound, WireMessage};

#[derive(Debug)]
struct Entry {
    message: WireMessage,
    transmissions: u32,
}

#[derive(Debug)]
pub struct Outbox {
    capacity: usize,
    next_seq: u64,
    entries: VecDeque<Entry>,
    /// Index of the first entry not yet sent in the current session.
    cursor: usize,
    dropped: u64,
}

impl Outbox {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            next_seq: 1,
            entries: VecDeque::new(),
            cursor: 0,
            dropped: 0,
        }
    }

    /// Queues a notification and returns its sequence number.  Drops the
    /// oldest entry when full.
    pub fn push(&mut self, table_id: &str, outbound: Outbound) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;

        if self.entries.len() >= self.capacity {
            if let Some(oldest) = self.entries.pop_front() {
                self.dropped += 1;
                self.cursor = self.cursor.saturating_sub(1);
                warn!(
                    seq = oldest.message.seq,
                    dropped = self.dropped,
                    "outbox full; oldest notification dropped"
                );
            }
        }
        self.entries.push_back(Entry {
            message: outbound.into_wire(table_id, seq),
            transmissions: 0,
        });
        seq
    }

    /// The next message to send in the current session, in push order.
    pub fn next_unsent(&mut self) -> Option<WireMessage> {
        let entry = self.entries.get_mut(self.cursor)?;
        self.cursor += 1;
        let mut message = entry.message.clone();
        message.replay = entry.transmissions > 0;
        entry.transmissions += 1;
        Some(message)
    }

    /// Removes every entry up to and including `seq`.  Returns how many were
    /// removed.
    pub fn ack(&mut self, seq: u64) -> usize {
        let mut removed = 0;
        while self
            .entries
            .front()
            .is_some_and(|entry| entry.message.seq <= seq)
        {
            self.entries.pop_front();
            removed += 1;
        }
        self.cursor = self.cursor.saturating_sub(removed);
        removed
    }

    /// Starts a new session: everything unacknowledged will be sent again.
    pub fn rewind(&mut self) {
        self.cursor = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries not yet sent in the current session.
    pub fn unsent(&self) -> usize {
        self.entries.len() - self.cursor
    }

    /// Entries lost to the capacity limit since startup.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Copies of every queued message, oldest first.
    pub fn queued(&self) -> Vec<WireMessage> {
        self.entries.iter().map(|e| e.message.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use table_core::protocol::studio::MessageKind;

    fn status(n: u64) -> Outbound {
        Outbound {
            kind: MessageKind::Status,
            payload: json!({ "n": n }),
        }
    }

    fn seqs(outbox: &mut Outbox) -> Vec<(u64, bool)> {
        std::iter::from_fn(|| outbox.next_unsent())
            .map(|m| (m.seq, m.replay))
            .collect()
    }

    #[test]
    fn test_messages_are_sent_in_push_order_with_increasing_seq() {
        // Arrange
        let mut outbox = Outbox::new(8);
        for n in 0..3 {
            outbox.push("RL-01", status(n));
        }

        // Act
        let sent = seqs(&mut outbox);

        // Assert
        assert_eq!(sent, vec![(1, false), (2, false), (3, false)]);
        assert_eq!(outbox.unsent(), 0);
        assert_eq!(outbox.len(), 3, "sent entries wait for an ack");
    }

    #[test]
    fn test_ack_trims_prefix() {
        let mut outbox = Outbox::new(8);
        for n in 0..4 {
            outbox.push("RL-01", status(n));
        }
        seqs(&mut outbox);

        assert_eq!(outbox.ack(2), 2);
        assert_eq!(outbox.len(), 2);
        assert_eq!(outbox.ack(2), 0, "repeated ack is harmless");
    }

    #[test]
    fn test_rewind_replays_unacked_and_tags_them() {
        // Arrange: 1 and 2 sent, 1 acked, then the session drops; 3 is pushed
        // while offline.
        let mut outbox = Outbox::new(8);
        outbox.push("RL-01", status(1));
        outbox.push("RL-01", status(2));
        seqs(&mut outbox);
        outbox.ack(1);
        outbox.push("RL-01", status(3));

        // Act
        outbox.rewind();
        let resent = seqs(&mut outbox);

        // Assert
        assert_eq!(resent, vec![(2, true), (3, false)]);
    }

    #[test]
    fn test_full_outbox_drops_oldest() {
        // Arrange
        let mut outbox = Outbox::new(3);

        // Act
        for n in 0..5 {
            outbox.push("RL-01", status(n));
        }

        // Assert
        assert_eq!(outbox.dropped(), 2);
        let queued: Vec<u64> = outbox.queued().iter().map(|m| m.seq).collect();
        assert_eq!(queued, vec![3, 4, 5]);
    }

    #[test]
    fn test_drop_while_partially_sent_keeps_cursor_consistent() {
        let mut outbox = Outbox::new(2);
        outbox.push("RL-01", status(1));
        outbox.push("RL-01", status(2));
        assert_eq!(outbox.next_unsent().map(|m| m.seq), Some(1));

        outbox.push("RL-01", status(3)); // evicts 1

        assert_eq!(seqs(&mut outbox), vec![(2, false), (3, false)]);
    }

    #[test]
    fn test_wire_message_carries_table_id() {
        let mut outbox = Outbox::new(1);
        outbox.push("SB-02", status(1));
        let message = outbox.next_unsent().unwrap();
        assert_eq!(message.table_id, "SB-02");
        assert_eq!(message.kind, MessageKind::Status);
    }
}
