//! Lock-free input plumbing between connection handlers and the tick loop.
//!
//! Connection tasks push sampled actions into a bounded crossbeam channel;
//! the tick loop drains the channel once per tick and files each action into
//! a per-player pending queue. Queues are sorted by client sequence id before
//! processing so out-of-order datagram delivery cannot reorder inputs.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::collections::HashMap;

use crate::game::entities::{Action, PlayerId};

/// Input sample from a player connection
#[derive(Debug, Clone)]
pub struct InputMessage {
    pub player_id: PlayerId,
    pub action: Action,
}

/// Bounded MPSC buffer between connections and the tick loop
pub struct InputBuffer {
    sender: Sender<InputMessage>,
    receiver: Receiver<InputMessage>,
    capacity: usize,
}

impl InputBuffer {
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity);
        Self {
            sender,
            receiver,
            capacity,
        }
    }

    /// New sender handle; each connection holds its own clone.
    pub fn sender(&self) -> InputSender {
        InputSender {
            sender: self.sender.clone(),
        }
    }

    /// Drain all pending inputs for this tick.
    pub fn drain(&self) -> Vec<InputMessage> {
        self.receiver.try_iter().collect()
    }

    #[inline]
    pub fn pending_count(&self) -> usize {
        self.receiver.len()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Clonable sender handle for connection handlers
#[derive(Clone)]
pub struct InputSender {
    sender: Sender<InputMessage>,
}

impl InputSender {
    /// Submit an action without blocking. A full buffer drops the sample;
    /// the client will resend it with the next batch anyway.
    #[inline]
    pub fn try_send(&self, player_id: PlayerId, action: Action) -> Result<(), InputQueueError> {
        self.sender
            .try_send(InputMessage { player_id, action })
            .map_err(|e| match e {
                TrySendError::Full(_) => InputQueueError::Full,
                TrySendError::Disconnected(_) => InputQueueError::Disconnected,
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InputQueueError {
    #[error("input buffer full")]
    Full,
    #[error("tick loop stopped")]
    Disconnected,
}

/// Per-player queues of not-yet-simulated actions
#[derive(Default)]
pub struct PendingInputs {
    queues: HashMap<PlayerId, Vec<Action>>,
}

impl PendingInputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, player_id: PlayerId, action: Action) {
        self.queues.entry(player_id).or_default().push(action);
    }

    /// Take every queued action for one player, in sequence order.
    pub fn take(&mut self, player_id: PlayerId) -> Vec<Action> {
        let mut actions = self.queues.remove(&player_id).unwrap_or_default();
        actions.sort_by_key(|a| a.sequence_id);
        actions
    }

    pub fn remove(&mut self, player_id: PlayerId) {
        self.queues.remove(&player_id);
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn action(seq: u64) -> Action {
        Action {
            sequence_id: seq,
            ..Default::default()
        }
    }

    #[test]
    fn test_buffer_submit_and_drain() {
        let buffer = InputBuffer::new(10);
        let sender = buffer.sender();
        let pid = Uuid::new_v4();

        sender.try_send(pid, action(1)).unwrap();
        sender.try_send(pid, action(2)).unwrap();
        assert_eq!(buffer.pending_count(), 2);

        let drained = buffer.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].action.sequence_id, 1);
        assert_eq!(buffer.pending_count(), 0);
    }

    #[test]
    fn test_buffer_backpressure() {
        let buffer = InputBuffer::new(2);
        let sender = buffer.sender();
        let pid = Uuid::new_v4();

        sender.try_send(pid, action(1)).unwrap();
        sender.try_send(pid, action(2)).unwrap();
        assert_eq!(sender.try_send(pid, action(3)), Err(InputQueueError::Full));

        buffer.drain();
        assert!(sender.try_send(pid, action(3)).is_ok());
    }

    #[test]
    fn test_pending_inputs_sorted_by_sequence() {
        let mut pending = PendingInputs::new();
        let pid = Uuid::new_v4();

        pending.push(pid, action(5));
        pending.push(pid, action(3));
        pending.push(pid, action(4));

        let actions = pending.take(pid);
        let seqs: Vec<u64> = actions.iter().map(|a| a.sequence_id).collect();
        assert_eq!(seqs, vec![3, 4, 5]);

        assert!(pending.take(pid).is_empty());
    }

    #[test]
    fn test_pending_inputs_isolated_per_player() {
        let mut pending = PendingInputs::new();
        let p1 = Uuid::new_v4();
        let p2 = Uuid::new_v4();

        pending.push(p1, action(1));
        pending.push(p2, action(2));

        assert_eq!(pending.take(p1).len(), 1);
        assert_eq!(pending.take(p2).len(), 1);
    }
}
