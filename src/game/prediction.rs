//! Client-side prediction support.
//!
//! A client samples inputs locally, applies them immediately through the
//! same movement resolver the server runs, and keeps each sample buffered
//! until the server acknowledges it. On every authoritative update the
//! buffer is trimmed to the acknowledged sequence and the remaining samples
//! are replayed on top of the server position, which converges the predicted
//! position without visible snapping.

use std::collections::VecDeque;

use crate::game::constants::{net, tick};
use crate::game::entities::Action;
use crate::game::movement;
use crate::game::world::World;
use crate::util::vec2::Vec2;

pub struct Predictor {
    pending: VecDeque<Action>,
    next_sequence: u64,
}

impl Default for Predictor {
    fn default() -> Self {
        Self::new()
    }
}

impl Predictor {
    pub fn new() -> Self {
        Self {
            pending: VecDeque::new(),
            next_sequence: 1,
        }
    }

    /// Sample one input frame. Returns the sequenced action to send, or
    /// `None` when too many samples are unacknowledged, in which case the
    /// input is dropped rather than stretching the buffer (the server is
    /// unreachable or far behind anyway).
    pub fn sample(&mut self, dx: i8, dy: i8, fire: bool) -> Option<Action> {
        if self.pending.len() >= net::MAX_PENDING_INPUTS {
            return None;
        }

        let action = Action {
            dx,
            dy,
            fire,
            sequence_id: self.next_sequence,
            delta_time: tick::DT,
        };
        self.next_sequence += 1;
        self.pending.push_back(action);
        Some(action)
    }

    /// Drop every buffered sample the server has already simulated.
    pub fn acknowledge(&mut self, acked_sequence: u64) {
        while self
            .pending
            .front()
            .is_some_and(|a| a.sequence_id <= acked_sequence)
        {
            self.pending.pop_front();
        }
    }

    /// Replay unacknowledged samples on top of an authoritative position.
    pub fn replay(
        &self,
        world: &World,
        authoritative: Vec2,
        speed: f32,
        can_pass: impl Fn(i32, i32) -> bool,
    ) -> Vec2 {
        let mut position = authoritative;
        for action in &self.pending {
            position = movement::resolve_step(
                world,
                position,
                action.dx,
                action.dy,
                action.delta_time,
                speed,
                &can_pass,
            )
            .position;
        }
        position
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::constants::cell;

    fn open_pass(world: &World) -> impl Fn(i32, i32) -> bool + '_ {
        move |x, y| world.get_cell(x, y) == cell::EMPTY
    }

    #[test]
    fn test_sequences_are_monotonic() {
        let mut predictor = Predictor::new();
        let a = predictor.sample(1, 0, false).unwrap();
        let b = predictor.sample(0, 1, false).unwrap();
        assert_eq!(a.sequence_id, 1);
        assert_eq!(b.sequence_id, 2);
    }

    #[test]
    fn test_buffer_capped() {
        let mut predictor = Predictor::new();
        for _ in 0..net::MAX_PENDING_INPUTS {
            assert!(predictor.sample(1, 0, false).is_some());
        }
        assert!(predictor.sample(1, 0, false).is_none());

        predictor.acknowledge(5);
        assert_eq!(predictor.pending_len(), net::MAX_PENDING_INPUTS - 5);
        assert!(predictor.sample(1, 0, false).is_some());
    }

    #[test]
    fn test_replay_matches_server_resolver() {
        let world = World::generate(21, 21);
        let mut predictor = Predictor::new();

        // Client samples three rightward steps from the tile center.
        let start = Vec2::new(48.0, 48.0);
        for _ in 0..3 {
            predictor.sample(1, 0, false);
        }

        // Server has simulated the first of them.
        let server_pos = movement::resolve_step(
            &world,
            start,
            1,
            0,
            tick::DT,
            200.0,
            open_pass(&world),
        )
        .position;
        predictor.acknowledge(1);

        let predicted = predictor.replay(&world, server_pos, 200.0, open_pass(&world));

        // Equivalent to stepping all three inputs from the start.
        let mut expected = start;
        for _ in 0..3 {
            expected = movement::resolve_step(
                &world,
                expected,
                1,
                0,
                tick::DT,
                200.0,
                open_pass(&world),
            )
            .position;
        }
        assert_eq!(predicted, expected);
    }

    #[test]
    fn test_acknowledge_is_idempotent() {
        let mut predictor = Predictor::new();
        for _ in 0..4 {
            predictor.sample(1, 0, false);
        }
        predictor.acknowledge(2);
        predictor.acknowledge(2);
        assert_eq!(predictor.pending_len(), 2);
    }
}
