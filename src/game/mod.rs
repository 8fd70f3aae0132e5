//! Authoritative game simulation.

pub mod constants;
pub mod entities;
pub mod input_queue;
pub mod movement;
pub mod prediction;
pub mod simulation;
pub mod systems;
pub mod world;
