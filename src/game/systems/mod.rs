//! Simulation subsystems, each operating on slices of the shared state.

pub mod bombs;
pub mod mobs;
pub mod zones;
