//! Blastgrid Server Library
//!
//! A real-time multiplayer bomb-arena server using WebTransport. The server
//! owns the entire simulation: terrain, bombs, explosions, items, mobs and
//! scoring all advance on a fixed 30 Hz tick, and clients only ever send
//! input samples and receive local state snapshots.

pub mod config;
pub mod util;
pub mod game;
pub mod net;
pub mod metrics;
