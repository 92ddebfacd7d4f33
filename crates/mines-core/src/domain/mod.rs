//! Domain entities for MinesDuel.
//!
//! This module contains pure game logic with no infrastructure dependencies.
//! Code in outer layers (the duel session, the network link, the host
//! binary) depends on the domain, but the domain never depends on them.

/// Grid model: board presets, cells, counters, and neighbor iteration.
pub mod grid;

/// Board engine: open, mark, chord, win/loss detection, serialization.
///
/// See [`board::Board`] for the main type.
pub mod board;

/// Race resolution between two independently timed peers.
pub mod race;
