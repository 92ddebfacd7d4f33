//! Application layer for the duel host.
//!
//! # Sub-modules
//!
//! - **`session`** – The duel state machine.  Pure and synchronous: it takes
//!   local actions, peer messages and timer ticks, and returns the effects
//!   the caller must carry out.  Every rule about who may do what, and when,
//!   lives here.
//!
//! - **`scores`** – The [`HighScoreRepository`](scores::HighScoreRepository)
//!   trait the service records local wins through.
//!
//! - **`duel_service`** – The async task that owns one session, feeds it
//!   commands, network events and timer ticks in a single order, and
//!   executes its effects against the peer link and the score store.

pub mod duel_service;
pub mod scores;
pub mod session;
