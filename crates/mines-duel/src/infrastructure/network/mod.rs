//! Network infrastructure for the duel.
//!
//! # Sub-modules
//!
//! - **`framing`** – Reads and writes length-prefixed frames on any async
//!   byte stream.  Knows nothing about TCP.
//!
//! - **`peer_link`** – The TCP listener, the outgoing connector, and the
//!   per-connection reader and writer tasks.  Everything it observes is
//!   reported as a [`NetworkEvent`](peer_link::NetworkEvent) on one channel.

pub mod framing;
pub mod peer_link;
