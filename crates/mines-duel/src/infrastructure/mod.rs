//! Infrastructure layer for the duel host.
//!
//! Contains OS-facing adapters: TCP sockets and file-system storage.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `mines_core`; the session state machine in `application::session` does
//! not import it.

pub mod network;
pub mod storage;
